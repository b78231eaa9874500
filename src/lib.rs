//! Core of a multi-tenant Protocol Buffer schema registry: repository
//! lifecycle over a Git workspace, an SSH transport, a durable job queue,
//! and a per-SDK code generation pipeline.

pub mod authz;
pub mod config;
pub mod db;
pub mod errors;
pub mod git;
pub mod queue;
pub mod repository_service;
pub mod sdk;
pub mod ssh;

pub use config::Config;
pub use errors::RegistryError;
pub use repository_service::RepositoryService;
