//! Sea-ORM entity definitions for the four durable row types of spec.md §3.

pub mod generation_job;
pub mod job_status;
pub mod repository;
pub mod sdk_preference;
pub mod trigger_job;

pub use job_status::JobStatus;
pub use sdk_preference::Sdk;
