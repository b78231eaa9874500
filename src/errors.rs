//! Error types for the registry core.
//!
//! This module defines a single unified error enumeration shared by every
//! component (metadata store, git workspace, authorization gate, repository
//! service, job queue, SDK builder, SSH gateway). It integrates with
//! `thiserror` to provide `Display` and `Error::source` chaining.
//!
//! The variants are exactly the error kinds an RPC boundary maps onto
//! standard status codes (see the design doc's error handling section):
//! `NotFound`, `AlreadyExists`, `PermissionDenied`, `Unauthenticated`,
//! `InvalidArgument`, `Internal`. The distinction between a transient and a
//! terminal failure is never encoded here — that classification only exists
//! inside the job queue's retry bookkeeping.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the registry core.
pub enum RegistryError {
    /// The requested row or path does not exist (or is soft-deleted).
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique-key conflict on create (e.g. duplicate repository directory).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The authorization gate rejected the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No authenticated user identity is present in the request context.
    #[error("unauthenticated")]
    Unauthenticated,

    /// A caller-supplied argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O failure from the filesystem or a spawned subprocess.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata store failure not otherwise classified above.
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// SSH transport failure surfaced by `russh`.
    #[error("ssh transport error: {0}")]
    Ssh(#[from] russh::Error),

    /// Any other internal failure (subprocess exit, invariant violation).
    #[error("internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for the two fixed authorization-gate messages (spec §4.3).
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}
