//! Crate-wide error taxonomy.

use crate::command;
use crate::resources::Status;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A referenced entity is absent from the platform.
    #[error("resource not found: {0}")]
    NotFound(String),
    /// A name, address or allocation collides with an existing one.
    #[error("resource already exists: {0}")]
    AlreadyExisting(String),
    /// A pool (addresses, cores, ifb devices) is exhausted.
    #[error("resource unavailable: {0}")]
    Unavailable(String),
    /// Malformed or out-of-range input.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// An external command exited nonzero.
    #[error(transparent)]
    Shell(#[from] command::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A bounded wait on the container lifecycle tool ran out of cycles.
    #[error("timed out waiting for container {name} to reach {status}")]
    WaitTimeout { name: String, status: Status },
}

pub type Result<T> = std::result::Result<T, Error>;
