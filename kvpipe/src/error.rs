//! # Helper Errors
//!
//! The failure taxonomy of the helper layer. Client failures are classified
//! once, at the point where they leave a session, so handlers and callers
//! always see the underlying cause.

use kvpipe_client::ClientError;
use thiserror::Error;

/// Result type for helper operations.
pub type HelperResult<T> = Result<T, HelperError>;

#[derive(Debug, Error)]
pub enum HelperError {
    /// The pool or session cannot serve this kind of request.
    #[error("invalid resource kind: {0}")]
    InvalidResourceKind(String),
    /// No session could be checked out of the pool.
    #[error("session acquisition failed: {0}")]
    SessionAcquisition(#[source] ClientError),
    /// The store rejected the command or the round trip failed.
    #[error("remote command failed: {0}")]
    RemoteCommand(#[source] ClientError),
    /// A reply could not be turned into the requested value.
    #[error("decode failed: {0}")]
    Decode(String),
    /// A deferred response was read before its pipeline was synced.
    #[error("response read before pipeline sync")]
    ResponseNotReady,
    /// Caller passed an argument the layer cannot work with.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl HelperError {
    /// Classifies a failure raised while a session was executing commands.
    pub fn from_client(err: ClientError) -> Self {
        match err {
            ClientError::Unsupported(what) => HelperError::InvalidResourceKind(what.to_string()),
            ClientError::UnexpectedResponse { .. } => HelperError::Decode(err.to_string()),
            other => HelperError::RemoteCommand(other),
        }
    }

    /// Classifies a failure raised while checking a session out.
    pub fn from_acquire(err: ClientError) -> Self {
        match err {
            ClientError::Unsupported(what) => HelperError::InvalidResourceKind(what.to_string()),
            other => HelperError::SessionAcquisition(other),
        }
    }
}
