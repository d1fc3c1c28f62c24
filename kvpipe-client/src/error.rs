//! # Client Errors
//!
//! Every failure the pooled client can surface, from socket IO up to a
//! reply that does not fit the command that produced it.

use thiserror::Error;

/// Result type for the pooled client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the pooled client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// RESP2 framing or parse error.
    #[error("protocol error")]
    Protocol,
    /// Server returned an error reply.
    #[error("server error: {message}")]
    Server { message: String },
    /// Reply type did not match what the command returns.
    #[error("unexpected response, expected {expected}")]
    UnexpectedResponse { expected: &'static str },
    /// Pool is at capacity and no idle connections are available.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// Address could not be parsed into a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// The session topology cannot run this command.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    /// Configuration could not be parsed.
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

impl ClientError {
    /// Builds a server error from a raw `-ERR ...` payload.
    pub fn server(message: &[u8]) -> Self {
        ClientError::Server {
            message: String::from_utf8_lossy(message).into_owned(),
        }
    }

    /// Returns true when the connection that produced this error must not be
    /// handed back to the pool.
    pub fn poisons_connection(&self) -> bool {
        matches!(self, ClientError::Io(_) | ClientError::Protocol)
    }
}
