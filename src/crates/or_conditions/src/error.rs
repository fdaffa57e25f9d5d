use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while acquiring, reading, or releasing an engine instance.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to acquire engine instance: {0}")]
    Acquisition(String),
    #[error("engine terminated early with status {0}")]
    EngineExited(ExitStatus),
    #[error("engine did not report readiness within {0:?}")]
    StartupTimeout(Duration),
    #[error("failed to read instance property: {0}")]
    Read(String),
    #[error("engine did not answer request {id} within {timeout:?}")]
    RequestTimeout { id: u64, timeout: Duration },
    #[error("failed to release engine instance: {0}")]
    Release(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("unexpected engine response: {0}")]
    UnexpectedResponse(String),
    #[error("engine connection closed")]
    ConnectionClosed,
}

impl SessionError {
    pub fn acquisition(err: impl Into<String>) -> Self {
        SessionError::Acquisition(err.into())
    }

    pub fn read(err: impl Into<String>) -> Self {
        SessionError::Read(err.into())
    }

    pub fn release(err: impl Into<String>) -> Self {
        SessionError::Release(err.into())
    }

    pub(crate) fn unexpected(message: impl Into<String>) -> Self {
        SessionError::UnexpectedResponse(message.into())
    }

    /// True when the provider never produced a handle.
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            SessionError::Acquisition(_)
                | SessionError::EngineExited(_)
                | SessionError::StartupTimeout(_)
        )
    }

    /// True when a handle existed but a property could not be obtained from it.
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            SessionError::Read(_)
                | SessionError::RequestTimeout { .. }
                | SessionError::UnexpectedResponse(_)
                | SessionError::ConnectionClosed
        )
    }
}
