use tracing::{debug, warn};

use crate::error::{SessionError, SessionResult};
use crate::level::LogLevel;
use crate::provider::{EngineInstance, InstanceProvider};

/// Lifecycle of a session's engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unacquired,
    Acquired,
    Released,
}

/// Scoped ownership of an engine instance.
///
/// The instance is released exactly once: by [`InstanceSession::close`], or
/// when the session is dropped (early return, error, or panic unwinding).
pub struct InstanceSession<I: EngineInstance> {
    instance: I,
    state: SessionState,
}

impl<I: EngineInstance> InstanceSession<I> {
    /// Acquire a new instance from `provider`.
    pub fn acquire<P>(mut provider: P) -> SessionResult<Self>
    where
        P: InstanceProvider<Instance = I>,
    {
        let instance = provider.acquire()?;
        debug!(
            from = ?SessionState::Unacquired,
            to = ?SessionState::Acquired,
            "engine instance acquired"
        );
        Ok(Self {
            instance,
            state: SessionState::Acquired,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Borrow the underlying instance for provider-specific reads.
    pub fn instance(&self) -> &I {
        &self.instance
    }

    pub fn log_level(&self) -> SessionResult<LogLevel> {
        self.instance.log_level()
    }

    /// Release the instance now and report any release failure.
    pub fn close(mut self) -> SessionResult<()> {
        self.release_once()
    }

    fn release_once(&mut self) -> SessionResult<()> {
        if self.state != SessionState::Acquired {
            return Ok(());
        }
        // Released is terminal even if the provider reports a failure.
        self.state = SessionState::Released;
        debug!(
            from = ?SessionState::Acquired,
            to = ?SessionState::Released,
            "releasing engine instance"
        );
        self.instance.release().map_err(|err| match err {
            SessionError::Release(_) => err,
            other => SessionError::release(other.to_string()),
        })
    }
}

impl<I: EngineInstance> Drop for InstanceSession<I> {
    fn drop(&mut self) {
        if let Err(err) = self.release_once() {
            warn!(error = %err, "engine instance release failed during drop");
        }
    }
}

/// Acquire an instance, run `body` against it, and release it on every exit path.
///
/// A body error takes precedence over a release error; the release error is
/// only returned when the body succeeded.
pub fn with_instance_session<P, F, T>(provider: P, body: F) -> SessionResult<T>
where
    P: InstanceProvider,
    F: FnOnce(&InstanceSession<P::Instance>) -> SessionResult<T>,
{
    let session = InstanceSession::<P::Instance>::acquire(provider)?;
    let outcome = body(&session);
    let released = session.close();

    match outcome {
        Ok(value) => released.map(|()| value),
        Err(err) => {
            if let Err(release_err) = released {
                warn!(error = %release_err, "engine instance release failed after scope error");
            }
            Err(err)
        }
    }
}
