use crate::error::SessionResult;
use crate::level::LogLevel;

/// A live engine instance acquired from an [`InstanceProvider`].
pub trait EngineInstance {
    /// Read the instance's current log level.
    fn log_level(&self) -> SessionResult<LogLevel>;

    /// Shut the instance down. Called at most once by
    /// [`InstanceSession`](crate::InstanceSession).
    fn release(&mut self) -> SessionResult<()>;
}

/// Source of engine instances.
pub trait InstanceProvider {
    type Instance: EngineInstance;

    fn acquire(&mut self) -> SessionResult<Self::Instance>;
}

impl<P: InstanceProvider + ?Sized> InstanceProvider for &mut P {
    type Instance = P::Instance;

    fn acquire(&mut self) -> SessionResult<Self::Instance> {
        (**self).acquire()
    }
}
