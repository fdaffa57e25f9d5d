//! Scoped sessions with an external OpenRocket engine instance.
//!
//! An [`InstanceSession`] owns an engine instance for the duration of a scope
//! and releases it exactly once on every exit path. The production
//! [`ProcessProvider`] launches an engine launcher binary and talks to it over
//! the line protocol in [`protocol`].
//!
//! Typical usage:
//! ```no_run
//! use or_conditions::{
//!     with_instance_session, InstanceConfig, LogLevel, ProcessProvider,
//! };
//!
//! let config = InstanceConfig::new("/opt/openrocket/openrocket-engine")
//!     .with_jar_path("OpenRocket-15.03.jar")
//!     .with_log_level(LogLevel::Info);
//!
//! let level = with_instance_session(ProcessProvider::new(config), |session| {
//!     session.log_level()
//! })
//! .expect("engine should answer");
//! println!("engine logs at {level}");
//! ```

mod config;
mod error;
mod level;
mod logging;
mod process;
pub mod protocol;
mod provider;
mod report;
mod session;

pub use config::{InstanceConfig, DEFAULT_ENGINE_BINARY};
pub use error::{SessionError, SessionResult};
pub use level::{LogLevel, UnknownLogLevel};
pub use logging::{init_logging, DEFAULT_LOG_FILTER};
pub use process::{LogLine, LogStream, ProcessInstance, ProcessProvider};
pub use provider::{EngineInstance, InstanceProvider};
pub use report::{format_log_level_line, run, LOG_LEVEL_LABEL};
pub use session::{with_instance_session, InstanceSession, SessionState};
