use std::io::Write;

use crate::error::SessionResult;
use crate::level::LogLevel;
use crate::provider::InstanceProvider;
use crate::session::with_instance_session;

pub const LOG_LEVEL_LABEL: &str = "instance.or_log_level";

/// Render the report line, e.g. `instance.or_log_level='INFO'`.
pub fn format_log_level_line(level: LogLevel) -> String {
    format!("{LOG_LEVEL_LABEL}='{level}'")
}

/// Acquire an instance, print its log level to `out`, and release it.
///
/// Nothing is written unless the read succeeds.
pub fn run<P, W>(provider: P, out: &mut W) -> SessionResult<LogLevel>
where
    P: InstanceProvider,
    W: Write,
{
    with_instance_session(provider, |session| {
        let level = session.log_level()?;
        writeln!(out, "{}", format_log_level_line(level))?;
        out.flush()?;
        Ok(level)
    })
}
