use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::level::LogLevel;

/// Launcher looked up on `PATH` when no explicit binary is configured.
pub const DEFAULT_ENGINE_BINARY: &str = "openrocket-engine";

/// Process-level configuration for launching an engine instance.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Path to the engine launcher binary to spawn.
    pub binary_path: PathBuf,
    /// Optional OpenRocket jar handed to the launcher via `--jar`.
    pub jar_path: Option<PathBuf>,
    /// Verbosity the instance is started with (passed via `--log-level`).
    pub log_level: LogLevel,
    /// Additional CLI arguments passed through to the launcher.
    pub extra_args: Vec<String>,
    /// Extra environment variables applied to the child process.
    pub env: BTreeMap<String, String>,
    /// Optional working directory override for the child process.
    pub working_directory: Option<PathBuf>,
    /// Upper bound on how long to wait for the engine to report readiness.
    pub startup_timeout: Duration,
    /// Upper bound on how long a single property request may take.
    pub request_timeout: Duration,
    /// Grace period after a shutdown request before the child is killed.
    pub shutdown_timeout: Duration,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE_BINARY)
    }
}

impl InstanceConfig {
    /// Create a new config targeting a specific launcher binary.
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            jar_path: None,
            log_level: LogLevel::default(),
            extra_args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
            // JVM startup plus OpenRocket module initialization is slow.
            startup_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    /// Provide the OpenRocket jar to load.
    pub fn with_jar_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.jar_path = Some(path.into());
        self
    }

    /// Set the verbosity the instance should start with.
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Add a passthrough CLI argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Add an environment variable override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Override the working directory for the spawned process.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Full argument list handed to the launcher.
    pub(crate) fn launch_args(&self) -> Vec<String> {
        let mut args = vec!["--log-level".to_string(), self.log_level.to_string()];
        if let Some(jar) = &self.jar_path {
            args.push("--jar".to_string());
            args.push(jar.display().to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}
