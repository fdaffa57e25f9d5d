#![cfg(feature = "test-support")]

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use or_conditions::{
    run, with_instance_session, EngineInstance, InstanceConfig, InstanceProvider, LogLevel,
    LogStream, ProcessProvider, SessionError,
};
use tempfile::TempDir;

fn fake_engine_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_fake_engine") {
        return PathBuf::from(path);
    }

    // Fallback to the workspace target directory.
    let mut path = std::env::current_exe().expect("current exe");
    path.pop(); // deps
    path.pop(); // debug or release
    path.push("fake_engine");
    if cfg!(windows) {
        path.set_extension("exe");
    }
    path
}

fn fake_config() -> InstanceConfig {
    InstanceConfig::new(fake_engine_path())
        .with_startup_timeout(Duration::from_secs(10))
        .with_shutdown_timeout(Duration::from_secs(2))
}

#[test]
fn reports_requested_level_end_to_end() {
    let provider = ProcessProvider::new(fake_config().with_log_level(LogLevel::Info));
    let mut out = Vec::new();

    let level = run(provider, &mut out).expect("run should succeed");

    assert_eq!(level, LogLevel::Info);
    assert_eq!(String::from_utf8(out).unwrap(), "instance.or_log_level='INFO'\n");
}

#[test]
fn loads_jar_from_working_directory() {
    let workdir = TempDir::new().expect("temp workdir");
    fs::write(workdir.path().join("OpenRocket-15.03.jar"), b"PK").expect("write jar");

    let config = fake_config()
        .with_working_directory(workdir.path())
        .with_jar_path("OpenRocket-15.03.jar");
    let level = with_instance_session(ProcessProvider::new(config), |session| {
        let logs = session.instance().logs();
        assert!(
            logs.iter()
                .any(|line| line.stream == LogStream::Stdout && line.line.contains("engine ready")),
            "ready line should be captured: {logs:?}"
        );
        session.log_level()
    })
    .expect("session should succeed");

    assert_eq!(level, LogLevel::Error);
}

#[test]
fn missing_jar_is_an_acquisition_error() {
    let workdir = TempDir::new().expect("temp workdir");
    let config = fake_config()
        .with_working_directory(workdir.path())
        .with_jar_path("missing.jar");

    let err = ProcessProvider::new(config)
        .acquire()
        .err()
        .expect("acquisition should fail");

    assert!(matches!(err, SessionError::EngineExited(_)), "unexpected error {err:?}");
    assert!(err.is_acquisition());
}

#[test]
fn startup_failure_produces_no_output() {
    let provider = ProcessProvider::new(fake_config().with_arg("--fail-startup"));
    let mut out = Vec::new();

    let err = run(provider, &mut out).expect_err("startup should fail");

    assert!(err.is_acquisition(), "unexpected error {err:?}");
    assert!(out.is_empty());
}

#[test]
fn silent_engine_times_out_during_startup() {
    let config = fake_config()
        .with_arg("--hang-startup")
        .with_startup_timeout(Duration::from_millis(300));

    let err = ProcessProvider::new(config)
        .acquire()
        .err()
        .expect("startup should time out");

    assert!(matches!(err, SessionError::StartupTimeout(_)), "unexpected error {err:?}");
}

#[test]
fn failed_read_still_shuts_engine_down() {
    let mut provider = ProcessProvider::new(fake_config().with_arg("--fail-log-level"));
    let mut instance = provider.acquire().expect("engine should launch");

    let err = instance.log_level().expect_err("read should fail");
    assert!(matches!(err, SessionError::Read(ref message) if message == "log level unavailable"));

    instance.release().expect("release should succeed");
    assert!(instance.has_exited().expect("process status"));
}

#[test]
fn unknown_level_from_engine_is_a_read_error() {
    let provider = ProcessProvider::new(fake_config().with_arg("--report-level").with_arg("LOUD"));
    let mut out = Vec::new();

    let err = run(provider, &mut out).expect_err("unknown level should fail");

    assert!(err.is_read(), "unexpected error {err:?}");
    assert!(out.is_empty());
}

#[test]
fn unresponsive_engine_is_killed_on_release() {
    let config = fake_config()
        .with_arg("--ignore-shutdown")
        .with_shutdown_timeout(Duration::from_millis(200));
    let mut instance = ProcessProvider::new(config)
        .acquire()
        .expect("engine should launch");

    assert_eq!(instance.log_level().expect("read"), LogLevel::Error);
    instance.release().expect("release should kill the engine");
    assert!(instance.has_exited().expect("process status"));
}

#[test]
fn repeated_runs_print_the_same_line() {
    let mut outputs = Vec::new();
    for _ in 0..2 {
        let provider = ProcessProvider::new(fake_config().with_log_level(LogLevel::Warn));
        let mut out = Vec::new();
        run(provider, &mut out).expect("run should succeed");
        outputs.push(String::from_utf8(out).unwrap());
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], "instance.or_log_level='WARN'\n");
}

#[test]
fn latin1_engine_output_keeps_the_connection_alive() {
    let config = fake_config()
        .with_log_level(LogLevel::Info)
        .with_arg("--emit-latin1");
    let mut out = Vec::new();

    let level = run(ProcessProvider::new(config.clone()), &mut out).expect("run should succeed");
    assert_eq!(level, LogLevel::Info);
    assert_eq!(String::from_utf8(out).unwrap(), "instance.or_log_level='INFO'\n");

    let mut instance = ProcessProvider::new(config)
        .acquire()
        .expect("engine should launch");
    assert_eq!(instance.log_level().expect("read"), LogLevel::Info);
    assert_eq!(instance.log_level().expect("second read"), LogLevel::Info);
    instance.release().expect("release should succeed");

    let logs = instance.logs();
    assert!(
        logs.iter().any(|line| line.stream == LogStream::Stdout
            && line.line == "Launch site temperature 20\u{FFFD}C"),
        "latin-1 stdout line should be captured: {logs:?}"
    );
    assert!(
        logs.iter()
            .any(|line| line.stream == LogStream::Stderr && line.line == "Wind 5 m/s at 270\u{FFFD}"),
        "latin-1 stderr line should be captured: {logs:?}"
    );
}
