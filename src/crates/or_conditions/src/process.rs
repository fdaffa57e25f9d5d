use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::InstanceConfig;
use crate::error::{SessionError, SessionResult};
use crate::level::LogLevel;
use crate::protocol::{
    encode_line, is_ready_line, parse_response_line, EngineRequest, EngineResponse,
    RequestEnvelope, ResponseEnvelope,
};
use crate::provider::{EngineInstance, InstanceProvider};

/// How long release waits for engine pipes to drain after the process exits.
const COLLECTOR_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Origin stream for captured engine output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Single captured line of engine output with its source.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub stream: LogStream,
    pub line: String,
}

/// Provider that launches one engine process per acquisition.
#[derive(Debug, Clone)]
pub struct ProcessProvider {
    config: InstanceConfig,
}

impl ProcessProvider {
    pub fn new(config: InstanceConfig) -> Self {
        Self { config }
    }
}

impl InstanceProvider for ProcessProvider {
    type Instance = ProcessInstance;

    fn acquire(&mut self) -> SessionResult<ProcessInstance> {
        ProcessInstance::spawn(&self.config)
    }
}

/// Handle to a running engine process.
pub struct ProcessInstance {
    child: Child,
    stdin: Mutex<Option<ChildStdin>>,
    responses: mpsc::Receiver<ResponseEnvelope>,
    log_buffer: Arc<Mutex<Vec<LogLine>>>,
    log_collector: Option<thread::JoinHandle<()>>,
    next_id: AtomicU64,
    request_timeout: Duration,
    shutdown_timeout: Duration,
    released: bool,
}

impl ProcessInstance {
    /// Launch the engine and wait until it reports readiness.
    pub fn spawn(config: &InstanceConfig) -> SessionResult<Self> {
        let mut cmd = Command::new(&config.binary_path);
        cmd.args(config.launch_args());
        if let Some(dir) = &config.working_directory {
            cmd.current_dir(dir);
        }
        cmd.envs(&config.env);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|err| {
            SessionError::acquisition(format!("{}: {err}", config.binary_path.display()))
        })?;
        info!(
            pid = child.id(),
            binary = %config.binary_path.display(),
            level = %config.log_level,
            "launched engine"
        );

        let (stdin, stdout, stderr) = match (
            child.stdin.take(),
            child.stdout.take(),
            child.stderr.take(),
        ) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                kill_and_reap(&mut child);
                return Err(SessionError::acquisition("failed to capture engine stdio"));
            }
        };

        let (log_tx, log_rx) = mpsc::channel();
        let (response_tx, response_rx) = mpsc::channel();
        spawn_stdout_reader(stdout, log_tx.clone(), response_tx);
        spawn_log_reader(stderr, LogStream::Stderr, log_tx);

        let log_buffer = Arc::new(Mutex::new(Vec::new()));
        if let Err(err) = wait_for_ready(&mut child, &log_rx, &log_buffer, config.startup_timeout)
        {
            kill_and_reap(&mut child);
            return Err(err);
        }
        let log_collector = spawn_log_collector(log_rx, log_buffer.clone());

        Ok(Self {
            child,
            stdin: Mutex::new(Some(stdin)),
            responses: response_rx,
            log_buffer,
            log_collector: Some(log_collector),
            next_id: AtomicU64::new(1),
            request_timeout: config.request_timeout,
            shutdown_timeout: config.shutdown_timeout,
            released: false,
        })
    }

    /// True once the engine process has terminated.
    pub fn has_exited(&mut self) -> SessionResult<bool> {
        Ok(self.child.try_wait()?.is_some())
    }

    /// Return all captured engine output across streams.
    pub fn logs(&self) -> Vec<LogLine> {
        self.log_buffer
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default()
    }

    fn send(&self, request: EngineRequest) -> SessionResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let line = encode_line(&RequestEnvelope {
            id,
            payload: request,
        })?;

        let mut guard = self
            .stdin
            .lock()
            .map_err(|_| SessionError::ConnectionClosed)?;
        let stdin = guard.as_mut().ok_or(SessionError::ConnectionClosed)?;
        stdin
            .write_all(line.as_bytes())
            .and_then(|()| stdin.flush())
            .map_err(closed_on_broken_pipe)?;
        Ok(id)
    }

    fn await_response(&self, id: u64) -> SessionResult<EngineResponse> {
        let deadline = Instant::now() + self.request_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.responses.recv_timeout(remaining) {
                Ok(envelope) if envelope.id == id => return Ok(envelope.payload),
                Ok(envelope) => debug!(id = envelope.id, "discarding stale engine response"),
                Err(mpsc::RecvTimeoutError::Timeout) => break,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(SessionError::ConnectionClosed)
                }
            }
        }

        Err(SessionError::RequestTimeout {
            id,
            timeout: self.request_timeout,
        })
    }

    fn shutdown(&mut self) -> SessionResult<()> {
        if let Err(err) = self.send(EngineRequest::Shutdown) {
            debug!(error = %err, "shutdown request not delivered");
        }
        // Closing stdin lets an engine that missed the request exit on EOF.
        if let Ok(mut guard) = self.stdin.lock() {
            guard.take();
        }

        let start = Instant::now();
        while start.elapsed() < self.shutdown_timeout {
            if let Some(status) = self.child.try_wait()? {
                debug!(%status, "engine exited");
                self.join_workers();
                return Ok(());
            }
            thread::sleep(Duration::from_millis(10));
        }

        warn!(
            pid = self.child.id(),
            timeout = ?self.shutdown_timeout,
            "engine did not exit after shutdown request; killing"
        );
        if let Err(err) = self.child.kill() {
            if self.child.try_wait()?.is_none() {
                return Err(SessionError::release(format!(
                    "failed to kill engine {}: {err}",
                    self.child.id()
                )));
            }
        }
        self.child.wait()?;
        self.join_workers();
        Ok(())
    }

    fn join_workers(&mut self) {
        if let Some(handle) = self.log_collector.take() {
            // The collector ends once every holder of the child's pipes is
            // gone, which a stray grandchild can postpone indefinitely.
            if !join_within(handle, COLLECTOR_JOIN_TIMEOUT) {
                warn!(
                    timeout = ?COLLECTOR_JOIN_TIMEOUT,
                    "engine output still open after exit; detaching log collector"
                );
            }
        }
    }
}

impl EngineInstance for ProcessInstance {
    fn log_level(&self) -> SessionResult<LogLevel> {
        let id = self.send(EngineRequest::LogLevel)?;
        match self.await_response(id)? {
            EngineResponse::LogLevel { level } => level
                .parse()
                .map_err(|err| SessionError::read(format!("engine reported {err}"))),
            EngineResponse::Error { message } => Err(SessionError::read(message)),
            other => Err(SessionError::unexpected(format!(
                "log level request returned {other:?}"
            ))),
        }
    }

    fn release(&mut self) -> SessionResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.shutdown()
    }
}

impl Drop for ProcessInstance {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(error = %err, "engine shutdown failed during drop");
        }
    }
}

fn closed_on_broken_pipe(err: io::Error) -> SessionError {
    if err.kind() == io::ErrorKind::BrokenPipe {
        SessionError::ConnectionClosed
    } else {
        SessionError::Io(err)
    }
}

/// Join `handle` if it finishes within `timeout`; otherwise detach it.
fn join_within(handle: thread::JoinHandle<()>, timeout: Duration) -> bool {
    let start = Instant::now();
    while !handle.is_finished() {
        if start.elapsed() >= timeout {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    let _ = handle.join();
    true
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_log_reader<R: io::Read + Send + 'static>(
    reader: R,
    stream: LogStream,
    tx: mpsc::Sender<LogLine>,
) {
    thread::spawn(move || {
        for_each_line(reader, |line| {
            let _ = tx.send(LogLine { stream, line });
        });
    });
}

/// Route stdout lines to the response channel or the log channel.
fn spawn_stdout_reader<R: io::Read + Send + 'static>(
    reader: R,
    log_tx: mpsc::Sender<LogLine>,
    response_tx: mpsc::Sender<ResponseEnvelope>,
) {
    thread::spawn(move || {
        for_each_line(reader, |line| match parse_response_line(&line) {
            Some(envelope) => {
                let _ = response_tx.send(envelope);
            }
            None => {
                let _ = log_tx.send(LogLine {
                    stream: LogStream::Stdout,
                    line,
                });
            }
        });
    });
}

/// Feed trimmed lines to `handle` until EOF or a read error.
///
/// Bytes that are not UTF-8 (a JVM writing Latin-1, say) are replaced rather
/// than ending the stream.
fn for_each_line<R: io::Read>(reader: R, mut handle: impl FnMut(String)) {
    let mut buf_reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match buf_reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => handle(String::from_utf8_lossy(&buf).trim().to_string()),
        }
    }
}

fn wait_for_ready(
    child: &mut Child,
    log_rx: &mpsc::Receiver<LogLine>,
    log_buffer: &Arc<Mutex<Vec<LogLine>>>,
    timeout: Duration,
) -> SessionResult<()> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if let Some(status) = child.try_wait()? {
            return Err(SessionError::EngineExited(status));
        }

        match log_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(line) => {
                debug!(stream = ?line.stream, "{}", line.line);
                let ready = line.stream == LogStream::Stdout && is_ready_line(&line.line);
                if let Ok(mut buffer) = log_buffer.lock() {
                    buffer.push(line);
                }
                if ready {
                    return Ok(());
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // Both pipes closed; the process is exiting.
                let status = child.wait()?;
                return Err(SessionError::EngineExited(status));
            }
        }
    }

    Err(SessionError::StartupTimeout(timeout))
}

fn spawn_log_collector(
    log_rx: mpsc::Receiver<LogLine>,
    buffer: Arc<Mutex<Vec<LogLine>>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(line) = log_rx.recv() {
            debug!(stream = ?line.stream, "{}", line.line);
            if let Ok(mut guard) = buffer.lock() {
                guard.push(line);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_an_acquisition_error() {
        let config = InstanceConfig::new("/nonexistent/openrocket-engine");
        let err = ProcessProvider::new(config)
            .acquire()
            .err()
            .expect("spawn should fail");

        assert!(
            matches!(err, SessionError::Acquisition(ref message)
                if message.starts_with("/nonexistent/openrocket-engine")),
            "unexpected error {err:?}"
        );
    }

    #[test]
    fn non_utf8_output_does_not_end_the_stream() {
        let output: &[u8] = b"engine ready\nTemp 20\xb0C\n{\"id\":1}\n";
        let mut lines = Vec::new();
        for_each_line(output, |line| lines.push(line));

        assert_eq!(lines, vec!["engine ready", "Temp 20\u{FFFD}C", "{\"id\":1}"]);
    }

    #[test]
    fn final_line_without_newline_is_kept() {
        let mut lines = Vec::new();
        for_each_line(&b"  shutting down  "[..], |line| lines.push(line));
        assert_eq!(lines, vec!["shutting down"]);
    }

    #[test]
    fn stuck_worker_is_detached_after_timeout() {
        let (tx, rx) = mpsc::channel::<()>();
        let stuck = thread::spawn(move || {
            let _ = rx.recv();
        });
        assert!(!join_within(stuck, Duration::from_millis(50)));
        drop(tx);

        let done = thread::spawn(|| {});
        assert!(join_within(done, Duration::from_secs(2)));
    }

    #[test]
    fn broken_pipe_means_closed_connection() {
        let closed = closed_on_broken_pipe(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(matches!(closed, SessionError::ConnectionClosed));

        let other = closed_on_broken_pipe(io::Error::new(io::ErrorKind::Other, "disk"));
        assert!(matches!(other, SessionError::Io(_)));
    }
}
