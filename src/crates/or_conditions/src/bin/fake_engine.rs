use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use or_conditions::protocol::{
    encode_line, EngineRequest, EngineResponse, RequestEnvelope, ResponseEnvelope, READY_MARKER,
};
use or_conditions::LogLevel;

#[derive(Debug, Default)]
struct Options {
    log_level: LogLevel,
    jar: Option<PathBuf>,
    fail_startup: bool,
    hang_startup: bool,
    fail_log_level: bool,
    report_level: Option<String>,
    ignore_shutdown: bool,
    emit_latin1: bool,
}

fn parse_options() -> Result<Options, Box<dyn std::error::Error>> {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--log-level" => {
                let value = args.next().ok_or("--log-level needs a value")?;
                options.log_level = value.parse()?;
            }
            "--jar" => options.jar = Some(args.next().ok_or("--jar needs a value")?.into()),
            "--fail-startup" => options.fail_startup = true,
            "--hang-startup" => options.hang_startup = true,
            "--fail-log-level" => options.fail_log_level = true,
            "--report-level" => {
                options.report_level = Some(args.next().ok_or("--report-level needs a value")?)
            }
            "--ignore-shutdown" => options.ignore_shutdown = true,
            "--emit-latin1" => options.emit_latin1 = true,
            other => return Err(format!("unknown argument {other}").into()),
        }
    }
    Ok(options)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = parse_options()?;

    if options.fail_startup {
        eprintln!("fake engine: initialization failed");
        std::process::exit(3);
    }
    if let Some(jar) = &options.jar {
        if !jar.exists() {
            eprintln!("fake engine: jar {} not found", jar.display());
            std::process::exit(2);
        }
    }
    if options.hang_startup {
        loop {
            thread::sleep(Duration::from_secs(60));
        }
    }

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "12:00:00.000 [main] INFO  Starting fake OpenRocket core")?;
    writeln!(stdout, "fake {READY_MARKER} (log level {})", options.log_level)?;
    if options.emit_latin1 {
        // ISO-8859-1 degree sign, as a JVM with a Latin-1 default charset writes it.
        stdout.write_all(b"Launch site temperature 20\xb0C\n")?;
        io::stderr().write_all(b"Wind 5 m/s at 270\xb0\n")?;
    }
    stdout.flush()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let envelope: RequestEnvelope = serde_json::from_str(&line)?;
        let (payload, stop) = handle_request(&options, envelope.payload);
        let response = ResponseEnvelope {
            id: envelope.id,
            payload,
        };
        stdout.write_all(encode_line(&response)?.as_bytes())?;
        stdout.flush()?;
        if stop && !options.ignore_shutdown {
            return Ok(());
        }
    }

    if options.ignore_shutdown {
        loop {
            thread::sleep(Duration::from_secs(60));
        }
    }
    Ok(())
}

fn handle_request(options: &Options, request: EngineRequest) -> (EngineResponse, bool) {
    match request {
        EngineRequest::LogLevel if options.fail_log_level => (
            EngineResponse::Error {
                message: "log level unavailable".to_string(),
            },
            false,
        ),
        EngineRequest::LogLevel => {
            let level = options
                .report_level
                .clone()
                .unwrap_or_else(|| options.log_level.to_string());
            (EngineResponse::LogLevel { level }, false)
        }
        EngineRequest::Shutdown => (EngineResponse::Shutdown, true),
    }
}
