//! Line-delimited JSON protocol spoken with an engine launcher over its
//! stdin and stdout.
//!
//! Every request and response is a single JSON object on its own line. The
//! launcher may interleave free-form log output on stdout; anything that does
//! not decode as a [`ResponseEnvelope`] is treated as a log line.

use serde::{Deserialize, Serialize};

/// Marker the engine prints on stdout once it accepts requests.
pub const READY_MARKER: &str = "engine ready";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum EngineRequest {
    LogLevel,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum EngineResponse {
    LogLevel { level: String },
    Shutdown,
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u64,
    pub payload: EngineRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    pub payload: EngineResponse,
}

/// Encode a message as a single protocol line, including the trailing newline.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Decode a stdout line as a response, or `None` if it is ordinary output.
pub fn parse_response_line(line: &str) -> Option<ResponseEnvelope> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

pub fn is_ready_line(line: &str) -> bool {
    line.to_ascii_lowercase().contains(READY_MARKER)
}
