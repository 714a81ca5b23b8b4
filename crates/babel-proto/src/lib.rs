//! JSON-RPC wire types for `perl6-babel serve`
//!
//! One request object per line in, one response object per line out.

use babel_core::{ResultMode, ResultValue, SessionInfo};
use serde::{Deserialize, Serialize};

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
/// The evaluation itself failed; the message is the interpreter's diagnostic.
pub const EVALUATION_FAILED: i64 = -32000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub id: u64,
    pub error: ErrorObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(serde_json::Value::String(data.into()));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateParams {
    pub body: String,
    /// Omitted or `"none"` evaluates one-shot.
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub result_type: Option<ResultMode>,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateResult {
    pub raw: String,
    pub value: ResultValue,
    /// Plain JSON projection of `value`.
    pub json: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadParams {
    pub body: String,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResult {
    pub session: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsResult {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillParams {
    pub session: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillResult {
    pub removed: bool,
}

/// Recorded REPL input line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLog {
    pub timestamp: String,
    pub command: String,
}

/// Recorded REPL output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputLog {
    pub timestamp: String,
    pub output: String,
}
