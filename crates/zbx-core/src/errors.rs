//! Error types for failure handling across the client library
//!
//! A single error hierarchy covers both transports (HTTP for the API,
//! raw TCP for the sender) so callers match on one enum regardless of
//! which side of Zabbix they are talking to. API-level failures carry the
//! server's error object together with a masked copy of the request that
//! triggered it, which is what operators need when a method call is
//! rejected.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ZbxError {
    /// The server answered the JSON-RPC envelope with an `error` object.
    /// `json` is the serialized request with sensitive values masked.
    #[error("Zabbix API error {code}: {message}")]
    Api {
        code: i64,
        message: String,
        data: Option<String>,
        json: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("server rejected request: {0}")]
    Rejected(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<std::io::Error> for ZbxError {
    fn from(err: std::io::Error) -> Self {
        ZbxError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for ZbxError {
    fn from(err: reqwest::Error) -> Self {
        ZbxError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ZbxError {
    fn from(err: serde_json::Error) -> Self {
        ZbxError::Json(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ZbxError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ZbxError::Timeout(err.to_string())
    }
}
