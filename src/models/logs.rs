use serde::{Deserialize, Serialize};

/// One scanned file: either its matched lines (most recent first) or a
/// human-readable reason nothing could be read from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFile {
    pub file_name: String,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_lines: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogFile {
    pub fn with_lines(file_name: String, file_path: String, log_lines: Vec<String>) -> Self {
        Self {
            file_name,
            file_path,
            log_lines: Some(log_lines),
            error: None,
        }
    }

    pub fn with_error(file_name: String, file_path: String, error: impl Into<String>) -> Self {
        Self {
            file_name,
            file_path,
            log_lines: None,
            error: Some(error.into()),
        }
    }
}

/// Response of one node's `/logs` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogReadResponse {
    pub server_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_files: Option<Vec<LogFile>>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl LogReadResponse {
    /// A response carrying no file data, only node-level errors.
    pub fn failed(server_name: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            server_name: server_name.into(),
            log_files: None,
            errors,
        }
    }
}

/// Fleet-wide response: one entry per configured server, in configured
/// order, plus any validation errors that stopped dispatch entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogAggregateResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_logs: Option<Vec<LogReadResponse>>,
    #[serde(default)]
    pub errors: Vec<String>,
}
