use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::config::AppConfig;
use crate::models::logs::LogReadResponse;
use crate::scanner::scan_logs;

/// Answers one node-local query: resolves `file_name` against the
/// configured root (rejecting any traversal out of it before touching the
/// filesystem), validates the line cap, then hands off to the scanner.
pub fn read_local(
    config: &AppConfig,
    file_name: Option<&str>,
    log_lines: Option<i64>,
    search_term: Option<&str>,
) -> LogReadResponse {
    let mut errors = Vec::new();

    let target = match file_name {
        Some(name) => {
            let requested = normalize(&config.log_root.join(name));
            if !requested.starts_with(&config.log_root) {
                errors.push("Provided file path is invalid".to_string());
                // Don't even go further for this one.
                return LogReadResponse::failed(config.friendly_name.clone(), errors);
            }
            requested
        }
        None => config.log_root.clone(),
    };

    if let Some(lines) = log_lines
        && lines < 1
    {
        errors.push("Requested log lines must be > 0".to_string());
    }

    // The root is validated at startup; this only trips when the query
    // names something that is not there.
    match fs::metadata(&target) {
        Err(err) if err.kind() == ErrorKind::NotFound => {
            errors.push("The log files specified do not exist".to_string());
        }
        Err(_) => errors.push("The log files specified cannot be read".to_string()),
        Ok(_) => {}
    }

    if !errors.is_empty() {
        return LogReadResponse::failed(config.friendly_name.clone(), errors);
    }

    let max_lines = match log_lines {
        Some(lines) => Some(lines as usize),
        None => config.default_line_limit,
    };
    let log_files = scan_logs(&target, &config.log_root, max_lines, search_term);

    LogReadResponse {
        server_name: config.friendly_name.clone(),
        log_files: Some(log_files),
        errors,
    }
}

/// Lexically resolves `.` and `..` segments without consulting the
/// filesystem, so escapes are caught even when the target does not exist.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}
