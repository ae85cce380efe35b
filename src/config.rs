use std::io::ErrorKind;
use std::{env, fs, path::Path, path::PathBuf};

use crate::error::AppError;

/// Server string in `LOG_SERVERS` meaning "query this process directly".
pub const LOCAL_SERVER: &str = "self";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Display name this node reports as `serverName`.
    pub friendly_name: String,
    /// Root directory all queries are resolved against.
    pub log_root: PathBuf,
    /// Line cap applied when a query does not carry one; `None` is
    /// unlimited.
    pub default_line_limit: Option<usize>,
    /// Ordered fleet of servers `/aggregate` queries, possibly including
    /// the literal `self`.
    pub log_servers: Vec<String>,
    /// Where this service writes its own log file.
    pub service_log_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid SERVER_PORT: {err}")))?;

        let friendly_name = env::var("FRIENDLY_NAME").unwrap_or_else(|_| "log-server".into());

        let log_root =
            PathBuf::from(env::var("LOG_ROOT").map_err(|_| AppError::Config("missing LOG_ROOT".into()))?);
        validate_log_root(&log_root)?;

        let default_line_limit = match env::var("DEFAULT_LINE_LIMIT") {
            Ok(value) => {
                let limit: usize = value
                    .parse()
                    .map_err(|err| AppError::Config(format!("invalid DEFAULT_LINE_LIMIT: {err}")))?;
                if limit == 0 {
                    return Err(AppError::Config("DEFAULT_LINE_LIMIT must be > 0".into()));
                }
                Some(limit)
            }
            Err(_) => None,
        };

        let log_servers: Vec<String> = env::var("LOG_SERVERS")
            .unwrap_or_else(|_| LOCAL_SERVER.into())
            .split(',')
            .map(|server| server.trim().to_string())
            .filter(|server| !server.is_empty())
            .collect();

        let service_log_dir =
            PathBuf::from(env::var("SERVICE_LOG_DIR").unwrap_or_else(|_| "./log".into()));

        Ok(Self {
            host,
            port,
            friendly_name,
            log_root,
            default_line_limit,
            log_servers,
            service_log_dir,
        })
    }
}

/// The root every query resolves against must be an absolute, existing,
/// readable directory before the server accepts any request.
pub fn validate_log_root(log_root: &Path) -> Result<(), AppError> {
    if !log_root.is_absolute() {
        return Err(AppError::Config("LOG_ROOT must be an absolute path".into()));
    }

    let metadata = fs::metadata(log_root).map_err(|err| match err.kind() {
        ErrorKind::NotFound => AppError::Config("LOG_ROOT must exist".into()),
        _ => AppError::Config(format!("LOG_ROOT is not accessible: {err}")),
    })?;

    if !metadata.is_dir() {
        return Err(AppError::Config("LOG_ROOT must be a directory path".into()));
    }

    fs::read_dir(log_root)
        .map_err(|err| AppError::Config(format!("LOG_ROOT must be readable by this process: {err}")))?;

    Ok(())
}
