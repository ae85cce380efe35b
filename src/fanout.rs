use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task;
use tracing::warn;

use crate::config::{AppConfig, LOCAL_SERVER};
use crate::models::logs::{LogAggregateResponse, LogReadResponse};
use crate::query::read_local;

/// Peer requests that outlive this are reported as fetch failures,
/// bounding total aggregate latency.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const FETCH_ERROR: &str = "There was an error fetching the response from the server";
const PARSE_ERROR: &str = "There was an error parsing the response from the server";

#[derive(Debug)]
pub enum FetchError {
    /// The request never produced a body.
    Request(reqwest::Error),
    /// A body arrived but was not a log read response.
    Parse(serde_json::Error),
}

/// The outbound transport seam: the coordinator only needs "give me the
/// response behind this URL", so tests can substitute a fake.
pub trait FetchLogs {
    async fn fetch_logs(&self, url: &str) -> Result<LogReadResponse, FetchError>;
}

/// Shared `reqwest` client, built once at startup and injected.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

impl FetchLogs for HttpFetcher {
    async fn fetch_logs(&self, url: &str) -> Result<LogReadResponse, FetchError> {
        let body = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::Request)?
            .text()
            .await
            .map_err(FetchError::Request)?;
        serde_json::from_str(&body).map_err(FetchError::Parse)
    }
}

/// Dispatches the query to every configured server concurrently and
/// blocks until all have answered. The local node runs on a blocking
/// task; remotes go through `fetcher`. Results come back in configured
/// server order, not completion order, and a failed node only poisons
/// its own slot.
pub async fn aggregate_logs<F: FetchLogs>(
    config: &AppConfig,
    fetcher: &F,
    file_name: Option<&str>,
    log_lines: Option<i64>,
    search_term: Option<&str>,
) -> LogAggregateResponse {
    // Other parameters may be valid on individual machines; only a
    // definitely invalid line cap is stopped before dispatch.
    if let Some(lines) = log_lines
        && lines < 1
    {
        return LogAggregateResponse {
            server_logs: None,
            errors: vec!["Requested log lines must be > 0".to_string()],
        };
    }

    let mut tasks: Vec<Pin<Box<dyn Future<Output = LogReadResponse> + '_>>> = Vec::new();
    for server in &config.log_servers {
        if server.eq_ignore_ascii_case(LOCAL_SERVER) {
            let config = config.clone();
            let file_name = file_name.map(str::to_owned);
            let search_term = search_term.map(str::to_owned);
            tasks.push(Box::pin(async move {
                let friendly_name = config.friendly_name.clone();
                let handle = task::spawn_blocking(move || {
                    read_local(&config, file_name.as_deref(), log_lines, search_term.as_deref())
                });
                match handle.await {
                    Ok(response) => response,
                    Err(err) => {
                        warn!(error = %err, "local read task failed");
                        LogReadResponse::failed(friendly_name, vec![FETCH_ERROR.to_string()])
                    }
                }
            }));
        } else {
            let url = make_url(server, file_name, log_lines, search_term);
            tasks.push(Box::pin(async move {
                match fetcher.fetch_logs(&url).await {
                    Ok(response) => response,
                    Err(FetchError::Request(err)) => {
                        warn!(url = %url, error = %err, "fetch from log server failed");
                        LogReadResponse::failed(url, vec![FETCH_ERROR.to_string()])
                    }
                    Err(FetchError::Parse(err)) => {
                        warn!(url = %url, error = %err, "log server response did not parse");
                        LogReadResponse::failed(url, vec![PARSE_ERROR.to_string()])
                    }
                }
            }));
        }
    }

    // join_all is the barrier; it also preserves input order.
    let server_logs = join_all(tasks).await;

    LogAggregateResponse {
        server_logs: Some(server_logs),
        errors: Vec::new(),
    }
}

/// Builds the `/logs` URL for one server. Present parameters are appended
/// in the fixed order fileName, logLines, searchTerm with no
/// percent-encoding; callers must not pass raw `&`/`=` in values.
pub fn make_url(
    server: &str,
    file_name: Option<&str>,
    log_lines: Option<i64>,
    search_term: Option<&str>,
) -> String {
    let mut url = format!("{server}/logs?");
    if let Some(name) = file_name {
        url.push_str(&format!("fileName={name}&"));
    }
    if let Some(lines) = log_lines {
        url.push_str(&format!("logLines={lines}&"));
    }
    if let Some(term) = search_term {
        url.push_str(&format!("searchTerm={term}"));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::logs::LogFile;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// What the fake hands back for a URL prefix.
    enum FakeReply {
        Ok(LogReadResponse),
        FetchFail,
        ParseFail,
    }

    /// Answers from a canned table and records every URL it was handed.
    struct FakeFetcher {
        responses: Vec<(String, FakeReply)>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(responses: Vec<(String, FakeReply)>) -> Self {
            Self {
                responses,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    fn bad_json() -> FetchError {
        FetchError::Parse(serde_json::from_str::<LogReadResponse>("not json").unwrap_err())
    }

    /// A real `reqwest` error: the hostless URL fails before any socket
    /// is opened.
    async fn request_error() -> FetchError {
        match HttpFetcher::new().unwrap().fetch_logs("http://").await {
            Err(err @ FetchError::Request(_)) => err,
            Err(FetchError::Parse(_)) => panic!("expected a request error, got a parse error"),
            Ok(_) => panic!("expected a request error"),
        }
    }

    impl FetchLogs for FakeFetcher {
        async fn fetch_logs(&self, url: &str) -> Result<LogReadResponse, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            for (prefix, reply) in &self.responses {
                if url.starts_with(prefix.as_str()) {
                    return match reply {
                        FakeReply::Ok(response) => Ok(response.clone()),
                        FakeReply::FetchFail => Err(request_error().await),
                        FakeReply::ParseFail => Err(bad_json()),
                    };
                }
            }
            panic!("unexpected url {url}");
        }
    }

    fn config_for(dir: &TempDir, servers: &[&str]) -> AppConfig {
        AppConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            friendly_name: "local-node".into(),
            log_root: dir.path().to_path_buf(),
            default_line_limit: None,
            log_servers: servers.iter().map(|server| server.to_string()).collect(),
            service_log_dir: dir.path().join("svc-log"),
        }
    }

    fn remote_ok(name: &str) -> LogReadResponse {
        LogReadResponse {
            server_name: name.into(),
            log_files: Some(vec![LogFile::with_lines(
                "remote.log".into(),
                "remote.log".into(),
                vec!["line".into()],
            )]),
            errors: Vec::new(),
        }
    }

    #[test]
    fn builds_urls_in_fixed_parameter_order() {
        assert_eq!(
            make_url("http://a", Some("app.log"), Some(5), Some("ERR")),
            "http://a/logs?fileName=app.log&logLines=5&searchTerm=ERR"
        );
        assert_eq!(
            make_url("http://a", None, Some(5), None),
            "http://a/logs?logLines=5&"
        );
        assert_eq!(make_url("http://a", None, None, None), "http://a/logs?");
        assert_eq!(
            make_url("http://a", Some("app.log"), None, Some("ERR")),
            "http://a/logs?fileName=app.log&searchTerm=ERR"
        );
    }

    #[tokio::test]
    async fn preserves_configured_order_and_isolates_failures() {
        let dir = TempDir::new().unwrap();
        let mut file = File::create(dir.path().join("local.log")).unwrap();
        file.write_all(b"local line\n").unwrap();

        let config = config_for(&dir, &["self", "http://a", "http://b"]);
        let fetcher = FakeFetcher::new(vec![
            ("http://a".into(), FakeReply::Ok(remote_ok("node-a"))),
            ("http://b".into(), FakeReply::ParseFail),
        ]);

        let response = aggregate_logs(&config, &fetcher, None, Some(3), None).await;

        assert!(response.errors.is_empty());
        let server_logs = response.server_logs.unwrap();
        assert_eq!(server_logs.len(), 3);

        assert_eq!(server_logs[0].server_name, "local-node");
        assert!(server_logs[0].log_files.is_some());

        assert_eq!(server_logs[1].server_name, "node-a");
        assert!(server_logs[1].log_files.is_some());

        // The broken node reports as its URL with exactly one diagnostic.
        assert_eq!(server_logs[2].server_name, "http://b/logs?logLines=3&");
        assert!(server_logs[2].log_files.is_none());
        assert_eq!(server_logs[2].errors, vec![PARSE_ERROR.to_string()]);
    }

    #[tokio::test]
    async fn unreachable_node_reports_a_single_fetch_failure() {
        let dir = TempDir::new().unwrap();
        let mut file = File::create(dir.path().join("local.log")).unwrap();
        file.write_all(b"local line\n").unwrap();

        let config = config_for(&dir, &["self", "http://a", "http://b"]);
        let fetcher = FakeFetcher::new(vec![
            ("http://a".into(), FakeReply::Ok(remote_ok("node-a"))),
            ("http://b".into(), FakeReply::FetchFail),
        ]);

        let response = aggregate_logs(&config, &fetcher, None, None, None).await;

        let server_logs = response.server_logs.unwrap();
        assert_eq!(server_logs.len(), 3);
        assert_eq!(server_logs[0].server_name, "local-node");
        assert!(server_logs[0].log_files.is_some());
        assert_eq!(server_logs[1].server_name, "node-a");
        assert!(server_logs[1].log_files.is_some());

        // The dead node keeps its slot, labeled by the URL it was asked.
        assert_eq!(server_logs[2].server_name, "http://b/logs?");
        assert!(server_logs[2].log_files.is_none());
        assert_eq!(server_logs[2].errors, vec![FETCH_ERROR.to_string()]);
    }

    #[tokio::test]
    async fn http_fetcher_surfaces_request_errors_as_fetch_failures() {
        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher.fetch_logs("http://").await;
        assert!(matches!(result, Err(FetchError::Request(_))));
    }

    #[tokio::test]
    async fn invalid_line_cap_short_circuits_dispatch() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir, &["self", "http://a"]);
        let fetcher = FakeFetcher::new(Vec::new());

        let response = aggregate_logs(&config, &fetcher, None, Some(0), None).await;

        assert_eq!(response.errors, vec!["Requested log lines must be > 0"]);
        assert!(response.server_logs.is_none());
        assert!(fetcher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remote_urls_carry_the_query_parameters() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir, &["http://a"]);
        let fetcher = FakeFetcher::new(vec![("http://a".into(), FakeReply::Ok(remote_ok("node-a")))]);

        aggregate_logs(&config, &fetcher, Some("app.log"), Some(7), Some("WARN")).await;

        assert_eq!(
            fetcher.calls.lock().unwrap().as_slice(),
            ["http://a/logs?fileName=app.log&logLines=7&searchTerm=WARN"]
        );
    }
}
