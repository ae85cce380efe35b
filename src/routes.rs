use actix_web::{HttpResponse, get, web};
use serde::Deserialize;
use serde_json::json;

use crate::{AppState, error::AppError, fanout, query::read_local};

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(read_logs).service(aggregate_logs);
}

#[get("/healthz")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "logfleet",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// The shared query shape of `/logs` and `/aggregate`, matching the wire
/// names peers send.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub file_name: Option<String>,
    pub log_lines: Option<i64>,
    pub search_term: Option<String>,
}

#[get("/logs")]
async fn read_logs(
    params: web::Query<LogQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let params = params.into_inner();
    let config = state.config.clone();

    // The scan is synchronous disk I/O; keep it off the worker threads.
    let response = web::block(move || {
        read_local(
            &config,
            params.file_name.as_deref(),
            params.log_lines,
            params.search_term.as_deref(),
        )
    })
    .await
    .map_err(|err| AppError::Internal(format!("log read task failed: {err}")))?;

    Ok(HttpResponse::Ok().json(response))
}

#[get("/aggregate")]
async fn aggregate_logs(params: web::Query<LogQuery>, state: web::Data<AppState>) -> HttpResponse {
    let params = params.into_inner();
    let response = fanout::aggregate_logs(
        &state.config,
        &state.fetcher,
        params.file_name.as_deref(),
        params.log_lines,
        params.search_term.as_deref(),
    )
    .await;

    HttpResponse::Ok().json(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::fanout::HttpFetcher;
    use crate::models::logs::{LogAggregateResponse, LogReadResponse};
    use actix_web::{App, test};
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn state_for(dir: &TempDir) -> web::Data<AppState> {
        web::Data::new(AppState {
            config: AppConfig {
                host: "127.0.0.1".into(),
                port: 8080,
                friendly_name: "route-test".into(),
                log_root: dir.path().to_path_buf(),
                default_line_limit: Some(100),
                log_servers: vec!["self".into()],
                service_log_dir: dir.path().join("svc-log"),
            },
            fetcher: HttpFetcher::new().unwrap(),
        })
    }

    fn write_numbers(dir: &TempDir) {
        let contents = (1..=10).map(|n| n.to_string()).collect::<Vec<_>>().join("\n");
        let mut file = File::create(dir.path().join("numberFile.txt")).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[actix_web::test]
    async fn logs_endpoint_returns_capped_lines() {
        let dir = TempDir::new().unwrap();
        write_numbers(&dir);
        let app =
            test::init_service(App::new().app_data(state_for(&dir)).configure(register)).await;

        let request = test::TestRequest::get()
            .uri("/logs?fileName=numberFile.txt&logLines=4")
            .to_request();
        let response: LogReadResponse = test::call_and_read_body_json(&app, request).await;

        assert_eq!(response.server_name, "route-test");
        assert!(response.errors.is_empty());
        let files = response.log_files.unwrap();
        assert_eq!(files[0].log_lines.as_deref().unwrap(), ["10", "9", "8", "7"]);
    }

    #[actix_web::test]
    async fn logs_endpoint_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let app =
            test::init_service(App::new().app_data(state_for(&dir)).configure(register)).await;

        let request = test::TestRequest::get()
            .uri("/logs?fileName=../../etc/passwd")
            .to_request();
        let response: LogReadResponse = test::call_and_read_body_json(&app, request).await;

        assert_eq!(response.errors, vec!["Provided file path is invalid"]);
        assert!(response.log_files.is_none());
    }

    #[actix_web::test]
    async fn aggregate_endpoint_covers_the_local_node() {
        let dir = TempDir::new().unwrap();
        write_numbers(&dir);
        let app =
            test::init_service(App::new().app_data(state_for(&dir)).configure(register)).await;

        let request = test::TestRequest::get()
            .uri("/aggregate?logLines=2")
            .to_request();
        let response: LogAggregateResponse = test::call_and_read_body_json(&app, request).await;

        assert!(response.errors.is_empty());
        let server_logs = response.server_logs.unwrap();
        assert_eq!(server_logs.len(), 1);
        assert_eq!(server_logs[0].server_name, "route-test");
    }

    #[actix_web::test]
    async fn health_endpoint_reports_ok() {
        let dir = TempDir::new().unwrap();
        let app =
            test::init_service(App::new().app_data(state_for(&dir)).configure(register)).await;

        let request = test::TestRequest::get().uri("/healthz").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["status"], "ok");
    }
}
