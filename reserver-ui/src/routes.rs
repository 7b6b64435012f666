//! HTTP route handlers for the UI API.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use reserver::core::interval::RetryConfig;
use reserver::core::study_filter::StudyRecord;
use reserver::core::types::Status;
use reserver::io::config::{ReserverConfig, load_config, save_retry_range};
use reserver::io::seen_store::load_logged_studies;
use reserver::session::SessionSnapshot;
use serde::Serialize;
use tracing::warn;

use crate::state::{AppState, StatusEvent};

const MANUAL_STOP: &str = "Manually stopped";

type ApiError = (StatusCode, String);

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/status", get(get_status))
        .route("/config", get(get_config).put(put_config))
        .route("/studies", get(list_studies))
}

async fn health() -> &'static str {
    "ok"
}

/// POST /api/start - (re)start the session.
async fn start(State(state): State<AppState>) -> StatusCode {
    state.session.start();
    StatusCode::ACCEPTED
}

/// POST /api/stop - manual stop.
async fn stop(State(state): State<AppState>) -> StatusCode {
    state.session.stop(MANUAL_STOP);
    StatusCode::ACCEPTED
}

#[derive(Serialize)]
struct StatusResponse {
    session: SessionSnapshot,
    last: Option<Status>,
}

/// GET /api/status - current session snapshot and the latest status line.
async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        session: state.session.snapshot(),
        last: state.reporter.latest(),
    })
}

/// GET /api/config - effective config.
async fn get_config(State(state): State<AppState>) -> Result<Json<ReserverConfig>, ApiError> {
    load_config(&state.paths.config_path)
        .map(Json)
        .map_err(internal_error)
}

/// PUT /api/config - save a new retry range and hand it to the session.
async fn put_config(
    State(state): State<AppState>,
    Json(retry): Json<RetryConfig>,
) -> Result<Json<ReserverConfig>, ApiError> {
    if let Err(err) = retry.validate_range() {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, format!("{err:#}")));
    }
    let cfg = save_retry_range(&state.paths.config_path, retry).map_err(internal_error)?;
    state.session.configure(cfg.retry);
    let _ = state.event_tx.send(StatusEvent::ConfigChanged);
    Ok(Json(cfg))
}

/// GET /api/studies - logged studies, oldest first.
async fn list_studies(State(state): State<AppState>) -> Result<Json<Vec<StudyRecord>>, ApiError> {
    let logged = load_logged_studies(&state.paths.logged_studies_path).map_err(internal_error)?;
    let mut records: Vec<StudyRecord> = logged.into_values().collect();
    records.sort_by(|a, b| (&a.date, &a.time, &a.id).cmp(&(&b.date, &b.time, &b.id)));
    Ok(Json(records))
}

fn internal_error(err: anyhow::Error) -> ApiError {
    warn!(error = %format!("{err:#}"), "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reserver::core::inspection::SuccessPolicy;
    use reserver::core::types::MachineState;
    use reserver::io::init::{InitOptions, init_reserver};
    use reserver::io::page::FilePage;
    use reserver::session::{SessionOptions, spawn_session};

    fn app_state(root: &std::path::Path) -> AppState {
        let paths = init_reserver(root, &InitOptions { force: false }).expect("init");
        let page = FilePage::new(
            root.join(".reserver/page.json"),
            root.join(".reserver/actions.jsonl"),
        );
        let reporter = AppState::reporter();
        let session = spawn_session(
            page,
            reporter.clone(),
            SessionOptions {
                retry: RetryConfig::default(),
                success_policy: SuccessPolicy::default(),
            },
        );
        AppState::new(paths, session, reporter)
    }

    #[tokio::test]
    async fn put_config_persists_and_notifies() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state = app_state(temp.path());
        let mut events = state.event_tx.subscribe();

        let Json(cfg) = put_config(State(state.clone()), Json(RetryConfig::new(3, 8)))
            .await
            .expect("put config");
        assert_eq!(cfg.retry, RetryConfig::new(3, 8));

        let Json(reloaded) = get_config(State(state.clone())).await.expect("get config");
        assert_eq!(reloaded.retry, RetryConfig::new(3, 8));

        let mut saw_config_changed = false;
        let mut saw_saved_status = false;
        for _ in 0..2 {
            match events.recv().await.expect("event") {
                StatusEvent::ConfigChanged => saw_config_changed = true,
                StatusEvent::Status(status) => {
                    saw_saved_status = status.message == "Intervals saved (3-8s)";
                }
                StatusEvent::Snapshot(_) => {}
            }
        }
        assert!(saw_config_changed);
        assert!(saw_saved_status);
    }

    #[tokio::test]
    async fn put_config_rejects_inverted_range() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state = app_state(temp.path());

        let err = put_config(State(state.clone()), Json(RetryConfig::new(9, 3)))
            .await
            .expect_err("inverted range");
        assert_eq!(err.0, StatusCode::UNPROCESSABLE_ENTITY);

        let Json(cfg) = get_config(State(state)).await.expect("get config");
        assert_eq!(cfg.retry, RetryConfig::default());
    }

    #[tokio::test]
    async fn stop_before_start_reports_not_running() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state = app_state(temp.path());
        let mut events = state.event_tx.subscribe();

        assert_eq!(stop(State(state.clone())).await, StatusCode::ACCEPTED);
        match events.recv().await.expect("event") {
            StatusEvent::Status(status) => assert_eq!(status.message, "Not running"),
            other => panic!("unexpected event {other:?}"),
        }

        let Json(status) = get_status(State(state)).await;
        assert_eq!(status.session.state, MachineState::Idle);
        assert_eq!(
            status.last.map(|last| last.message),
            Some("Not running".to_string())
        );
    }

    #[tokio::test]
    async fn studies_empty_before_any_logging() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state = app_state(temp.path());

        let Json(records) = list_studies(State(state)).await.expect("studies");
        assert!(records.is_empty());
    }
}
