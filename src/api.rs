//! Admin endpoint: health status and analyzer triggering, behind HTTP
//! Basic auth.

use axum::extract::{Path, Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::analyzer::Analyzer;
use crate::database::DbConnection;
use crate::error::Error;
use crate::state::ProgramState;

/// The analyzer and its store, as the /run endpoint drives them. The
/// store mutex serializes triggered runs.
pub struct AnalyzerHandle {
    pub analyzer: Analyzer,
    pub db: DbConnection,
}

#[derive(Clone)]
pub struct ApiState {
    pub state: Arc<ProgramState>,
    pub username: String,
    pub password: String,
    pub analyzer: Option<Arc<AnalyzerHandle>>,
}

pub fn router(state: ApiState) -> Router {
    let authed = Router::new()
        .route("/status", get(status))
        .route("/run", get(run_all))
        .route("/run/{task}", get(run_task))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_basic_auth,
        ))
        .with_state(state);

    Router::new()
        .merge(authed)
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(port: u16, state: ApiState) -> Result<(), Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("admin endpoint listening on {addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn check_basic_auth(header: &str, username: &str, password: &str) -> bool {
    let Some(encoded) = header.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(credentials) = String::from_utf8(decoded) else {
        return false;
    };
    match credentials.split_once(':') {
        Some((user, pass)) => user == username && pass == password,
        None => false,
    }
}

async fn require_basic_auth(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|header| check_basic_auth(header, &state.username, &state.password))
        .unwrap_or(false);

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, "Basic realm=\"Login Required\"")],
            "Could not verify your access level for that URL.\n\
             You have to login with proper credentials.",
        )
            .into_response();
    }
    next.run(request).await
}

async fn status(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(json!({
        "app": state.state.command,
        "started": state.state.started_iso(),
        "healthy": state.state.healthy(),
    }))
}

async fn run_all(State(state): State<ApiState>) -> Response {
    run_inner(state, "all").await
}

async fn run_task(State(state): State<ApiState>, Path(task): Path<String>) -> Response {
    run_inner(state, &task).await
}

async fn run_inner(state: ApiState, task: &str) -> Response {
    let Some(handle) = &state.analyzer else {
        // only the analyzer process can trigger runs
        return not_found(&format!("run/{task}"));
    };
    let mut conn = handle.db.lock().await;
    match handle.analyzer.run(&mut conn, task) {
        Ok(()) => Json(json!({
            "command": format!("Analyzer run {task}"),
            "success": true,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("triggered analyzer run {task} failed: {e}");
            not_found(&format!("run/{task}"))
        }
    }
}

fn not_found(path: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": 404,
            "message": format!(
                "The route /{path} you provided is not valid. Try one of these: /status"
            ),
        })),
    )
        .into_response()
}

async fn fallback(uri: Uri) -> Response {
    not_found(uri.path().trim_start_matches('/'))
}
