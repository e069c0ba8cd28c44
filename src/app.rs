use crate::models::{ContentKind, FilterSet};
use crate::pool::Suggester;
use crate::random::ThreadRandom;
use crate::tmdb::{TmdbApi, TmdbClient};
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashSet, net::SocketAddr, sync::Arc};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const MAX_BODY_BYTES: usize = 64 * 1024;
const PORT: u16 = 3151;

#[derive(Clone)]
pub struct AppState {
    pub tmdb: Arc<dyn TmdbApi>,
    pub suggester: Arc<Suggester>,
}

pub async fn run_server() -> Result<()> {
    let random = Arc::new(ThreadRandom);
    let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::from_env(random.clone())?);
    let suggester = Arc::new(Suggester::new(tmdb.clone(), random));
    let state = AppState { tmdb, suggester };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], PORT));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/suggestion", post(next_suggestion))
        .route("/pool/build", post(build_pool))
        .route("/pool/invalidate", post(invalidate_pool))
        .route("/genres/:kind", get(list_genres))
        .route("/details/:kind/:id", get(content_details))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestionRequest {
    filters: FilterSet,
    #[serde(default)]
    exclude_ids: Vec<i32>,
}

/// One pick from the pool. `"suggestion": null` means nothing matches the
/// filters, which is distinct from an upstream failure (502).
async fn next_suggestion(
    State(state): State<AppState>,
    Json(req): Json<SuggestionRequest>,
) -> Response {
    let exclude: HashSet<i32> = req.exclude_ids.iter().copied().collect();
    match state.suggester.next(&req.filters, &exclude).await {
        Ok(item) => Json(json!({ "suggestion": item })).into_response(),
        Err(err) => upstream_error("suggestion", err),
    }
}

/// Pre-warm the pool for a filter set; a no-op when it is already cached.
async fn build_pool(State(state): State<AppState>, Json(filters): Json<FilterSet>) -> Response {
    match state.suggester.build(&filters).await {
        Ok(pool) => Json(json!({ "size": pool.items.len() })).into_response(),
        Err(err) => upstream_error("pool build", err),
    }
}

/// Called by the display layer whenever the active filter set changes.
async fn invalidate_pool(State(state): State<AppState>) -> Response {
    state.suggester.invalidate().await;
    Json(json!({ "status": "cleared" })).into_response()
}

async fn list_genres(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    let kind = match kind.parse::<ContentKind>() {
        Ok(kind) => kind,
        Err(_) => return bad_kind(&kind),
    };
    match state.tmdb.genres(kind).await {
        Ok(genres) => Json(json!({ "genres": genres })).into_response(),
        Err(err) => upstream_error("genre list", err),
    }
}

async fn content_details(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i32)>,
) -> Response {
    let kind = match kind.parse::<ContentKind>() {
        Ok(kind) => kind,
        Err(_) => return bad_kind(&kind),
    };
    match state.tmdb.details(kind, id).await {
        Ok(details) => Json(details).into_response(),
        Err(err) => upstream_error("detail fetch", err),
    }
}

fn bad_kind(kind: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": format!("Unknown content kind '{kind}'") })),
    )
        .into_response()
}

fn upstream_error(operation: &str, err: anyhow::Error) -> Response {
    error!("Upstream failure during {}: {:?}", operation, err);
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": err.to_string() })),
    )
        .into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
