use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::cli::ServeArgs;
use crate::context::AppContext;
use crate::error::ApiError;
use crate::predict::{self, MetadataResponse, PredictRequest};
use crate::storage::SourceFiles;

pub const API_KEY_HEADER: &str = "x-api-key";
const DEFAULT_API_KEY: &str = "berapaya";

/// Shared by every handler. The context slot is filled exactly once when the
/// startup pipeline finishes; until then data endpoints answer 503.
#[derive(Clone)]
pub struct AppState {
    ctx: Arc<OnceLock<AppContext>>,
    api_key: Arc<str>,
}

impl AppState {
    pub fn new(api_key: &str) -> Self {
        Self {
            ctx: Arc::new(OnceLock::new()),
            api_key: Arc::from(api_key),
        }
    }

    /// Returns false if a context was already published.
    pub fn publish(&self, ctx: AppContext) -> bool {
        self.ctx.set(ctx).is_ok()
    }

    fn ready(&self) -> Result<&AppContext, ApiError> {
        self.ctx.get().ok_or(ApiError::NotReady)
    }
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let files = SourceFiles::from_args(&opts.sources);
    let params = opts.model.forest_params();
    if opts.api_key == DEFAULT_API_KEY {
        tracing::warn!("serving with the default API key; set --api-key or BERAPAYA_API_KEY");
    }

    let state = AppState::new(&opts.api_key);
    let app = router(state.clone());

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!("Listening on http://{} (loading data in background)", addr);
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let ctx = tokio::task::spawn_blocking(move || AppContext::load(&files, &params))
        .await
        .context("startup pipeline panicked")?
        .context("startup pipeline failed")?;
    let summary = ctx.summary();
    if !state.publish(ctx) {
        tracing::warn!("context already published; keeping the first one");
    }
    tracing::info!(
        "Ready: {} cost rows, {} hospitals",
        summary.cost_rows,
        summary.hospitals
    );

    server.await.context("server task panicked")??;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metadata", get(api_metadata))
        .route("/predict-nearby", post(api_predict_nearby))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .layer(cors)
        .with_state(state)
}

/// Runs before extractors, so a bad key is rejected before the body is read.
async fn require_api_key(State(st): State<AppState>, req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented != Some(&*st.api_key) {
        return ApiError::AccessDenied.into_response();
    }
    next.run(req).await
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

async fn api_metadata(State(st): State<AppState>) -> Result<Json<MetadataResponse>, ApiError> {
    let ctx = st.ready()?;
    Ok(Json(predict::metadata(ctx)))
}

async fn api_predict_nearby(
    State(st): State<AppState>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Response {
    let ctx = match st.ready() {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };
    let Json(req) = match body {
        Ok(b) => b,
        Err(rejection) => return rejection.into_response(),
    };
    match predict::predict_nearby(ctx, &req) {
        Ok(r) => Json(r).into_response(),
        Err(e) => e.into_response(),
    }
}
