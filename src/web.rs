use crate::{
    corpus::Source,
    errors::AppError,
    images::ImageIngestor,
    retrieval::{Answer, RetrievalService, SourceFilter},
};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{fmt::Debug, sync::Arc};
use tokio::signal;

/// Base64 images make for large bodies
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

pub struct SharedState {
    pub retrieval: Arc<RetrievalService>,
    pub images: Arc<ImageIngestor>,
    pub default_top_k: usize,
}

pub fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/", post(answer))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::warn!("shutting down");
}

async fn start_app(state: Arc<SharedState>, addr: String) -> anyhow::Result<()> {
    let retrieval = state.retrieval.clone();
    // load eagerly; a failure here is retried by the first request
    tokio::task::spawn_blocking(move || {
        if let Err(err) = retrieval.initialize() {
            log::error!("retrieval initialization failed: {err}");
        }
    })
    .await?;

    if state.retrieval.is_initialized() {
        log::info!(
            "serving {} note and {} discourse documents",
            state.retrieval.indexed_count(Source::Note),
            state.retrieval.indexed_count(Source::Discourse)
        );
    }

    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("degraded events: {:?}", state.retrieval.counters());
    Ok(())
}

pub fn start_daemon(state: Arc<SharedState>, addr: String) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(state, addr).await })
}

#[derive(Debug)]
struct HttpError(AppError);

// Every failure is the server's: one 500 shape carrying the message.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        log::error!("{:?}", self.0);
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": self.0.to_string()})),
        )
            .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({"message": "Welcome to the TDS Virtual TA!"}))
}

#[derive(Deserialize, Serialize)]
pub struct QuestionRequest {
    pub question: String,

    #[serde(default)]
    pub source: SourceFilter,

    /// base64 encoded image
    pub image: Option<String>,

    /// Result budget; the configured default when absent
    pub top_k: Option<usize>,
}

impl Debug for QuestionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "QuestionRequest {{ question: {:?}, source: {:?}, image: {}, top_k: {:?} }}",
            self.question,
            self.source,
            if self.image.is_some() { "[REDUCTED]" } else { "None" },
            self.top_k
        )
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AnswerResponse {
    pub answers: Vec<Answer>,
    pub original_question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

async fn answer(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<QuestionRequest>,
) -> Result<Json<AnswerResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let top_k = payload.top_k.unwrap_or(state.default_top_k);

    tokio::task::block_in_place(move || {
        let image = payload
            .image
            .as_deref()
            .map(|image| state.images.ingest(image))
            .unwrap_or_default();

        let answers = state
            .retrieval
            .search(&payload.question, top_k, payload.source)?;

        Ok(Json(AnswerResponse {
            answers,
            original_question: payload.question,
            image_text: image.text,
            image_path: image.saved,
        }))
    })
}
