use crate::state::AppState;
use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{
        sse::{Event, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use signal_core::{Payload, RawSignal};
use signal_runtime::PipelineError;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[cfg(test)]
pub fn make_router(state: AppState) -> Router {
    make_router_with_cors(state, "http://localhost:5173")
        .expect("default CORS origin is a valid header value")
}

pub fn make_router_with_cors(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin.parse::<axum::http::HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Ok(Router::new()
        .route("/api/v1/meta", get(meta_handler))
        .route("/api/v1/state", get(state_handler))
        .route("/api/v1/stream", get(stream_handler))
        .route("/api/v1/broadcast", post(broadcast_handler))
        .route("/api/v1/inject", post(inject_handler))
        .route("/api/v1/start", post(start_handler))
        .route("/api/v1/stop", post(stop_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

pub async fn meta_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let pipeline = &app_state.pipeline;
    let snapshot = pipeline.snapshot().await.ok();
    Json(serde_json::json!({
        "registered": pipeline.is_registered(),
        "config": pipeline.config(),
        "pipeline": snapshot,
    }))
}

/// Latest display update, or `null` before the first one.
pub async fn state_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let latest = app_state.sink.latest();
    Json(serde_json::to_value(latest).unwrap_or(serde_json::Value::Null))
}

/// Publishes a raw payload on the pipeline's channel, as the navigation app would.
pub async fn broadcast_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<Payload>,
) -> Json<serde_json::Value> {
    let channel = &app_state.pipeline.config().channel;
    let delivered = app_state.source.publish(channel, &payload);
    Json(serde_json::json!({ "delivered": delivered }))
}

pub async fn inject_handler(
    State(app_state): State<AppState>,
    Json(raw): Json<RawSignal>,
) -> (StatusCode, Json<serde_json::Value>) {
    match app_state.pipeline.inject(raw) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "accepted": true })),
        ),
        Err(err) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": err.to_string() })),
        ),
    }
}

pub async fn start_handler(
    State(app_state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    match app_state.pipeline.start() {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "registered": true })),
        ),
        Err(err @ PipelineError::Registration { .. }) => {
            tracing::error!("pipeline registration failed: {err:#}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": err.to_string(), "registered": false })),
            )
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": err.to_string() })),
        ),
    }
}

pub async fn stop_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    app_state.pipeline.stop();
    Json(serde_json::json!({ "registered": false }))
}

pub async fn stream_handler(
    State(app_state): State<AppState>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = app_state.sink.subscribe();
    let pipeline = app_state.pipeline.clone();

    let stream = async_stream::stream! {
        let mut heartbeat = tokio::time::interval(Duration::from_secs(5));
        heartbeat.tick().await; // discard the immediate first tick
        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(update) => {
                            let data = serde_json::to_string(&update).unwrap_or_default();
                            yield Ok(Event::default().event("display").data(data));
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "sse client lagging, dropped updates");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = heartbeat.tick() => {
                    let hb = serde_json::json!({
                        "heartbeat": true,
                        "registered": pipeline.is_registered(),
                    });
                    yield Ok(Event::default().data(hb.to_string()));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}
