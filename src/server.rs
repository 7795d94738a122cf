//! HTTP front-end.
//!
//! `GET /synthesize/{text}` normalizes the text, runs it through the bridge
//! on tokio's blocking pool, and returns the encoded payload as plain text.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use log::{error, info, warn};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::bridge::Bridge;
use crate::error::{BridgeError, SubmitError};
use crate::normalize::Normalizer;

#[derive(Clone)]
struct AppState {
    bridge: Bridge,
    normalizer: Arc<dyn Normalizer>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    kind: &'a str,
    message: String,
}

fn error_response(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        status: "error",
        kind,
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

/// Build the front-end's router.
pub fn router(bridge: Bridge, normalizer: Arc<dyn Normalizer>) -> Router {
    let state = AppState { bridge, normalizer };
    Router::new()
        .route("/synthesize/{*text}", get(synthesize_path))
        .route("/synthesize/", get(synthesize_query))
        .route("/synthesize", get(synthesize_query))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve `router` on `listener` until `cancel_token` is cancelled.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    cancel_token: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(address) = listener.local_addr() {
        info!(target: "koebashi::server", "Listening on http://{}", address);
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(cancel_token.cancelled_owned())
        .await
}

async fn synthesize_path(State(state): State<AppState>, Path(text): Path<String>) -> Response {
    synthesize(state, text).await
}

async fn synthesize_query(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    synthesize(state, text_from_query(query.as_deref())).await
}

/// Text carried by a query string: the `text` parameter if present,
/// otherwise the whole query percent-decoded.
fn text_from_query(query: Option<&str>) -> String {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return String::new();
    };
    let param = url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, value)| name == "text" && !value.is_empty())
        .map(|(_, value)| value.into_owned());
    param.unwrap_or_else(|| percent_decode_str(query).decode_utf8_lossy().into_owned())
}

async fn synthesize(state: AppState, raw: String) -> Response {
    let raw = raw.trim();
    if raw.is_empty() {
        warn!(target: "koebashi::server", "Rejecting request without text");
        return error_response(StatusCode::BAD_REQUEST, "missing_text", "no text provided");
    }

    let key = state.normalizer.normalize(raw);
    if key.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "missing_text", "text is empty after normalization");
    }
    if !state.bridge.is_connected() {
        error!(target: "koebashi::server", "Bridge is not connected");
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "dispatch_failed",
            "backend is not connected",
        );
    }
    info!(target: "koebashi::server", "Synthesizing '{}'", key);

    let bridge = state.bridge.clone();
    let outcome = tokio::task::spawn_blocking(move || bridge.request(&key)).await;

    match outcome {
        Ok(Ok(payload)) => ([(CONTENT_TYPE, "text/plain; charset=utf-8")], payload).into_response(),
        Ok(Err(e)) => bridge_error_response(&e),
        Err(e) => {
            error!(target: "koebashi::server", "Bridge call failed to complete: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", "request worker failed")
        }
    }
}

fn status_for(e: &BridgeError) -> StatusCode {
    match e {
        BridgeError::DuplicateInFlight { .. } => StatusCode::TOO_MANY_REQUESTS,
        BridgeError::DispatchFailed {
            reason: SubmitError::EventLoopClosed,
            ..
        } => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::DispatchFailed { .. } => StatusCode::BAD_GATEWAY,
        BridgeError::ResponseTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        BridgeError::Disconnected { .. } => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::ProcessingFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn bridge_error_response(e: &BridgeError) -> Response {
    error_response(status_for(e), e.kind(), e.to_string())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (status, label) = if state.bridge.is_connected() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "DISCONNECTED")
    };
    let body = format!("{}\nPending: {}", label, state.bridge.pending_count());
    (status, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case(None, "")]
    #[case(Some(""), "")]
    #[case(Some("text=five%20books"), "five books")]
    #[case(Some("text=five+books&lang=en"), "five books")]
    #[case(Some("hello%20world"), "hello world")]
    #[case(Some("text="), "text=")]
    fn text_from_query_cases(#[case] query: Option<&str>, #[case] expected: &str) {
        assert_eq!(text_from_query(query), expected);
    }

    #[rstest]
    #[case(BridgeError::DuplicateInFlight { key: "k".into() }, StatusCode::TOO_MANY_REQUESTS)]
    #[case(
        BridgeError::DispatchFailed { key: "k".into(), reason: SubmitError::Rejected("no".into()) },
        StatusCode::BAD_GATEWAY
    )]
    #[case(
        BridgeError::DispatchFailed { key: "k".into(), reason: SubmitError::EventLoopClosed },
        StatusCode::SERVICE_UNAVAILABLE
    )]
    #[case(
        BridgeError::ResponseTimeout { key: "k".into(), waited: Duration::from_secs(1) },
        StatusCode::GATEWAY_TIMEOUT
    )]
    #[case(BridgeError::Disconnected { key: "k".into() }, StatusCode::SERVICE_UNAVAILABLE)]
    #[case(
        BridgeError::ProcessingFailure {
            key: "k".into(),
            source: crate::error::ProcessingError::MissingPayload,
        },
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    fn bridge_errors_map_to_status(#[case] error: BridgeError, #[case] expected: StatusCode) {
        assert_eq!(status_for(&error), expected);
    }
}
