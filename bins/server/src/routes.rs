//! HTTP routes over the metrics service.

use crate::error::{ApiError, Surface};
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use flate2::read::GzDecoder;
use metricity_app::MetricsService;
use metricity_domain::{Metric, decode_batch, decode_metric, encode_batch, encode_metric};
use metricity_shared::{ErrorCode, ErrorEnvelope, RequestContext};
use std::io::Read;
use tower_http::trace::TraceLayer;

/// Largest batch body accepted after gzip inflation.
const MAX_INFLATED_BODY: u64 = 8 * 1024 * 1024;

/// Build the router with request tracing.
pub fn router(service: MetricsService) -> Router {
    Router::new()
        .route("/update/", post(update_json))
        .route("/update/:kind/:name/:value", post(update_path))
        .route("/updates/", post(update_batch))
        .route("/value/", post(value_json))
        .route("/value/:kind/:name", get(value_path))
        .route("/ping", get(ping))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn update_json(State(service): State<MetricsService>, body: Bytes) -> Response {
    let ctx = RequestContext::new_request();
    let result = async {
        let metric = decode_metric(&body)?;
        let stored = service.update_metric(&ctx, metric).await?;
        Ok::<_, ErrorEnvelope>(json_response(encode_metric(&stored)?))
    }
    .await;
    respond(Surface::Json, result)
}

async fn update_path(
    State(service): State<MetricsService>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Response {
    let ctx = RequestContext::new_request();
    let result = service
        .update_path(&ctx, &kind, &name, &value)
        .await
        .map(|()| text_response(String::new()));
    respond(Surface::PathUpdate, result)
}

async fn update_batch(
    State(service): State<MetricsService>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = RequestContext::new_request();
    let result = async {
        let plain = decode_body(&headers, body)?;
        let metrics = decode_batch(&plain)?;
        let applied = service.update_batch(&ctx, metrics).await?;
        Ok::<_, ErrorEnvelope>(json_response(encode_batch(&applied)?))
    }
    .await;
    respond(Surface::Json, result)
}

async fn value_json(State(service): State<MetricsService>, body: Bytes) -> Response {
    let ctx = RequestContext::new_request();
    let result = async {
        let query = decode_metric(&body)?;
        let metric = service
            .get_metric(&ctx, Metric::query(query.id, query.kind))
            .await?;
        Ok::<_, ErrorEnvelope>(json_response(encode_metric(&metric)?))
    }
    .await;
    respond(Surface::Json, result)
}

async fn value_path(
    State(service): State<MetricsService>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    let ctx = RequestContext::new_request();
    let result = service.get_raw(&ctx, &kind, &name).await.map(text_response);
    respond(Surface::Json, result)
}

async fn ping(State(service): State<MetricsService>) -> Response {
    let ctx = RequestContext::new_request();
    match service.ping(&ctx).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(error) => {
            tracing::error!(code = %error.code, message = %error.message, "store ping failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}

fn respond(surface: Surface, result: Result<Response, ErrorEnvelope>) -> Response {
    result.unwrap_or_else(|error| ApiError::new(surface, error).into_response())
}

fn json_response(body: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn text_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

/// Inflate a gzip body when `Content-Encoding: gzip` is set.
fn decode_body(headers: &HeaderMap, body: Bytes) -> Result<Vec<u8>, ErrorEnvelope> {
    let gzipped = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("gzip"));
    if !gzipped {
        return Ok(body.to_vec());
    }

    let mut plain = Vec::new();
    GzDecoder::new(body.as_ref())
        .take(MAX_INFLATED_BODY + 1)
        .read_to_end(&mut plain)
        .map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("http", "bad_encoding"),
                format!("cannot inflate gzip body: {error}"),
            )
        })?;
    if plain.len() as u64 > MAX_INFLATED_BODY {
        return Err(ErrorEnvelope::expected(
            ErrorCode::new("http", "body_too_large"),
            format!("inflated body exceeds {MAX_INFLATED_BODY} bytes"),
        ));
    }
    Ok(plain)
}
