use std::time::Instant;

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Env;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Local runs get the pretty formatter; production emits JSON
/// for log aggregation.
pub fn init_tracing(env: Env) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "person_api=debug,tower_http=info".into());

    match env {
        Env::Local => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
        Env::Production => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Severity glyph shown next to the status code in request log lines.
pub fn status_indicator(status: StatusCode) -> &'static str {
    match status.as_u16() {
        200..=299 => "✅",
        400..=499 => "⚠️",
        500.. => "❌",
        _ => "❓",
    }
}

/// log_request
///
/// Emits one line per completed request. If the client goes away first, this future
/// is dropped and nothing is logged.
pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        %method,
        %path,
        status = status.as_u16(),
        elapsed_ms,
        "{} {} {} {} - {}ms",
        method,
        path,
        status_indicator(status),
        status.as_u16(),
        elapsed_ms
    );

    response
}
