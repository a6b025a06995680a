use axum::{
    extract::{MatchedPath, Request},
    http::{HeaderMap, Method, Uri},
    middleware::Next,
    response::Response,
};
use opentelemetry::{
    global,
    trace::{Span, SpanKind, Status, Tracer},
    KeyValue,
};
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::actor::{ACTING_ROLE_HEADER, ACTING_USER_HEADER};

/// Request span, OpenTelemetry server span and request metrics in one layer.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start_time = Instant::now();

    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let tracer = global::tracer("http-server");
    let mut span = tracer
        .span_builder(format!("{} {}", method, route))
        .with_kind(SpanKind::Server)
        .start(&tracer);
    set_span_attributes(&mut span, &method, &uri, &route, request.headers());

    let meter = crate::telemetry::get_meter("http-server");
    let request_counter = meter.u64_counter("http_requests_total");
    let request_duration = meter.f64_histogram("http_request_duration_seconds");

    let tracing_span = info_span!(
        "http_request",
        method = %method,
        uri = %uri,
        route = %route,
        request_id = %uuid::Uuid::now_v7(),
    );

    let response = next.run(request).instrument(tracing_span).await;

    let duration = start_time.elapsed();
    let status_code = response.status().as_u16();

    span.set_attribute(KeyValue::new("http.status_code", status_code as i64));
    span.set_attribute(KeyValue::new("http.response_time_ms", duration.as_millis() as i64));

    if status_code >= 500 {
        span.set_status(Status::Error {
            description: format!("HTTP {}", status_code).into(),
        });
    } else {
        span.set_status(Status::Ok);
    }

    let labels = [
        KeyValue::new("method", method.to_string()),
        KeyValue::new("route", route),
        KeyValue::new("status_code", status_code.to_string()),
    ];
    request_counter.add(1, &labels);
    request_duration.record(duration.as_secs_f64(), &labels);

    span.end();
    response
}

fn set_span_attributes(
    span: &mut impl Span,
    method: &Method,
    uri: &Uri,
    route: &str,
    headers: &HeaderMap,
) {
    span.set_attribute(KeyValue::new("http.method", method.to_string()));
    span.set_attribute(KeyValue::new("http.url", uri.to_string()));
    span.set_attribute(KeyValue::new("http.route", route.to_string()));

    if let Some(user_agent) = headers.get("user-agent").and_then(|v| v.to_str().ok()) {
        span.set_attribute(KeyValue::new("http.user_agent", user_agent.to_string()));
    }

    if let Some(actor) = headers.get(ACTING_USER_HEADER).and_then(|v| v.to_str().ok()) {
        span.set_attribute(KeyValue::new("enduser.id", actor.to_string()));
    }
    if let Some(role) = headers.get(ACTING_ROLE_HEADER).and_then(|v| v.to_str().ok()) {
        span.set_attribute(KeyValue::new("enduser.role", role.to_string()));
    }
    if let Some(session_id) = session_id_from_path(uri.path()) {
        span.set_attribute(KeyValue::new("training.session_id", session_id.to_string()));
    }
}

/// Pulls the session id out of `/sessions/{id}/...` so spans can be grouped
/// per training session.
fn session_id_from_path(path: &str) -> Option<uuid::Uuid> {
    let mut segments = path.trim_start_matches('/').split('/');
    match (segments.next(), segments.next()) {
        (Some("sessions"), Some(id)) => id.parse().ok(),
        _ => None,
    }
}
