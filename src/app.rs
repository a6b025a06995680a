use axum::{extract::State, middleware, routing::get, Json, Router};
use serde_json::json;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    app_state::AppState,
    middleware::tracing::observability_middleware,
    modules::{
        certificates::routes::{certificate_routes, organization_routes, user_routes},
        sessions::routes::session_routes,
        standards::routes::standard_routes,
    },
    telemetry::TelemetryConfig,
};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/health", get(health_check))
        .nest("/standards", standard_routes())
        .nest("/sessions", session_routes())
        .nest("/certificates", certificate_routes())
        .nest("/users", user_routes())
        .nest("/organizations", organization_routes())
        .layer(middleware::from_fn(observability_middleware))
        .with_state(state)
}

async fn hello() -> &'static str {
    "Aviation training backend says hello!\n"
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_result = sqlx::query("SELECT 1").execute(&state.db).await;

    let db_status = match db_result {
        Ok(_) => "healthy",
        Err(e) => {
            tracing::info!("Database health check failed: {}", e);
            "unhealthy"
        }
    };

    let telemetry_status = if TelemetryConfig::from_config(state.env).exporter_configured() {
        "exporting"
    } else {
        "console"
    };

    Json(json!({
        "status": "ok",
        "timestamp": OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.env.app.environment.as_str(),
        "services": {
            "database": db_status,
            "telemetry": telemetry_status
        }
    }))
}
