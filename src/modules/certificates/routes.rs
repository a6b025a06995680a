use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    get_certificate, list_user_certificates, organization_compliance, revoke_certificate,
    verify_certificate,
};
use crate::app_state::AppState;

pub fn certificate_routes() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_certificate))
        .route("/code/{code}", get(verify_certificate))
        .route("/{id}/revoke", post(revoke_certificate))
}

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/{id}/certificates", get(list_user_certificates))
}

pub fn organization_routes() -> Router<AppState> {
    Router::new().route("/{id}/compliance", get(organization_compliance))
}
