use axum::{
    routing::{get, post, put},
    Router,
};

use super::handlers::{create_standard, get_standard, set_standard_active, update_standard};
use crate::app_state::AppState;

pub fn standard_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_standard))
        .route("/{id}", get(get_standard).patch(update_standard))
        .route("/{id}/active", put(set_standard_active))
}
