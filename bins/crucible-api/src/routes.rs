use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/codeexecution/execute", post(handlers::execute_code))
        .route("/api/codeexecution/languages", get(handlers::list_languages))
        .route("/status", get(handlers::health_check))
}
