//! The patient's chat thread ("bubble"): lazy creation, append-only
//! messages, severity self-report, summary and keywords.

mod dto;
pub mod handlers;
pub mod replies;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::bubble_routes()
}
