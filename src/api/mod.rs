/// API routes and handlers
pub mod files;
pub mod health;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(files::routes())
        .merge(health::routes())
}
