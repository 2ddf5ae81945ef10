// Export route modules
pub mod reply;
pub mod ui;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(reply::routes(state))
        .merge(ui::routes())
}
