use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Self-service routes for any signed-in user, whatever their role. The router above
/// wraps these in `auth_middleware`, so every handler receives a resolved `AuthUser`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PUT /profile
        .route(
            "/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        // POST /profile/change-password
        // Requires the current password; mails a confirmation on success.
        .route(
            "/profile/change-password",
            post(handlers::change_password),
        )
}
