use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// The credential entry points. Nothing here requires a token; every handler answers
/// failures without revealing whether an email is registered.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // POST /auth/register
        // Self-registration onto the default role. Responds 201 with a session token.
        .route("/auth/register", post(handlers::register))
        // POST /auth/login
        .route("/auth/login", post(handlers::login))
        // POST /auth/logout
        // Stateless: the client drops its token.
        .route("/auth/logout", post(handlers::logout))
        // POST /auth/forgot-password
        // Emails a one-hour reset link if the account exists. Same answer either way.
        .route("/auth/forgot-password", post(handlers::forgot_password))
        // POST /auth/reset-password
        .route("/auth/reset-password", post(handlers::reset_password))
        // GET /auth/google, GET /auth/google/callback
        // 404 unless ENABLE_GOOGLE_LOGIN=true.
        .route("/auth/google", get(handlers::google_login))
        .route("/auth/google/callback", get(handlers::google_callback))
}
