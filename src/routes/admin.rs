use crate::{
    AppState, handlers,
    permission::{
        actions::{CREATE, DELETE, READ, UPDATE},
        modules::{ROLES, USERS},
        require,
    },
};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Admin Router Module
///
/// Role and user administration. Each method carries its own `(module, action)`
/// requirement, checked against the caller's role on every request. The router that
/// mounts this one must apply the authentication layer on top.
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // --- Roles ---
        .route(
            "/roles",
            require(state, ROLES, READ, get(handlers::list_roles))
                .merge(require(state, ROLES, CREATE, post(handlers::create_role))),
        )
        .route(
            "/roles/{id}",
            require(state, ROLES, READ, get(handlers::get_role))
                .merge(require(state, ROLES, UPDATE, put(handlers::update_role)))
                .merge(require(state, ROLES, DELETE, delete(handlers::delete_role))),
        )
        // --- Users ---
        .route(
            "/users",
            require(state, USERS, READ, get(handlers::list_users))
                .merge(require(state, USERS, CREATE, post(handlers::create_user))),
        )
        .route(
            "/users/{id}",
            require(state, USERS, READ, get(handlers::get_user))
                .merge(require(state, USERS, UPDATE, put(handlers::update_user)))
                .merge(require(state, USERS, DELETE, delete(handlers::delete_user))),
        )
}
