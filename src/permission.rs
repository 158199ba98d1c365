use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::MethodRouter,
};

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::Permission,
    repository::RepositoryState,
};

/// Module identifiers guarded by the admin routers.
pub mod modules {
    pub const DASHBOARD: &str = "dashboard";
    pub const USERS: &str = "users";
    pub const ROLES: &str = "roles";
    pub const PERMISSIONS: &str = "permissions";
}

/// Action verbs used in permission entries.
pub mod actions {
    pub const CREATE: &str = "create";
    pub const READ: &str = "read";
    pub const UPDATE: &str = "update";
    pub const DELETE: &str = "delete";

    pub const CRUD: [&str; 4] = [CREATE, READ, UPDATE, DELETE];
}

/// True when any entry grants `action` on `module`.
pub fn permits(permissions: &[Permission], module: &str, action: &str) -> bool {
    permissions.iter().any(|p| p.grants(module, action))
}

/// authorize
///
/// Decides whether `user` may perform `action` on `module`.
///
/// - no identity on the request: `Unauthorized`
/// - identity without a role: `NoRoleAssigned`
/// - otherwise the role's permission rows are read fresh from the store, so grant
///   changes apply to the very next request. No matching row: `PermissionDenied`.
pub async fn authorize(
    repo: &RepositoryState,
    user: Option<&AuthUser>,
    module: &str,
    action: &str,
) -> AppResult<()> {
    let user = user.ok_or(AppError::Unauthorized)?;
    let role_id = user.role_id.ok_or(AppError::NoRoleAssigned)?;

    let permissions = repo.permissions_for_role(role_id).await?;
    if permits(&permissions, module, action) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %user.id,
            role_id = %role_id,
            module,
            action,
            "permission denied"
        );
        Err(AppError::PermissionDenied)
    }
}

/// require
///
/// Wraps a method router so every request is checked against `(module, action)` before
/// the handler runs. The identity is read from the request extensions, so the
/// authentication layer must sit outside this one.
pub fn require(
    state: &AppState,
    module: &'static str,
    action: &'static str,
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(
        state.clone(),
        move |State(state): State<AppState>, request: Request, next: Next| async move {
            check(state, module, action, request, next).await
        },
    ))
}

async fn check(
    state: AppState,
    module: &'static str,
    action: &'static str,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(
        &state.repo,
        request.extensions().get::<AuthUser>(),
        module,
        action,
    )
    .await?;
    Ok(next.run(request).await)
}
