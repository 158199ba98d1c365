use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult, ErrorBody},
    extract::{ApiJson, ApiPath, ApiQuery},
    models::{
        AuthResponse, ChangePasswordRequest, CreateRoleRequest, CreateUserRequest,
        ForgotPasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
        ResetPasswordRequest, RoleWithPermissions, UpdateProfileRequest, UpdateRoleRequest,
        UpdateUserRequest, UserProfile, UserResponse,
    },
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::Redirect,
};
use serde::Deserialize;
use uuid::Uuid;

/// GoogleCallbackQuery
///
/// Query string Google appends when redirecting back after consent.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct GoogleCallbackQuery {
    /// One-time authorization code to exchange for the user's profile.
    pub code: String,
}

// --- Auth (public) ---

/// register
///
/// [Public Route] Self-registration. The new account gets the default role and a
/// session token straight away.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = AuthResponse),
        (status = 400, description = "Validation failed or email taken", body = ErrorBody),
        (status = 500, description = "No default role configured", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let session = state.accounts.register(&payload).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// login
///
/// [Public Route] Email and password login. Every failure returns the same 401 body.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    Ok(Json(state.accounts.login(&payload).await?))
}

/// logout
///
/// [Public Route] Tokens are stateless, so there is nothing to revoke; the client
/// discards its token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses((status = 200, description = "Logged out", body = MessageResponse)),
    tag = "auth"
)]
pub async fn logout() -> Json<MessageResponse> {
    Json(MessageResponse::new("Logged out successfully"))
}

/// forgot_password
///
/// [Public Route] Starts the reset flow. The answer never reveals whether the email is
/// registered.
#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses((status = 200, description = "Reset requested", body = MessageResponse)),
    tag = "auth"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(state.accounts.request_password_reset(&payload).await?))
}

/// reset_password
///
/// [Public Route] Completes the reset flow with the emailed token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired reset token", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(state.accounts.reset_password(&payload).await?))
}

/// google_login
///
/// [Public Route] Redirects to Google's consent screen. 404 when Google login is off.
#[utoipa::path(
    get,
    path = "/api/v1/auth/google",
    responses(
        (status = 303, description = "Redirect to Google"),
        (status = 404, description = "Google login disabled", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn google_login(State(state): State<AppState>) -> AppResult<Redirect> {
    let google = state.google.as_ref().ok_or(AppError::NotFound("Google login"))?;
    Ok(Redirect::to(&google.authorize_url()?))
}

/// google_callback
///
/// [Public Route] Exchanges the authorization code and signs the Google account in,
/// creating it on first login.
#[utoipa::path(
    get,
    path = "/api/v1/auth/google/callback",
    params(GoogleCallbackQuery),
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Google rejected the code", body = ErrorBody),
        (status = 404, description = "Google login disabled", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn google_callback(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<GoogleCallbackQuery>,
) -> AppResult<Json<AuthResponse>> {
    let google = state.google.as_ref().ok_or(AppError::NotFound("Google login"))?;
    let profile = google.fetch_profile(&query.code).await?;
    Ok(Json(state.accounts.oauth_login(profile).await?))
}

// --- Profile (authenticated) ---

/// get_profile
///
/// [Authenticated Route] The caller's own account with its role.
#[utoipa::path(
    get,
    path = "/api/v1/profile",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Unauthenticated", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "profile"
)]
pub async fn get_profile(AuthUser { user, .. }: AuthUser) -> Json<UserProfile> {
    Json(UserProfile::from(&user))
}

/// update_profile
///
/// [Authenticated Route] Edits the caller's names and email.
#[utoipa::path(
    put,
    path = "/api/v1/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Validation failed or email taken", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "profile"
)]
pub async fn update_profile(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> AppResult<Json<UserResponse>> {
    Ok(Json(state.accounts.update_profile(id, &payload).await?))
}

/// change_password
///
/// [Authenticated Route] Replaces the caller's password after checking the current one.
#[utoipa::path(
    post,
    path = "/api/v1/profile/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Current password is incorrect", body = ErrorBody),
        (status = 404, description = "User no longer exists", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "profile"
)]
pub async fn change_password(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(state.accounts.change_password(id, &payload).await?))
}

// --- Roles (permission module "roles") ---

/// list_roles
///
/// [Guarded: roles/read] All roles with their permission sets.
#[utoipa::path(
    get,
    path = "/api/v1/roles",
    responses(
        (status = 200, description = "Roles", body = [RoleWithPermissions]),
        (status = 403, description = "Permission denied", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn list_roles(State(state): State<AppState>) -> AppResult<Json<Vec<RoleWithPermissions>>> {
    Ok(Json(state.roles.list().await?))
}

/// get_role
///
/// [Guarded: roles/read]
#[utoipa::path(
    get,
    path = "/api/v1/roles/{id}",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role", body = RoleWithPermissions),
        (status = 404, description = "Role not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn get_role(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<RoleWithPermissions>> {
    Ok(Json(state.roles.get(id).await?))
}

/// create_role
///
/// [Guarded: roles/create] Creates a role and its permission set in one unit.
#[utoipa::path(
    post,
    path = "/api/v1/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = RoleWithPermissions),
        (status = 400, description = "Validation failed or name taken", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn create_role(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateRoleRequest>,
) -> AppResult<(StatusCode, Json<RoleWithPermissions>)> {
    let role = state.roles.create(&payload).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// update_role
///
/// [Guarded: roles/update] The submitted permission list replaces the stored one.
#[utoipa::path(
    put,
    path = "/api/v1/roles/{id}",
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleWithPermissions),
        (status = 400, description = "Validation failed or name taken", body = ErrorBody),
        (status = 404, description = "Role not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn update_role(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateRoleRequest>,
) -> AppResult<Json<RoleWithPermissions>> {
    Ok(Json(state.roles.update(id, &payload).await?))
}

/// delete_role
///
/// [Guarded: roles/delete] Refused while any user is assigned the role.
#[utoipa::path(
    delete,
    path = "/api/v1/roles/{id}",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Role is assigned to users", body = ErrorBody),
        (status = 404, description = "Role not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn delete_role(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    state.roles.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Users (permission module "users") ---

/// list_users
///
/// [Guarded: users/read]
#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses((status = 200, description = "Users", body = [UserProfile])),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserProfile>>> {
    Ok(Json(state.users.list().await?))
}

/// get_user
///
/// [Guarded: users/read]
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserProfile),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(state.users.get(id).await?))
}

/// create_user
///
/// [Guarded: users/create] Creates an account on an explicit role.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Validation failed or email taken", body = ErrorBody),
        (status = 404, description = "Role not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = state.users.create(&payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User created successfully".to_string(),
            user,
        }),
    ))
}

/// update_user
///
/// [Guarded: users/update] Names, email, active flag and role reassignment.
#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 404, description = "User or role not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = state.users.update(id, &payload).await?;
    Ok(Json(UserResponse {
        message: "User updated successfully".to_string(),
        user,
    }))
}

/// delete_user
///
/// [Guarded: users/delete]
#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    state.users.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
