use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, AppResult},
    models::UserWithRole,
    repository::RepositoryState,
    token::{TokenService, Tokens},
};

/// The only scheme accepted in the `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// AuthUser
///
/// The resolved identity of an authenticated request: the user record as it exists in
/// the store right now, together with its role. Produced only by [`authenticate`], and
/// consumed by the permission layer and by handlers.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    /// `None` when the user has no role; the permission layer rejects such users.
    pub role_id: Option<Uuid>,
    pub user: UserWithRole,
}

impl AuthUser {
    pub fn new(user: UserWithRole) -> Self {
        Self {
            id: user.user.id,
            role_id: user.user.role_id,
            user,
        }
    }
}

/// authenticate
///
/// Turns a raw `Authorization` header value into an [`AuthUser`].
///
/// 1. Scheme check: the header must be present and start with `Bearer `.
/// 2. Token check: signature, expiry and purpose via the session [`TokenService`].
/// 3. Store lookup: the subject must still exist and be active. A deleted or
///    deactivated user is rejected even while the token is otherwise valid.
///
/// Every failure is `AppError::Unauthenticated`. The lookup is read-only, so the gate
/// is safe to run on every request.
pub async fn authenticate(
    header_value: Option<&str>,
    sessions: &TokenService,
    repo: &RepositoryState,
) -> AppResult<AuthUser> {
    let token = header_value
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthenticated("No token provided".to_string()))?;

    let user_id = sessions.verify(token)?;

    let resolved = repo
        .get_user_with_role(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("User not found".to_string()))?;

    if !resolved.user.is_active {
        tracing::debug!(user_id = %user_id, "rejected token for deactivated account");
        return Err(AppError::Unauthenticated("Account is deactivated".to_string()));
    }

    Ok(AuthUser::new(resolved))
}

/// AuthUser Extractor Implementation
///
/// Makes `AuthUser` usable as a handler argument. If `auth_middleware` already resolved
/// the identity for this request it is reused from the request extensions; otherwise the
/// gate runs here.
///
/// Rejection: `AppError::Unauthenticated` (401).
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    Tokens: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let tokens = Tokens::from_ref(state);

        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let user = authenticate(header_value, &tokens.session, &repo).await?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// auth_middleware
///
/// Route layer for every protected router. Runs the gate once and stores the resulting
/// `AuthUser` in the request extensions, where the permission guard and the handlers
/// pick it up. A failed gate short-circuits before any handler runs.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();
    let user = AuthUser::from_request_parts(&mut parts, &state).await?;
    tracing::debug!(user_id = %user.id, "request authenticated");

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
