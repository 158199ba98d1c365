use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
    routing::get,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain core: tokens, the authentication gate and the permission engine.
pub mod auth;
pub mod permission;
pub mod token;

// Services over the credential store.
pub mod accounts;
pub mod roles;
pub mod users;

// Collaborators and supporting pieces.
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod oauth;
pub mod password;
pub mod repository;
pub mod seed;
pub mod validation;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use accounts::Accounts;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use mailer::{LogMailer, MailerState, MockMailer, Notifier, SmtpMailer};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use roles::RoleAdmin;
pub use token::{TokenService, Tokens};
pub use users::UserAdmin;

/// Base path every API route is mounted under.
pub const API_PREFIX: &str = "/api/v1";

/// ApiDoc
///
/// Auto-generated OpenAPI document for every `#[utoipa::path]` handler, served at
/// `/api-docs/openapi.json` and browsable through Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register, handlers::login, handlers::logout, handlers::forgot_password,
        handlers::reset_password, handlers::google_login, handlers::google_callback,
        handlers::get_profile, handlers::update_profile, handlers::change_password,
        handlers::list_roles, handlers::get_role, handlers::create_role,
        handlers::update_role, handlers::delete_role,
        handlers::list_users, handlers::get_user, handlers::create_user,
        handlers::update_user, handlers::delete_user
    ),
    components(
        schemas(
            models::Role, models::Permission, models::RoleWithPermissions,
            models::PermissionInput, models::RegisterRequest, models::LoginRequest,
            models::ForgotPasswordRequest, models::ResetPasswordRequest,
            models::UpdateProfileRequest, models::ChangePasswordRequest,
            models::CreateRoleRequest, models::UpdateRoleRequest,
            models::CreateUserRequest, models::UpdateUserRequest,
            models::UserProfile, models::AuthResponse, models::UserResponse,
            models::MessageResponse, error::ErrorBody,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration, login and password reset"),
        (name = "profile", description = "The caller's own account"),
        (name = "roles", description = "Role and permission administration"),
        (name = "users", description = "User administration")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme referenced by the protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// AppState
///
/// The single, cloneable container shared by every request: the credential store, the
/// token services, the configuration, and the services built on top of them.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub tokens: Tokens,
    pub config: AppConfig,
    pub accounts: Accounts,
    pub roles: RoleAdmin,
    pub users: UserAdmin,
    /// `None` when Google login is disabled.
    pub google: Option<oauth::GoogleOAuthClient>,
}

impl AppState {
    /// Wires every service from the store, the mailer and the configuration.
    pub fn new(repo: RepositoryState, mailer: MailerState, config: AppConfig) -> Self {
        let tokens = Tokens::from_config(&config);
        let notifier = Notifier::new(mailer, &config);

        Self {
            accounts: Accounts::new(repo.clone(), tokens.clone(), notifier.clone(), &config),
            roles: RoleAdmin::new(repo.clone()),
            users: UserAdmin::new(
                repo.clone(),
                notifier,
                config.bcrypt_cost,
                config.admin_notify_email.clone(),
            ),
            google: config.google.clone().map(oauth::GoogleOAuthClient::new),
            repo,
            tokens,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for Tokens {
    fn from_ref(app_state: &AppState) -> Tokens {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routing tree, applies the scoped access layers and the global
/// observability stack, and binds the state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. API Router Assembly
    // Protected routes share one authentication layer. It is applied after the admin
    // routes are merged, so it wraps their permission guards and always runs first.
    let protected = authenticated::authenticated_routes()
        .merge(admin::admin_routes(&state))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let api = Router::new()
        .merge(public::public_routes())
        .merge(protected);

    let base_router = Router::new()
        // GET /health
        // Liveness probe for load balancers; no dependencies touched.
        .route("/health", get(|| async { "ok" }))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest(API_PREFIX, api)
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span so every log line of a request carries its
/// `x-request-id` next to the method and URI.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
