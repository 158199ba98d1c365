use rbac_admin::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    mailer::{LogMailer, MailerState, SmtpMailer},
    repository::{PostgresRepository, RepositoryState},
    seed,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, database and migrations, seed, mail delivery,
/// then the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise verbose for this crate, request summaries from tower_http.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rbac_admin=debug,tower_http=info".into());

    // 3. Logging format follows the environment: pretty locally, JSON in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Database Initialization (Postgres) and schema migrations.
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let postgres = PostgresRepository::new(pool);
    postgres
        .migrate()
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = Arc::new(postgres) as RepositoryState;

    // 5. Bootstrap roles and the optional first administrator.
    seed::seed(&repo, config.seed_admin.as_ref(), config.bcrypt_cost)
        .await
        .expect("FATAL: Failed to seed roles.");

    // 6. Outbound mail: SMTP when configured, otherwise log-only.
    let mailer: MailerState = match &config.smtp {
        Some(settings) => Arc::new(
            SmtpMailer::new(settings).expect("FATAL: Invalid SMTP configuration."),
        ),
        None => {
            tracing::warn!("SMTP_HOST not set; outgoing email will only be logged");
            Arc::new(LogMailer)
        }
    };

    if config.google.is_some() {
        tracing::info!("Google login enabled");
    }

    // 7. Unified State Assembly and Server Startup
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(repo, mailer, config));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "HTTP server terminated");
    }
}
