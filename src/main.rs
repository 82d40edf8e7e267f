use axum::{Router, routing::get};
use sea_orm::{ConnectOptions, Database};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use onboarding_api::{
    config::AppConfig,
    infrastructure::{
        argon2_password_hasher::Argon2PasswordHasher,
        in_memory_otp_gate::{InMemoryOtpGate, LogOtpSender},
        jwt_token_generator::JwtTokenGenerator,
        schema::create_schema,
    },
    presentation::handlers::{
        health_handler::create_health_router, registration_handler::create_registration_router,
    },
    usecase::{
        registration_finalizer::RegistrationFinalizer,
        registration_state_machine::RegistrationStateMachine,
    },
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onboarding_api=debug,sea_orm=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let mut opt = ConnectOptions::new(config.database_url.clone());
    opt.max_connections(config.db_max_connections)
        .min_connections(1)
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;
    tracing::info!("database connection established");
    create_schema(&db).await?;

    let otp_gate = InMemoryOtpGate::with_policy(
        LogOtpSender,
        chrono::Duration::seconds(config.otp_ttl_secs),
        config.otp_max_attempts,
    );
    let password_hasher = Argon2PasswordHasher::new();
    let token_generator =
        JwtTokenGenerator::with_expiration(config.jwt_secret.clone(), config.jwt_expiration_hours);

    let state_machine = RegistrationStateMachine::new(db.clone(), otp_gate, password_hasher);
    let finalizer = RegistrationFinalizer::new(db.clone(), token_generator);

    let app = Router::new()
        .route("/", get(|| async { "onboarding-api" }))
        .nest(
            "/api",
            create_registration_router(state_machine, finalizer)
                .merge(create_health_router(db.clone())),
        );

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
