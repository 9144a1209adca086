pub mod accounts;
pub mod appointments;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod response;
pub mod security;
pub mod validation;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use accounts::{
    account_routes, AccountDirectory, AccountRepository, AccountService, DoctorProfile,
    MemoryAccountRepository, PatientProfile, PgAccountRepository, UserProfile,
};
use appointments::{
    appointment_routes, AppointmentRepository, AppointmentService, MemoryAppointmentRepository,
    PgAppointmentRepository,
};
use auth::token::TokenService;
use config::AppConfig;
use response::ApiResponse;
use security::{
    log_request, rate_limit, sanitize_body, MemoryRateLimitStore, RateLimitStore, RateLimiter,
    RedisRateLimitStore,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        appointments::handlers::create_appointment,
        appointments::handlers::get_appointments,
        appointments::handlers::update_appointment,
        appointments::handlers::cancel_appointment,
        appointments::handlers::reschedule_appointment,
        appointments::handlers::add_follow_up,
    ),
    components(
        schemas(
            appointments::models::Appointment,
            appointments::models::AppointmentStatus,
            appointments::models::Location,
            appointments::models::CreateAppointmentRequest,
            appointments::models::UpdateAppointmentRequest,
            appointments::models::RescheduleRequest,
            appointments::models::FollowUpRequest,
            appointments::models::FollowUpResponse,
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "appointments", description = "Appointment booking and lifecycle endpoints")
    ),
    info(
        title = "Hospital Management API",
        version = "1.0.0",
        description = "RESTful API for hospital accounts and appointments"
    )
)]
struct ApiDoc;

/// Storage backends behind the services
pub struct Repositories {
    pub users: Arc<dyn AccountRepository<UserProfile>>,
    pub doctors: Arc<dyn AccountRepository<DoctorProfile>>,
    pub patients: Arc<dyn AccountRepository<PatientProfile>>,
    pub appointments: Arc<dyn AppointmentRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(MemoryAccountRepository::<UserProfile>::new()),
            doctors: Arc::new(MemoryAccountRepository::<DoctorProfile>::new()),
            patients: Arc::new(MemoryAccountRepository::<PatientProfile>::new()),
            appointments: Arc::new(MemoryAppointmentRepository::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgAccountRepository::<UserProfile>::new(pool.clone())),
            doctors: Arc::new(PgAccountRepository::<DoctorProfile>::new(pool.clone())),
            patients: Arc::new(PgAccountRepository::<PatientProfile>::new(pool.clone())),
            appointments: Arc::new(PgAppointmentRepository::new(pool)),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub accounts: AccountDirectory,
    pub appointments: Arc<AppointmentService>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        repositories: Repositories,
        rate_limit_store: Arc<dyn RateLimitStore>,
    ) -> Self {
        let tokens = Arc::new(TokenService::new(&config.tokens));
        let accounts = AccountDirectory {
            users: Arc::new(AccountService::new(repositories.users, tokens.clone())),
            doctors: Arc::new(AccountService::new(repositories.doctors, tokens.clone())),
            patients: Arc::new(AccountService::new(repositories.patients, tokens.clone())),
        };
        let appointments = Arc::new(AppointmentService::new(
            repositories.appointments,
            accounts.clone(),
        ));
        let rate_limiter = Arc::new(
            RateLimiter::new(
                rate_limit_store,
                config.rate_limit_max_requests,
                config.rate_limit_window,
            )
            .trusting_proxy(config.trust_proxy),
        );

        Self {
            tokens,
            accounts,
            appointments,
            rate_limiter,
        }
    }

    /// Everything in process memory; used without a database and in tests
    pub fn in_memory(config: &AppConfig) -> Self {
        Self::new(
            config,
            Repositories::in_memory(),
            Arc::new(MemoryRateLimitStore::new()),
        )
    }
}

/// Handler for GET /api/v1/health
async fn health() -> ApiResponse<serde_json::Value> {
    ApiResponse::ok(json!({ "status": "ok" }), "Service is healthy")
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let permissive = || {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let Some(origin) = origin else {
        return permissive();
    };
    match origin.parse::<HeaderValue>() {
        // Cookies need a concrete origin and explicit method/header lists
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        Err(_) => {
            tracing::warn!("Ignoring invalid CORS_ORIGIN: {}", origin);
            permissive()
        }
    }
}

/// Create the application router with all routes and layers
pub fn create_router(state: AppState, cors_origin: Option<&str>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .nest("/user", account_routes::<UserProfile>(state.clone()))
        .nest("/doctor", account_routes::<DoctorProfile>(state.clone()))
        .nest("/patient", account_routes::<PatientProfile>(state.clone()))
        .nest("/appointment", appointment_routes(state.clone()));

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api/v1", api)
        .layer(from_fn(sanitize_body))
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(from_fn_with_state(state.clone(), log_request))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Hospital API - Starting...");

    let config = AppConfig::from_env().expect("Invalid configuration");

    let repositories = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url)
                .await
                .expect("Failed to create database pool");

            tracing::info!("Running database migrations...");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Migrations completed successfully");
            Repositories::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage; data is lost on restart");
            Repositories::in_memory()
        }
    };

    let rate_limit_store: Arc<dyn RateLimitStore> = match &config.redis_url {
        Some(redis_url) => match RedisRateLimitStore::connect(redis_url).await {
            Ok(store) => {
                tracing::info!("Rate limit counters shared through Redis");
                Arc::new(store)
            }
            Err(err) => {
                tracing::warn!("{}; falling back to per-process rate limiting", err);
                Arc::new(MemoryRateLimitStore::new())
            }
        },
        None => Arc::new(MemoryRateLimitStore::new()),
    };

    let state = AppState::new(&config, repositories, rate_limit_store);
    let app = create_router(state, config.cors_origin.as_deref());

    // Start the Axum server
    let addr = config.bind_address();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Hospital API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
