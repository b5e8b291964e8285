use std::sync::Arc;

use axum::http::Method;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{AuthzConfig, DenialPolicy, PermissionCatalog};
use crate::errors::AppError;
use crate::events::{self, EventBus};
use crate::jwt::JwtConfig;
use crate::ratelimit::{self, RateLimitConfig, RateLimiter};
use crate::routes::{auth, health, rbac};

/// Settings gathered from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt: JwtConfig,
    pub login_rate_limit: RateLimitConfig,
    pub authz: AuthzConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            jwt: JwtConfig::from_env()?,
            login_rate_limit: RateLimitConfig::from_env()?,
            authz: AuthzConfig::from_env(),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub catalog: &'static PermissionCatalog,
    pub limiter: Arc<RateLimiter>,
    pub denials: DenialPolicy,
    pub events: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig, events: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(config.jwt),
            catalog: PermissionCatalog::global(),
            limiter: Arc::new(RateLimiter::in_memory(config.login_rate_limit)),
            denials: config.authz.denials,
            events,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    create_app_with_config(pool, AppConfig::from_env()?).await
}

/// Builds the router and starts the audit listener on the current runtime.
pub async fn create_app_with_config(pool: SqlitePool, config: AppConfig) -> Result<Router, AppError> {
    let (events, rx) = events::init_event_bus();
    tokio::spawn(events::start_audit_listener(rx, pool.clone()));

    let state = AppState::new(pool, config, events);
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let login = post(auth::login).route_layer(middleware::from_fn_with_state(
        state.limiter.clone(),
        ratelimit::throttle,
    ));

    let auth_routes = Router::new()
        .route("/login", login)
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    Router::new()
        .nest("/auth", auth_routes)
        .nest("/rbac", rbac::routes(&state))
        .route("/api/health", get(health::health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
