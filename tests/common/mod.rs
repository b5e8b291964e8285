#![allow(dead_code)]

use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`

use escuela_authz::authz::AuthzConfig;
use escuela_authz::db::accounts::{self, NewUser};
use escuela_authz::jwt::JwtConfig;
use escuela_authz::ratelimit::RateLimitConfig;
use escuela_authz::utils::hash_password;
use escuela_authz::{create_app_with_config, AppConfig};

pub const TEST_SECRET: &str = "test-secret";
pub const PASSWORD: &str = "password123";

/// Router plus the database behind it. The temp dir lives as long as the app.
pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt: JwtConfig::new(TEST_SECRET),
        login_rate_limit: RateLimitConfig::new(100, Duration::from_secs(60)),
        authz: AuthzConfig::default(),
    }
}

pub async fn spawn_app() -> Result<TestApp> {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: AppConfig) -> Result<TestApp> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_authz.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    let app = create_app_with_config(pool.clone(), config).await?;
    Ok(TestApp { app, pool, _dir: dir })
}

impl TestApp {
    /// Creates an active account with an argon2 credential.
    pub async fn seed_user(&self, email: &str, role: &str) -> Result<i64> {
        let hash = hash_password(PASSWORD)?;
        self.seed_user_with_hash(email, role, &hash).await
    }

    pub async fn seed_user_with_hash(&self, email: &str, role: &str, password_hash: &str) -> Result<i64> {
        let role_id = accounts::find_role_id_by_name(&self.pool, role)
            .await?
            .with_context(|| format!("role {role} not seeded"))?;
        let id = accounts::insert_user(
            &self.pool,
            &NewUser {
                name: "Test User",
                email,
                password_hash,
                role_id: Some(role_id),
                active: true,
                ..Default::default()
            },
        )
        .await?;
        Ok(id)
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<TestResponse> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        self.dispatch(req).await
    }

    async fn dispatch(&self, req: Request<Body>) -> Result<TestResponse> {
        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok(TestResponse { status, headers, body })
    }

    pub async fn send_with_header(
        &self,
        method: Method,
        uri: &str,
        (name, value): (&str, &str),
        body: Value,
    ) -> Result<TestResponse> {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(name, value)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?;
        self.dispatch(req).await
    }

    /// Sends `body` verbatim as a JSON request body.
    pub async fn send_raw(&self, method: Method, uri: &str, token: Option<&str>, body: &str) -> Result<TestResponse> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.dispatch(builder.body(Body::from(body.to_string()))?).await
    }

    pub async fn try_login(&self, email: &str, password: &str) -> Result<TestResponse> {
        self.send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// Logs in and returns the bearer token.
    pub async fn login(&self, email: &str) -> Result<String> {
        let resp = self.try_login(email, PASSWORD).await?;
        assert_eq!(resp.status, StatusCode::OK, "login failed: {}", resp.body);
        resp.body["token"]
            .as_str()
            .map(str::to_string)
            .context("login response without token")
    }
}
