use std::time::Duration;

use anyhow::Result;
use axum::http::header::RETRY_AFTER;
use axum::http::{Method, StatusCode};
use serde_json::json;

use escuela_authz::ratelimit::{RateLimitConfig, HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET};

mod common;
use common::{spawn_app_with, test_config, TestApp, PASSWORD};

async fn app_with_limit(max_attempts: u32) -> Result<TestApp> {
    let mut config = test_config();
    config.login_rate_limit = RateLimitConfig::new(max_attempts, Duration::from_secs(60));
    spawn_app_with(config).await
}

fn remaining(resp: &common::TestResponse) -> &str {
    resp.headers
        .get(HEADER_REMAINING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn attempts_over_the_limit_are_refused() -> Result<()> {
    let app = app_with_limit(3).await?;
    app.seed_user("docente@escuela.org", "Docente").await?;

    for expected_remaining in ["2", "1", "0"] {
        let resp = app.try_login("docente@escuela.org", "not-the-password").await?;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers[HEADER_LIMIT], "3");
        assert_eq!(remaining(&resp), expected_remaining);
        assert!(resp.headers.contains_key(HEADER_RESET));
    }

    // refused before credentials are looked at, even the right ones
    let resp = app.try_login("docente@escuela.org", PASSWORD).await?;
    assert_eq!(resp.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.body["error"], "rate_limited");
    assert_eq!(remaining(&resp), "0");

    let retry_after: u64 = resp.headers[RETRY_AFTER].to_str()?.parse()?;
    assert!((1..=60).contains(&retry_after), "retry-after {retry_after}");
    assert_eq!(resp.body["retry_after"], retry_after);
    Ok(())
}

#[tokio::test]
async fn successful_login_clears_the_counter() -> Result<()> {
    let app = app_with_limit(3).await?;
    app.seed_user("docente@escuela.org", "Docente").await?;

    for _ in 0..2 {
        let resp = app.try_login("docente@escuela.org", "not-the-password").await?;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    }
    app.login("docente@escuela.org").await?;

    for _ in 0..3 {
        let resp = app.try_login("docente@escuela.org", "not-the-password").await?;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    }
    let resp = app.try_login("docente@escuela.org", "not-the-password").await?;
    assert_eq!(resp.status, StatusCode::TOO_MANY_REQUESTS);
    Ok(())
}

async fn attempt_from(app: &TestApp, caller: &str) -> Result<common::TestResponse> {
    app.send_with_header(
        Method::POST,
        "/auth/login",
        ("x-forwarded-for", caller),
        json!({ "email": "nadie@escuela.org", "password": "whatever" }),
    )
    .await
}

#[tokio::test]
async fn callers_are_counted_separately() -> Result<()> {
    let app = app_with_limit(1).await?;

    assert_eq!(attempt_from(&app, "203.0.113.1").await?.status, StatusCode::UNAUTHORIZED);
    assert_eq!(attempt_from(&app, "203.0.113.1").await?.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(attempt_from(&app, "203.0.113.2").await?.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn other_routes_are_not_throttled() -> Result<()> {
    let app = app_with_limit(1).await?;

    for _ in 0..3 {
        let resp = app.send(Method::GET, "/api/health", None, None).await?;
        assert_eq!(resp.status, StatusCode::OK);
        assert!(!resp.headers.contains_key(HEADER_LIMIT));
    }
    Ok(())
}
