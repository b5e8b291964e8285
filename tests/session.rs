use anyhow::Result;
use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use serde_json::json;

use escuela_authz::db::accounts;
use escuela_authz::jwt::JwtConfig;

mod common;
use common::{spawn_app, TEST_SECRET};

#[tokio::test]
async fn me_requires_a_token() -> Result<()> {
    let app = spawn_app().await?;

    let resp = app.send(Method::GET, "/auth/me", None, None).await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.body["error"], "unauthorized");
    Ok(())
}

#[tokio::test]
async fn me_treats_malformed_token_as_anonymous() -> Result<()> {
    let app = spawn_app().await?;

    let resp = app.send(Method::GET, "/auth/me", Some("not-a-jwt"), None).await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.body["error"], "unauthorized");
    Ok(())
}

#[tokio::test]
async fn me_distinguishes_expired_from_forged_tokens() -> Result<()> {
    let app = spawn_app().await?;
    let user_id = app.seed_user("docente@escuela.org", "Docente").await?;

    let issued = JwtConfig::new(TEST_SECRET).encode_at(user_id, "Docente", Utc::now() - Duration::hours(25))?;
    let resp = app.send(Method::GET, "/auth/me", Some(&issued.token), None).await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.body["error"], "token_expired");

    let forged = JwtConfig::new("some-other-secret").encode(user_id, "Administrador")?;
    let resp = app.send(Method::GET, "/auth/me", Some(&forged.token), None).await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.body["error"], "token_invalid");
    Ok(())
}

#[tokio::test]
async fn me_returns_current_identity() -> Result<()> {
    let app = spawn_app().await?;
    let user_id = app.seed_user("docente@escuela.org", "Docente").await?;
    let token = app.login("docente@escuela.org").await?;

    let resp = app.send(Method::GET, "/auth/me", Some(&token), None).await?;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["id"], user_id);
    assert_eq!(resp.body["role"], "Docente");
    assert_eq!(resp.body["permissions"]["alumnos"], json!(["read"]));
    Ok(())
}

#[tokio::test]
async fn permissions_are_recomputed_on_every_request() -> Result<()> {
    let app = spawn_app().await?;
    app.seed_user("docente@escuela.org", "Docente").await?;
    let token = app.login("docente@escuela.org").await?;

    let role_id = accounts::find_role_id_by_name(&app.pool, "Docente")
        .await?
        .expect("seeded role");
    accounts::update_role_grant(&app.pool, role_id, r#"{"alumnos": ["read", "export"], "reportes": "*"}"#).await?;

    // same token, new grant
    let resp = app.send(Method::GET, "/auth/me", Some(&token), None).await?;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.body["permissions"],
        json!({
            "alumnos": ["export", "read"],
            "reportes": ["export", "read"]
        })
    );
    Ok(())
}

#[tokio::test]
async fn deleted_or_deactivated_subjects_lose_their_session() -> Result<()> {
    let app = spawn_app().await?;
    let keep = app.seed_user("docente@escuela.org", "Docente").await?;
    let gone = app.seed_user("temporal@escuela.org", "Docente").await?;
    let keep_token = app.login("docente@escuela.org").await?;
    let gone_token = app.login("temporal@escuela.org").await?;

    accounts::delete_user(&app.pool, gone).await?;
    let resp = app.send(Method::GET, "/auth/me", Some(&gone_token), None).await?;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.body["error"], "not_found");

    accounts::set_user_active(&app.pool, keep, false).await?;
    let resp = app.send(Method::GET, "/auth/me", Some(&keep_token), None).await?;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.body["error"], "account_inactive");
    Ok(())
}

#[tokio::test]
async fn logout_needs_a_valid_session() -> Result<()> {
    let app = spawn_app().await?;
    app.seed_user("docente@escuela.org", "Docente").await?;
    let token = app.login("docente@escuela.org").await?;

    let resp = app.send(Method::POST, "/auth/logout", None, None).await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let resp = app.send(Method::POST, "/auth/logout", Some(&token), None).await?;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["message"], "Logged out");
    Ok(())
}
