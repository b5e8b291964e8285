use anyhow::Result;
use axum::http::{Method, StatusCode};

use escuela_authz::authz::PermissionCatalog;

mod common;
use common::spawn_app;

#[tokio::test]
async fn health_endpoint_reports_db_ok() -> Result<()> {
    let app = spawn_app().await?;

    let resp = app.send(Method::GET, "/api/health", None, None).await?;
    assert_eq!(resp.status, StatusCode::OK, "health endpoint did not return 200");

    let db_ok = resp.body.get("db_ok").and_then(|b| b.as_bool()).unwrap_or(false);
    assert!(db_ok, "expected db_ok: true, got: {}", resp.body);
    assert_eq!(resp.body["status"], "ok");
    assert_eq!(resp.body["catalog_resources"], PermissionCatalog::global().len());
    assert_eq!(resp.body["rate_limited_keys"], 0);

    Ok(())
}
