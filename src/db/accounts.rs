//! Queries against the authoritative account and role store.

use sqlx::SqlitePool;

use crate::models::rbac::DbRole;
use crate::models::user::DbUser;
use crate::utils::utc_now;

const USER_COLUMNS: &str = "u.id, u.name, u.email, u.password_hash, u.active, u.must_change_password, \
     u.role_id, r.name AS role_name, r.access_level, r.permissions AS role_permissions, \
     u.extra_permissions, u.denied_permissions";

const ROLE_COLUMNS: &str = "id, name, description, access_level, permissions, created_at, updated_at";

/// Looks a user up by email, ignoring case.
pub async fn find_user_by_identifier(pool: &SqlitePool, identifier: &str) -> sqlx::Result<Option<DbUser>> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users u LEFT JOIN roles r ON r.id = u.role_id WHERE lower(u.email) = lower(?)"
    );
    sqlx::query_as::<_, DbUser>(&sql)
        .bind(identifier)
        .fetch_optional(pool)
        .await
}

pub async fn find_user_by_id(pool: &SqlitePool, user_id: i64) -> sqlx::Result<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u LEFT JOIN roles r ON r.id = u.role_id WHERE u.id = ?");
    sqlx::query_as::<_, DbUser>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Replaces a legacy credential with `new_hash`, unless it changed meanwhile.
///
/// Returns whether a row was updated.
pub async fn upgrade_password_hash(
    pool: &SqlitePool,
    user_id: i64,
    legacy_value: &str,
    new_hash: &str,
) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ? AND password_hash = ?")
        .bind(new_hash)
        .bind(utc_now())
        .bind(user_id)
        .bind(legacy_value)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn update_user_overrides(
    pool: &SqlitePool,
    user_id: i64,
    extras: &str,
    denials: &str,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE users SET extra_permissions = ?, denied_permissions = ?, updated_at = ? WHERE id = ?",
    )
    .bind(extras)
    .bind(denials)
    .bind(utc_now())
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn list_roles(pool: &SqlitePool) -> sqlx::Result<Vec<DbRole>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY access_level DESC, name");
    sqlx::query_as::<_, DbRole>(&sql).fetch_all(pool).await
}

pub async fn find_role(pool: &SqlitePool, role_id: i64) -> sqlx::Result<Option<DbRole>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?");
    sqlx::query_as::<_, DbRole>(&sql)
        .bind(role_id)
        .fetch_optional(pool)
        .await
}

pub async fn update_role_grant(pool: &SqlitePool, role_id: i64, grant: &str) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE roles SET permissions = ?, updated_at = ? WHERE id = ?")
        .bind(grant)
        .bind(utc_now())
        .bind(role_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn find_role_id_by_name(pool: &SqlitePool, name: &str) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
}

/// Fields for [`insert_user`]; used by the CLI and tests to provision accounts.
#[derive(Debug, Clone, Default)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role_id: Option<i64>,
    pub active: bool,
    pub must_change_password: bool,
    pub extra_permissions: Option<&'a str>,
    pub denied_permissions: Option<&'a str>,
}

pub async fn insert_user(pool: &SqlitePool, user: &NewUser<'_>) -> sqlx::Result<i64> {
    let result = sqlx::query(
        "INSERT INTO users (name, email, password_hash, role_id, active, must_change_password, extra_permissions, denied_permissions) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user.name)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.role_id)
    .bind(user.active)
    .bind(user.must_change_password)
    .bind(user.extra_permissions)
    .bind(user.denied_permissions)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn set_user_active(pool: &SqlitePool, user_id: i64, active: bool) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE users SET active = ?, updated_at = ? WHERE id = ?")
        .bind(active)
        .bind(utc_now())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn delete_user(pool: &SqlitePool, user_id: i64) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}
