//! Security audit trail.
//!
//! Authentication and policy changes are published on a broadcast bus and
//! persisted by a background listener into `auth_events`, where every row
//! carries SHA256(prev_hash || payload).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::authz::Grant;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    LoginSucceeded {
        user_id: i64,
    },
    LoginFailed {
        identifier: String,
        reason: &'static str,
    },
    CredentialUpgraded {
        user_id: i64,
    },
    RoleGrantChanged {
        actor_id: i64,
        role_id: i64,
        grant: Grant,
    },
    UserOverridesChanged {
        actor_id: i64,
        user_id: i64,
        extras: Grant,
        denials: Grant,
    },
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::LoginSucceeded { .. } => "auth.login_succeeded",
            AuthEvent::LoginFailed { .. } => "auth.login_failed",
            AuthEvent::CredentialUpgraded { .. } => "auth.credential_upgraded",
            AuthEvent::RoleGrantChanged { .. } => "rbac.role_grant_changed",
            AuthEvent::UserOverridesChanged { .. } => "rbac.user_overrides_changed",
        }
    }

    pub fn actor_id(&self) -> Option<i64> {
        match self {
            AuthEvent::LoginSucceeded { user_id } | AuthEvent::CredentialUpgraded { user_id } => Some(*user_id),
            AuthEvent::RoleGrantChanged { actor_id, .. } | AuthEvent::UserOverridesChanged { actor_id, .. } => {
                Some(*actor_id)
            }
            AuthEvent::LoginFailed { .. } => None,
        }
    }

    pub fn subject_id(&self) -> Option<i64> {
        match self {
            AuthEvent::LoginSucceeded { user_id }
            | AuthEvent::CredentialUpgraded { user_id }
            | AuthEvent::UserOverridesChanged { user_id, .. } => Some(*user_id),
            AuthEvent::RoleGrantChanged { role_id, .. } => Some(*role_id),
            AuthEvent::LoginFailed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuthEvent,
}

pub type EventBus = broadcast::Sender<EventEnvelope>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<EventEnvelope>) {
    broadcast::channel(1024)
}

/// Fire and forget: a missing listener never fails the caller.
pub fn publish(bus: &EventBus, event: AuthEvent) {
    let envelope = EventEnvelope {
        id: Uuid::new_v4(),
        occurred_at: Utc::now(),
        event,
    };
    let _ = bus.send(envelope);
}

pub async fn start_audit_listener(mut rx: broadcast::Receiver<EventEnvelope>, pool: SqlitePool) {
    tracing::info!("audit listener started");
    loop {
        let envelope = match rx.recv().await {
            Ok(envelope) => envelope,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "audit listener lagged, events were lost");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(event = envelope.event.name(), error = %err, "could not encode audit event, skipped");
                continue;
            }
        };

        if let Err(err) = persist(&pool, &envelope, &payload).await {
            tracing::error!(event = envelope.event.name(), error = %err, "failed to store audit event");
        }
    }
}

async fn persist(pool: &SqlitePool, envelope: &EventEnvelope, payload: &str) -> sqlx::Result<()> {
    let previous: Option<(String, i64)> =
        sqlx::query_as("SELECT hash, seq FROM auth_events ORDER BY seq DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;
    let (prev_hash, seq) = match previous {
        Some((hash, seq)) => (Some(hash), seq + 1),
        None => (None, 1),
    };

    let hash = chain_hash(prev_hash.as_deref(), payload);

    sqlx::query(
        "INSERT INTO auth_events (id, event_name, actor_id, subject_id, occurred_at, payload, prev_hash, hash, seq) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(envelope.id.to_string())
    .bind(envelope.event.name())
    .bind(envelope.event.actor_id())
    .bind(envelope.event.subject_id())
    .bind(envelope.occurred_at)
    .bind(payload)
    .bind(&prev_hash)
    .bind(&hash)
    .bind(seq)
    .execute(pool)
    .await?;

    Ok(())
}

pub fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_hash_depends_on_previous() {
        let first = chain_hash(None, "{}");
        let second = chain_hash(Some(&first), "{}");
        assert_eq!(first.len(), 64);
        assert_ne!(first, second);
    }

    #[test]
    fn envelope_serializes_flat() {
        let envelope = EventEnvelope {
            id: Uuid::nil(),
            occurred_at: Utc::now(),
            event: AuthEvent::LoginFailed {
                identifier: "ana@escuela.org".into(),
                reason: "secret_mismatch",
            },
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["event"], "login_failed");
        assert_eq!(value["reason"], "secret_mismatch");
    }

    #[tokio::test]
    async fn listener_stores_encoded_envelopes_in_chain() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::migrate(&pool).await.unwrap();

        let (bus, rx) = init_event_bus();
        publish(&bus, AuthEvent::LoginSucceeded { user_id: 7 });
        publish(&bus, AuthEvent::CredentialUpgraded { user_id: 7 });
        drop(bus);

        // drains the buffered events, then returns once the bus is closed
        start_audit_listener(rx, pool.clone()).await;

        let rows: Vec<(String, String, Option<String>, String)> =
            sqlx::query_as("SELECT event_name, payload, prev_hash, hash FROM auth_events ORDER BY seq")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(rows.len(), 2);

        let first: serde_json::Value = serde_json::from_str(&rows[0].1).unwrap();
        assert_eq!(rows[0].0, "auth.login_succeeded");
        assert_eq!(first["event"], "login_succeeded");
        assert_eq!(first["user_id"], 7);
        assert_eq!(rows[0].3, chain_hash(None, &rows[0].1));
        assert_eq!(rows[1].2.as_deref(), Some(rows[0].3.as_str()));
    }

    #[tokio::test]
    async fn publish_without_listener_is_harmless() {
        let (bus, rx) = init_event_bus();
        drop(rx);
        publish(&bus, AuthEvent::CredentialUpgraded { user_id: 1 });
    }
}
