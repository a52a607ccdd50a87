//! Postgres-backed timeline.
//!
//! Each stream is a run of rows keyed by `(stream_id, position)`. Positions
//! are assigned as `MAX(position) + 1` inside the insert; two concurrent
//! appends racing for the same position trip the primary key and the loser
//! retries. `event_id` is globally unique.
//!
//! | Postgres error | Constraint | StoreError |
//! |---|---|---|
//! | `23505` | `timeline_events_pkey` | retried, then `Backend` |
//! | `23505` | `timeline_events_event_id_key` | `DuplicateEvent` |
//! | anything else | | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use atrium_auth::RequestContext;
use atrium_core::{EventId, StreamId};
use atrium_events::StreamEvent;

use super::{TimelineStore, check_scope};
use crate::error::StoreError;

const POSITION_CONSTRAINT: &str = "timeline_events_pkey";
const EVENT_ID_CONSTRAINT: &str = "timeline_events_event_id_key";
const MAX_POSITION_RETRIES: usize = 8;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS timeline_events (
    stream_id   TEXT        NOT NULL,
    position    BIGINT      NOT NULL,
    event_id    TEXT        NOT NULL,
    tenant_id   TEXT        NOT NULL,
    event_type  TEXT        NOT NULL,
    payload     JSONB       NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT timeline_events_pkey PRIMARY KEY (stream_id, position),
    CONSTRAINT timeline_events_event_id_key UNIQUE (event_id)
)
"#;

#[derive(Debug, Clone)]
pub struct PostgresTimelineStore {
    pool: Arc<PgPool>,
}

impl PostgresTimelineStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Build a pool that connects on first use.
    pub fn connect_lazy(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_lazy(database_url)
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn position_of(
        &self,
        stream_id: &StreamId,
        event_id: &EventId,
    ) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query(
            "SELECT position FROM timeline_events WHERE stream_id = $1 AND event_id = $2",
        )
        .bind(stream_id.as_str())
        .bind(event_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("position_of", e))?;

        row.map(|r| r.try_get::<i64, _>("position"))
            .transpose()
            .map_err(|e| map_sqlx_error("position_of", e))
    }
}

#[async_trait]
impl TimelineStore for PostgresTimelineStore {
    #[instrument(
        skip(self, event, ctx),
        fields(
            stream_id = %stream_id,
            event_id = %event.event_id(),
            attempts = tracing::field::Empty
        ),
        err
    )]
    async fn append(
        &self,
        stream_id: &StreamId,
        event: &StreamEvent,
        ctx: &RequestContext,
    ) -> Result<(), StoreError> {
        check_scope(event, ctx)?;
        let payload = serde_json::to_value(event)?;

        for attempt in 1..=MAX_POSITION_RETRIES {
            let result = sqlx::query(
                r#"
                INSERT INTO timeline_events (stream_id, position, event_id, tenant_id, event_type, payload)
                SELECT $1, COALESCE(MAX(position), 0) + 1, $2, $3, $4, $5
                FROM timeline_events
                WHERE stream_id = $1
                "#,
            )
            .bind(stream_id.as_str())
            .bind(event.event_id().as_str())
            .bind(event.routing().tenant_id.as_str())
            .bind(event.event_type())
            .bind(&payload)
            .execute(&*self.pool)
            .await;

            match result {
                Ok(_) => {
                    Span::current().record("attempts", attempt);
                    return Ok(());
                }
                Err(e) => match unique_violation(&e) {
                    Some(EVENT_ID_CONSTRAINT) => {
                        return Err(StoreError::DuplicateEvent(event.event_id().clone()));
                    }
                    Some(POSITION_CONSTRAINT) => {
                        tracing::debug!(attempt, "position taken by a concurrent append, retrying");
                        continue;
                    }
                    _ => return Err(map_sqlx_error("append", e)),
                },
            }
        }

        Err(StoreError::Backend(format!(
            "stream '{stream_id}' stayed contended after {MAX_POSITION_RETRIES} attempts"
        )))
    }

    #[instrument(skip(self), fields(stream_id = %stream_id), err)]
    async fn list_after(
        &self,
        stream_id: &StreamId,
        after: Option<&EventId>,
    ) -> Result<Vec<StreamEvent>, StoreError> {
        let from = match after {
            None => 0,
            Some(cursor) => self.position_of(stream_id, cursor).await?.ok_or_else(|| {
                StoreError::CursorInvalid {
                    stream_id: stream_id.clone(),
                    cursor: cursor.clone(),
                }
            })?,
        };

        let rows = sqlx::query(
            r#"
            SELECT payload
            FROM timeline_events
            WHERE stream_id = $1 AND position > $2
            ORDER BY position ASC
            "#,
        )
        .bind(stream_id.as_str())
        .bind(from)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_after", e))?;

        rows.into_iter()
            .map(|row| -> Result<StreamEvent, StoreError> {
                let payload: JsonValue = row
                    .try_get("payload")
                    .map_err(|e| map_sqlx_error("list_after", e))?;
                Ok(serde_json::from_value(payload)?)
            })
            .collect()
    }
}

/// Name of the unique constraint `err` violated, if any.
fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => db.constraint(),
        _ => None,
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) => {
            StoreError::Backend(format!("database error in {operation}: {}", db.message()))
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool unavailable in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
