//! Redis timeline: a list of encoded events per stream plus a hash from
//! event id to 1-based position. Both are updated by one Lua script so a
//! reader never sees an event without its position.

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::OnceCell;
use tracing::instrument;

use atrium_auth::RequestContext;
use atrium_core::{EventId, StreamId};
use atrium_events::StreamEvent;

use super::{TimelineStore, check_scope};
use crate::error::StoreError;

const KEY_PREFIX: &str = "atrium:timeline";

/// KEYS[1] = events list, KEYS[2] = positions hash,
/// ARGV[1] = event id, ARGV[2] = encoded event.
/// Returns the new position, or 0 when the id is already present.
const APPEND_SCRIPT: &str = r#"
if redis.call('HEXISTS', KEYS[2], ARGV[1]) == 1 then
  return 0
end
local position = redis.call('RPUSH', KEYS[1], ARGV[2])
redis.call('HSET', KEYS[2], ARGV[1], position)
return position
"#;

#[derive(Clone)]
pub struct RedisTimelineStore {
    client: Arc<redis::Client>,
    conn: Arc<OnceCell<MultiplexedConnection>>,
    append_script: Arc<redis::Script>,
}

impl RedisTimelineStore {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::Backend(format!("redis connection error: {e}")))?;
        Ok(Self {
            client: Arc::new(client),
            conn: Arc::new(OnceCell::new()),
            append_script: Arc::new(redis::Script::new(APPEND_SCRIPT)),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.conn
            .get_or_try_init(|| async {
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| StoreError::Backend(format!("redis connection error: {e}")))
            })
            .await
            .cloned()
    }

    fn keys(stream_id: &StreamId) -> (String, String) {
        (
            format!("{KEY_PREFIX}:{stream_id}:events"),
            format!("{KEY_PREFIX}:{stream_id}:positions"),
        )
    }
}

fn command_error(e: redis::RedisError) -> StoreError {
    StoreError::Backend(format!("redis command error: {e}"))
}

#[async_trait]
impl TimelineStore for RedisTimelineStore {
    #[instrument(skip(self, event, ctx), fields(stream_id = %stream_id, event_id = %event.event_id()), err)]
    async fn append(
        &self,
        stream_id: &StreamId,
        event: &StreamEvent,
        ctx: &RequestContext,
    ) -> Result<(), StoreError> {
        check_scope(event, ctx)?;
        let encoded = serde_json::to_string(event)?;
        let (events_key, positions_key) = Self::keys(stream_id);
        let mut conn = self.connection().await?;

        let position: i64 = self
            .append_script
            .key(events_key)
            .key(positions_key)
            .arg(event.event_id().as_str())
            .arg(encoded)
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;

        if position == 0 {
            return Err(StoreError::DuplicateEvent(event.event_id().clone()));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(stream_id = %stream_id), err)]
    async fn list_after(
        &self,
        stream_id: &StreamId,
        after: Option<&EventId>,
    ) -> Result<Vec<StreamEvent>, StoreError> {
        let (events_key, positions_key) = Self::keys(stream_id);
        let mut conn = self.connection().await?;

        // A 1-based position is also the 0-based index of the next element.
        let start: i64 = match after {
            None => 0,
            Some(cursor) => {
                let position: Option<i64> = redis::cmd("HGET")
                    .arg(&positions_key)
                    .arg(cursor.as_str())
                    .query_async(&mut conn)
                    .await
                    .map_err(command_error)?;
                position.ok_or_else(|| StoreError::CursorInvalid {
                    stream_id: stream_id.clone(),
                    cursor: cursor.clone(),
                })?
            }
        };

        let encoded: Vec<String> = redis::cmd("LRANGE")
            .arg(&events_key)
            .arg(start)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        encoded
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(StoreError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::contract;

    #[test]
    fn keys_are_namespaced_per_stream() {
        let (events, positions) = RedisTimelineStore::keys(&StreamId::new("canvas:c1").unwrap());
        assert_eq!(events, "atrium:timeline:canvas:c1:events");
        assert_eq!(positions, "atrium:timeline:canvas:c1:positions");
    }

    /// Needs a reachable server: `ATRIUM_TEST_REDIS_URL=redis://...` (use a
    /// scratch database; keys are not cleaned up).
    #[tokio::test]
    async fn satisfies_timeline_contract_when_redis_available() {
        let Ok(url) = std::env::var("ATRIUM_TEST_REDIS_URL") else {
            return;
        };
        let store = RedisTimelineStore::new(url).unwrap();
        let mut conn = store.connection().await.unwrap();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await.unwrap();
        contract::run_all(&store).await;
    }
}
