//! Construct the configured stores, once, at process start.

use std::sync::Arc;

use crate::config::{StateBackend, TimelineBackend};
use crate::error::StoreError;
use crate::isolation::{FileOwnershipStore, InMemoryOwnershipStore, IsolationRegistry};
use crate::revision::{FileRevisionStore, InMemoryRevisionStore, RevisionStore};
use crate::timeline::{FileTimelineStore, InMemoryTimelineStore, PostgresTimelineStore, TimelineStore};

/// Ownership registry and revision store built from one `StateBackend`.
#[derive(Clone)]
pub struct StateStores {
    pub registry: IsolationRegistry,
    pub revisions: Arc<dyn RevisionStore>,
}

pub async fn build_timeline(backend: &TimelineBackend) -> Result<Arc<dyn TimelineStore>, StoreError> {
    let store: Arc<dyn TimelineStore> = match backend {
        TimelineBackend::Memory => Arc::new(InMemoryTimelineStore::new()),
        TimelineBackend::Fs { dir } => Arc::new(FileTimelineStore::open(dir).await?),
        TimelineBackend::Postgres { url } => {
            let store = PostgresTimelineStore::connect_lazy(url)?;
            store.ensure_schema().await?;
            Arc::new(store)
        }
        TimelineBackend::Redis { url } => redis_timeline(url)?,
    };
    tracing::info!(backend = backend_name(backend), "timeline store ready");
    Ok(store)
}

#[cfg(feature = "redis")]
fn redis_timeline(url: &str) -> Result<Arc<dyn TimelineStore>, StoreError> {
    Ok(Arc::new(crate::timeline::RedisTimelineStore::new(url)?))
}

#[cfg(not(feature = "redis"))]
fn redis_timeline(_url: &str) -> Result<Arc<dyn TimelineStore>, StoreError> {
    Err(StoreError::Unconfigured(
        "redis timeline requested but this build lacks the `redis` feature".to_string(),
    ))
}

pub async fn build_state(backend: &StateBackend) -> Result<StateStores, StoreError> {
    let stores = match backend {
        StateBackend::Memory => StateStores {
            registry: IsolationRegistry::new(Arc::new(InMemoryOwnershipStore::new())),
            revisions: Arc::new(InMemoryRevisionStore::new()),
        },
        StateBackend::Fs { dir } => StateStores {
            registry: IsolationRegistry::new(Arc::new(
                FileOwnershipStore::open(dir.join("ownership")).await?,
            )),
            revisions: Arc::new(FileRevisionStore::open(dir.join("revisions")).await?),
        },
    };
    tracing::info!(
        backend = match backend {
            StateBackend::Memory => "memory",
            StateBackend::Fs { .. } => "fs",
        },
        "state stores ready"
    );
    Ok(stores)
}

fn backend_name(backend: &TimelineBackend) -> &'static str {
    match backend {
        TimelineBackend::Memory => "memory",
        TimelineBackend::Fs { .. } => "fs",
        TimelineBackend::Postgres { .. } => "postgres",
        TimelineBackend::Redis { .. } => "redis",
    }
}
