//! Service wiring: stores, bus and engine built once from `AppConfig`.

use std::sync::Arc;

use atrium_auth::{AllowAllGate, PolicyGate};
use atrium_events::{InMemoryEventBus, LiveEvent, Strictness};
use atrium_infra::{
    AppConfig, ApplyOptions, CommandApplyEngine, StoreError, build_state, build_timeline,
    isolation::IsolationRegistry,
    timeline::{PublishingTimeline, TimelineStore},
};

use super::errors::store_error_to_response;

pub type LiveBus = Arc<InMemoryEventBus<LiveEvent>>;

pub struct Services {
    pub engine: CommandApplyEngine,
    pub registry: IsolationRegistry,
    /// Appends durable events, then broadcasts on `bus`.
    pub timeline: Arc<PublishingTimeline<LiveBus>>,
    pub bus: LiveBus,
    pub options: ApplyOptions,
}

impl Services {
    pub fn new(
        config: &AppConfig,
        registry: IsolationRegistry,
        revisions: Arc<dyn atrium_infra::revision::RevisionStore>,
        store: Arc<dyn TimelineStore>,
        gate: Arc<dyn PolicyGate>,
    ) -> Self {
        let bus: LiveBus = Arc::new(InMemoryEventBus::new());
        let timeline = Arc::new(PublishingTimeline::new(store, Arc::clone(&bus)));
        let engine = CommandApplyEngine::new(registry.clone(), gate, revisions, timeline.clone())
            .with_options(config.apply);
        Self {
            engine,
            registry,
            timeline,
            bus,
            options: config.apply,
        }
    }

    pub fn strictness(&self) -> Strictness {
        if self.options.strict_events {
            Strictness::Strict
        } else {
            Strictness::Lenient
        }
    }
}

/// What the routes run against. A configuration failure does not stop the
/// process; every domain route answers 503 instead.
#[derive(Clone)]
pub enum AppServices {
    Ready(Arc<Services>),
    Unavailable(Arc<StoreError>),
}

impl AppServices {
    pub fn ready(&self) -> Result<&Services, axum::response::Response> {
        match self {
            AppServices::Ready(services) => Ok(services),
            AppServices::Unavailable(err) => Err(store_error_to_response(
                StoreError::Unconfigured(err.to_string()),
            )),
        }
    }
}

pub async fn build_services(config: Result<AppConfig, StoreError>) -> AppServices {
    match try_build(config).await {
        Ok(services) => AppServices::Ready(Arc::new(services)),
        Err(err) => {
            tracing::error!(error = %err, "storage backends unavailable; serving 503");
            AppServices::Unavailable(Arc::new(err))
        }
    }
}

async fn try_build(config: Result<AppConfig, StoreError>) -> Result<Services, StoreError> {
    let config = config?;
    let store = build_timeline(&config.timeline).await?;
    let state = build_state(&config.state).await?;
    Ok(Services::new(
        &config,
        state.registry,
        state.revisions,
        store,
        Arc::new(AllowAllGate),
    ))
}
