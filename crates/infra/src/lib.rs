//! Infrastructure layer: stores, the apply engine, configuration.

pub mod apply;
pub mod backends;
pub mod config;
pub mod error;
pub mod isolation;
pub mod jsonl;
pub mod locks;
pub mod revision;
pub mod slots;
pub mod timeline;

mod integration_tests;

pub use apply::{ApplyOptions, CommandApplyEngine, UnknownResourcePolicy};
pub use backends::{StateStores, build_state, build_timeline};
pub use config::{AppConfig, StateBackend, TimelineBackend};
pub use error::{ApplyError, StoreError};
