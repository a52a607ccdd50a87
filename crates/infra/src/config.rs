//! Process configuration read from the environment.
//!
//! Backends are a closed set of variants. A missing or unknown timeline
//! backend is an error; there is no silent in-memory fallback.

use std::path::PathBuf;
use std::str::FromStr;

use crate::apply::{ApplyOptions, UnknownResourcePolicy};
use crate::error::StoreError;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineBackend {
    Memory,
    Fs { dir: PathBuf },
    Postgres { url: String },
    Redis { url: String },
}

/// Backend for the ownership registry and the revision store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateBackend {
    Memory,
    Fs { dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub listen_addr: String,
    pub timeline: TimelineBackend,
    pub state: StateBackend,
    pub apply: ApplyOptions,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse from any key/value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str, why: &str| {
            get(key).ok_or_else(|| StoreError::Unconfigured(format!("{key} is required {why}")))
        };
        let data_dir = || require("ATRIUM_DATA_DIR", "for fs backends").map(PathBuf::from);

        let timeline = match require("ATRIUM_TIMELINE_BACKEND", "(memory, fs, postgres or redis)")?
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => TimelineBackend::Memory,
            "fs" => TimelineBackend::Fs { dir: data_dir()? },
            "postgres" => TimelineBackend::Postgres {
                url: require("DATABASE_URL", "for the postgres timeline")?,
            },
            "redis" => TimelineBackend::Redis {
                url: require("REDIS_URL", "for the redis timeline")?,
            },
            other => {
                return Err(StoreError::Unconfigured(format!(
                    "unknown ATRIUM_TIMELINE_BACKEND '{other}'"
                )));
            }
        };

        let state = match get("ATRIUM_STATE_BACKEND").map(|v| v.to_ascii_lowercase()) {
            Some(v) if v == "memory" => StateBackend::Memory,
            Some(v) if v == "fs" => StateBackend::Fs { dir: data_dir()? },
            Some(other) => {
                return Err(StoreError::Unconfigured(format!(
                    "unknown ATRIUM_STATE_BACKEND '{other}'"
                )));
            }
            None => match &timeline {
                TimelineBackend::Memory => StateBackend::Memory,
                TimelineBackend::Fs { dir } => StateBackend::Fs { dir: dir.clone() },
                _ => {
                    return Err(StoreError::Unconfigured(
                        "ATRIUM_STATE_BACKEND is required with a remote timeline".to_string(),
                    ));
                }
            },
        };

        let strict_events = match get("ATRIUM_STRICT_EVENTS") {
            None => false,
            Some(v) => parse_bool(&v).ok_or_else(|| {
                StoreError::Unconfigured(format!("ATRIUM_STRICT_EVENTS '{v}' is not a boolean"))
            })?,
        };
        let unknown_resources = get("ATRIUM_UNKNOWN_RESOURCES")
            .map(|v| {
                UnknownResourcePolicy::from_str(&v)
                    .map_err(|e| StoreError::Unconfigured(format!("ATRIUM_UNKNOWN_RESOURCES: {e}")))
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            listen_addr: get("ATRIUM_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            timeline,
            state,
            apply: ApplyOptions {
                strict_events,
                unknown_resources,
            },
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(pairs: &[(&str, &str)]) -> Result<AppConfig, StoreError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn missing_timeline_backend_is_unconfigured() {
        assert!(matches!(parse(&[]), Err(StoreError::Unconfigured(_))));
        assert!(matches!(
            parse(&[("ATRIUM_TIMELINE_BACKEND", "  ")]),
            Err(StoreError::Unconfigured(_))
        ));
        assert!(matches!(
            parse(&[("ATRIUM_TIMELINE_BACKEND", "dynamo")]),
            Err(StoreError::Unconfigured(_))
        ));
    }

    #[test]
    fn memory_defaults() {
        let cfg = parse(&[("ATRIUM_TIMELINE_BACKEND", "memory")]).unwrap();
        assert_eq!(cfg.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(cfg.timeline, TimelineBackend::Memory);
        assert_eq!(cfg.state, StateBackend::Memory);
        assert_eq!(cfg.apply, ApplyOptions::default());
    }

    #[test]
    fn fs_needs_a_data_dir_and_shares_it_with_state() {
        assert!(parse(&[("ATRIUM_TIMELINE_BACKEND", "fs")]).is_err());

        let cfg = parse(&[("ATRIUM_TIMELINE_BACKEND", "FS"), ("ATRIUM_DATA_DIR", "/var/atrium")]).unwrap();
        let dir = PathBuf::from("/var/atrium");
        assert_eq!(cfg.timeline, TimelineBackend::Fs { dir: dir.clone() });
        assert_eq!(cfg.state, StateBackend::Fs { dir });
    }

    #[test]
    fn remote_timeline_requires_url_and_explicit_state() {
        assert!(parse(&[("ATRIUM_TIMELINE_BACKEND", "postgres")]).is_err());
        assert!(parse(&[
            ("ATRIUM_TIMELINE_BACKEND", "postgres"),
            ("DATABASE_URL", "postgres://localhost/atrium"),
        ])
        .is_err());

        let cfg = parse(&[
            ("ATRIUM_TIMELINE_BACKEND", "redis"),
            ("REDIS_URL", "redis://127.0.0.1/"),
            ("ATRIUM_STATE_BACKEND", "memory"),
        ])
        .unwrap();
        assert_eq!(
            cfg.timeline,
            TimelineBackend::Redis {
                url: "redis://127.0.0.1/".to_string()
            }
        );
    }

    #[test]
    fn apply_options_are_parsed() {
        let cfg = parse(&[
            ("ATRIUM_TIMELINE_BACKEND", "memory"),
            ("ATRIUM_STRICT_EVENTS", "true"),
            ("ATRIUM_UNKNOWN_RESOURCES", "register_on_first_write"),
            ("ATRIUM_LISTEN_ADDR", "127.0.0.1:9000"),
        ])
        .unwrap();
        assert!(cfg.apply.strict_events);
        assert_eq!(cfg.apply.unknown_resources, UnknownResourcePolicy::RegisterOnFirstWrite);
        assert_eq!(cfg.listen_addr, "127.0.0.1:9000");

        assert!(parse(&[("ATRIUM_TIMELINE_BACKEND", "memory"), ("ATRIUM_STRICT_EVENTS", "maybe")]).is_err());
        assert!(parse(&[("ATRIUM_TIMELINE_BACKEND", "memory"), ("ATRIUM_UNKNOWN_RESOURCES", "allow")]).is_err());
    }
}
