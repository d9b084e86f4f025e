// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the quote sync engine.
//!
//! Configuration is passed to [`SyncScheduler::open()`](crate::SyncScheduler::open)
//! and [`RecordStore::open()`](crate::RecordStore::open). It can be built
//! programmatically or deserialized from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use quote_sync::config::{QuoteSyncConfig, SchedulerConfig};
//!
//! let config = QuoteSyncConfig {
//!     scheduler: SchedulerConfig {
//!         interval: "1m".into(),
//!         auto_resolve: false,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! QuoteSyncConfig
//! ├── store: StoreConfig           # KV keys, default seeding
//! ├── scheduler: SchedulerConfig   # Interval, auto-resolution, timeouts
//! ├── circuit: CircuitConfig       # Fetch circuit breaker
//! └── kv: KvConfig                 # SQLite adapter settings
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! store:
//!   records_key: "quotes"
//!   seed_defaults: true
//!
//! scheduler:
//!   interval: "30s"
//!   sync_on_start: true
//!   auto_resolve: true
//!   auto_resolve_mode: per_conflict
//!   fetch_timeout: "10s"
//!
//! circuit:
//!   failure_threshold: 5
//!   recovery_timeout_sec: 30
//!
//! kv:
//!   sqlite_path: "/var/lib/app/quotes.db"
//! ```

use crate::error::{QuoteSyncError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteSyncConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub circuit: CircuitConfig,

    #[serde(default)]
    pub kv: KvConfig,
}

impl QuoteSyncConfig {
    /// Create a config for testing: fast interval, no sync on start, no
    /// circuit breaker, in-memory SQLite.
    pub fn for_testing() -> Self {
        Self {
            store: StoreConfig::default(),
            scheduler: SchedulerConfig {
                interval: "100ms".to_string(),
                sync_on_start: false,
                shutdown_timeout: "1s".to_string(),
                ..Default::default()
            },
            circuit: CircuitConfig {
                enabled: false,
                ..Default::default()
            },
            kv: KvConfig::in_memory(),
        }
    }

    /// Check the config for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.scheduler.validate()?;
        self.circuit.validate()?;
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn parse_duration_field(field: &str, value: &str) -> Result<Duration> {
    let parsed = humantime::parse_duration(value)
        .map_err(|e| QuoteSyncError::Config(format!("{}: invalid duration {:?}: {}", field, value, e)))?;
    if parsed.is_zero() {
        return Err(QuoteSyncError::Config(format!("{} must be greater than zero", field)));
    }
    Ok(parsed)
}

// ═══════════════════════════════════════════════════════════════════════════════
// StoreConfig: persisted layout
// ═══════════════════════════════════════════════════════════════════════════════

/// Record store settings.
///
/// Keys name the KV entries the store and scheduler read and write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Key holding the JSON array of records.
    #[serde(default = "default_records_key")]
    pub records_key: String,

    #[serde(default = "default_sync_count_key")]
    pub sync_count_key: String,

    #[serde(default = "default_conflicts_resolved_key")]
    pub conflicts_resolved_key: String,

    /// Key holding the RFC 3339 timestamp of the last completed sync.
    #[serde(default = "default_last_sync_key")]
    pub last_sync_key: String,

    /// Seed the default quotes when no record set has been stored yet.
    #[serde(default = "default_true")]
    pub seed_defaults: bool,
}

fn default_records_key() -> String {
    "quotes".to_string()
}

fn default_sync_count_key() -> String {
    "sync_count".to_string()
}

fn default_conflicts_resolved_key() -> String {
    "conflicts_resolved".to_string()
}

fn default_last_sync_key() -> String {
    "last_sync_time".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            records_key: default_records_key(),
            sync_count_key: default_sync_count_key(),
            conflicts_resolved_key: default_conflicts_resolved_key(),
            last_sync_key: default_last_sync_key(),
            seed_defaults: true,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        let keys = [
            ("records_key", &self.records_key),
            ("sync_count_key", &self.sync_count_key),
            ("conflicts_resolved_key", &self.conflicts_resolved_key),
            ("last_sync_key", &self.last_sync_key),
        ];
        for (name, key) in keys.iter() {
            if key.trim().is_empty() {
                return Err(QuoteSyncError::Config(format!("store.{} must not be empty", name)));
            }
        }
        for (i, (a_name, a)) in keys.iter().enumerate() {
            for (b_name, b) in keys.iter().skip(i + 1) {
                if a == b {
                    return Err(QuoteSyncError::Config(format!(
                        "store.{} and store.{} share key {:?}",
                        a_name, b_name, a
                    )));
                }
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SchedulerConfig: timer and session behaviour
// ═══════════════════════════════════════════════════════════════════════════════

/// How auto-resolution collapses a conflicting batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoResolveMode {
    /// Server-wins applied to each conflicting record.
    #[default]
    PerConflict,
    /// The whole local set is replaced by the remote batch.
    ReplaceAll,
}

/// Sync scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Period between timer-triggered syncs (e.g., "30s").
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Fire the first timer tick immediately on `start()`.
    #[serde(default = "default_true")]
    pub sync_on_start: bool,

    /// Resolve conflicts without caller input.
    #[serde(default = "default_true")]
    pub auto_resolve: bool,

    #[serde(default)]
    pub auto_resolve_mode: AutoResolveMode,

    /// Upper bound on a single remote fetch. `None` waits indefinitely.
    #[serde(default)]
    pub fetch_timeout: Option<String>,

    /// How long `stop()` waits for the timer task to exit.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: String,
}

fn default_interval() -> String {
    "30s".to_string()
}

fn default_shutdown_timeout() -> String {
    "10s".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            sync_on_start: true,
            auto_resolve: true,
            auto_resolve_mode: AutoResolveMode::PerConflict,
            fetch_timeout: None,
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    /// Parse the interval string to a Duration.
    pub fn interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.interval).unwrap_or(Duration::from_secs(30))
    }

    pub fn fetch_timeout_duration(&self) -> Option<Duration> {
        self.fetch_timeout
            .as_deref()
            .and_then(|s| humantime::parse_duration(s).ok())
    }

    pub fn shutdown_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.shutdown_timeout).unwrap_or(Duration::from_secs(10))
    }

    fn validate(&self) -> Result<()> {
        parse_duration_field("scheduler.interval", &self.interval)?;
        parse_duration_field("scheduler.shutdown_timeout", &self.shutdown_timeout)?;
        if let Some(ref timeout) = self.fetch_timeout {
            parse_duration_field("scheduler.fetch_timeout", timeout)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CircuitConfig: fetch circuit breaker
// ═══════════════════════════════════════════════════════════════════════════════

/// Circuit breaker around the remote fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Successful half-open calls needed to close again.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Time spent open before a trial call is allowed.
    #[serde(default = "default_recovery_timeout_sec")]
    pub recovery_timeout_sec: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_recovery_timeout_sec() -> u64 {
    30
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout_sec: 30,
        }
    }
}

impl CircuitConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_sec)
    }

    fn validate(&self) -> Result<()> {
        if self.enabled && (self.failure_threshold == 0 || self.success_threshold == 0) {
            return Err(QuoteSyncError::Config(
                "circuit thresholds must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KvConfig: SQLite adapter
// ═══════════════════════════════════════════════════════════════════════════════

/// SQLite KV adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvConfig {
    /// Path to the SQLite database.
    pub sqlite_path: String,

    /// Whether to use WAL mode for SQLite (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "quote_sync.db".to_string(),
            wal_mode: true,
        }
    }
}

impl KvConfig {
    /// Create an in-memory config for testing.
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: ":memory:".to_string(),
            wal_mode: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = QuoteSyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.records_key, "quotes");
        assert_eq!(config.store.last_sync_key, "last_sync_time");
        assert!(config.scheduler.auto_resolve);
        assert_eq!(config.scheduler.auto_resolve_mode, AutoResolveMode::PerConflict);
        assert!(config.scheduler.fetch_timeout.is_none());
    }

    #[test]
    fn test_for_testing_config() {
        let config = QuoteSyncConfig::for_testing();
        assert!(config.validate().is_ok());
        assert_eq!(config.kv.sqlite_path, ":memory:");
        assert!(!config.circuit.enabled);
        assert!(!config.scheduler.sync_on_start);
        assert_eq!(config.scheduler.interval_duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_interval_various_formats() {
        let test_cases = [
            ("5s", Duration::from_secs(5)),
            ("1m", Duration::from_secs(60)),
            ("500ms", Duration::from_millis(500)),
            ("2min", Duration::from_secs(120)),
        ];

        for (input, expected) in test_cases {
            let config = SchedulerConfig {
                interval: input.to_string(),
                ..Default::default()
            };
            assert_eq!(config.interval_duration(), expected, "Failed for input: {}", input);
        }
    }

    #[test]
    fn test_interval_invalid_fallback() {
        let config = SchedulerConfig {
            interval: "soon".to_string(),
            ..Default::default()
        };
        // Should fall back to 30 seconds
        assert_eq!(config.interval_duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_interval_fails_validation() {
        let mut config = QuoteSyncConfig::default();
        config.scheduler.interval = "soon".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, QuoteSyncError::Config(_)));
        assert!(err.to_string().contains("scheduler.interval"));
    }

    #[test]
    fn test_zero_interval_fails_validation() {
        let mut config = QuoteSyncConfig::default();
        config.scheduler.interval = "0s".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fetch_timeout_parsing() {
        let mut config = SchedulerConfig::default();
        assert_eq!(config.fetch_timeout_duration(), None);

        config.fetch_timeout = Some("250ms".to_string());
        assert_eq!(config.fetch_timeout_duration(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_bad_fetch_timeout_fails_validation() {
        let mut config = QuoteSyncConfig::default();
        config.scheduler.fetch_timeout = Some("whenever".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_store_keys_rejected() {
        let mut config = QuoteSyncConfig::default();
        config.store.sync_count_key = "quotes".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("records_key"));
    }

    #[test]
    fn test_empty_store_key_rejected() {
        let mut config = QuoteSyncConfig::default();
        config.store.records_key = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_circuit_zero_threshold_rejected() {
        let mut config = QuoteSyncConfig::default();
        config.circuit.failure_threshold = 0;
        assert!(config.validate().is_err());

        // Disabled circuit is not checked
        config.circuit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_circuit_default() {
        let config = CircuitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 2);
        assert_eq!(config.recovery_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_kv_config_default() {
        let config = KvConfig::default();
        assert_eq!(config.sqlite_path, "quote_sync.db");
        assert!(config.wal_mode);
    }

    #[test]
    fn test_kv_config_in_memory() {
        let config = KvConfig::in_memory();
        assert_eq!(config.sqlite_path, ":memory:");
        assert!(!config.wal_mode);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"scheduler": {"auto_resolve": false, "auto_resolve_mode": "replace_all"}}"#;
        let config: QuoteSyncConfig = serde_json::from_str(json).unwrap();
        assert!(!config.scheduler.auto_resolve);
        assert_eq!(config.scheduler.auto_resolve_mode, AutoResolveMode::ReplaceAll);
        assert_eq!(config.scheduler.interval, "30s");
        assert!(config.scheduler.sync_on_start);
        assert_eq!(config.store.records_key, "quotes");
    }

    #[test]
    fn test_config_json_roundtrip() {
        let mut config = QuoteSyncConfig::default();
        config.scheduler.fetch_timeout = Some("5s".to_string());
        config.store.records_key = "my_quotes".to_string();

        let json = serde_json::to_string(&config).unwrap();
        let parsed: QuoteSyncConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.store.records_key, "my_quotes");
        assert_eq!(parsed.scheduler.fetch_timeout.as_deref(), Some("5s"));
    }
}
