// src/config.rs
//! Runtime configuration: freshness thresholds, scheduler pacing, alert
//! window/thresholds, and fallback eligibility overrides.
//!
//! Loaded from TOML or JSON; every field has a default so a partial file works.
//! `ConfigHandle` can be hot-reloaded from disk without restarting.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tracing::{info, warn};

pub const ENV_CONFIG_PATH: &str = "REFRESH_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/refresh.toml";
pub const DEFAULT_JSON_PATH: &str = "config/refresh.json";

/// Upper bound for every seconds-valued setting (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

/// Seconds from config as a chrono duration; saturates instead of panicking.
pub fn secs_to_duration(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

/// Age thresholds (days) deciding whether a target needs a new capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessPolicy {
    pub freshness_threshold_days: f64,
    pub high_priority_threshold_days: f64,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            freshness_threshold_days: 7.0,
            high_priority_threshold_days: 14.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerCfg {
    /// Flat pause after each capture task.
    pub inter_task_delay_ms: u64,
    /// Operation name used as the alert key for captures.
    pub operation: String,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            inter_task_delay_ms: 2_000,
            operation: "snapshot_capture".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorCfg {
    pub window_secs: u64,
    pub warning_threshold: u32,
    pub critical_threshold: u32,
    pub resolve_threshold_secs: u64,
    pub health_check_interval_secs: u64,
    pub resolved_alert_max_age_secs: u64,
    /// Bound on a single alert-sink emission inside the capture path.
    pub sink_timeout_ms: u64,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            window_secs: 30 * 60,
            warning_threshold: 5,
            critical_threshold: 10,
            resolve_threshold_secs: 10 * 60,
            health_check_interval_secs: 5 * 60,
            resolved_alert_max_age_secs: 24 * 3600,
            sink_timeout_ms: 2_000,
        }
    }
}

/// Per-strategy override; absent fields keep the built-in descriptor values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyOverride {
    pub enabled: Option<bool>,
    pub min_failure_count: Option<u32>,
    pub time_window_ms: Option<u64>,
    pub consecutive_failures: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackCfg {
    /// Max audit records kept in memory.
    pub audit_capacity: usize,
    /// Keyed by strategy id (`cached-content`, `template-content`, ...).
    pub strategies: BTreeMap<String, StrategyOverride>,
}

impl Default for FallbackCfg {
    fn default() -> Self {
        Self {
            audit_capacity: 1_000,
            strategies: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub freshness: FreshnessPolicy,
    pub scheduler: SchedulerCfg,
    pub monitor: MonitorCfg,
    pub fallback: FallbackCfg,
}

impl RefreshConfig {
    /// Load from an explicit path. Format follows the extension (TOML or JSON).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading refresh config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::parse(&content, &ext)
    }

    /// Load using env var + fallbacks:
    /// 1) $REFRESH_CONFIG_PATH
    /// 2) config/refresh.toml
    /// 3) config/refresh.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        match resolve_config_path()? {
            Some(p) => Self::load_from(&p),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        let parsed = if hint_ext == "json" {
            serde_json::from_str::<RefreshConfig>(s).context("parsing JSON refresh config")?
        } else if hint_ext == "toml" {
            toml::from_str::<RefreshConfig>(s).context("parsing TOML refresh config")?
        } else {
            // No usable hint: TOML first, then JSON.
            match toml::from_str::<RefreshConfig>(s) {
                Ok(v) => v,
                Err(_) => serde_json::from_str::<RefreshConfig>(s)
                    .map_err(|_| anyhow!("unsupported refresh config format"))?,
            }
        };
        Ok(parsed.sanitized())
    }

    /// Clamp inconsistent values into a usable configuration.
    pub fn sanitized(mut self) -> Self {
        let f = &mut self.freshness;
        if !f.freshness_threshold_days.is_finite() || f.freshness_threshold_days < 0.0 {
            f.freshness_threshold_days = FreshnessPolicy::default().freshness_threshold_days;
        }
        if !f.high_priority_threshold_days.is_finite() || f.high_priority_threshold_days < 0.0 {
            f.high_priority_threshold_days =
                FreshnessPolicy::default().high_priority_threshold_days;
        }
        if f.freshness_threshold_days > f.high_priority_threshold_days {
            std::mem::swap(
                &mut f.freshness_threshold_days,
                &mut f.high_priority_threshold_days,
            );
        }

        let m = &mut self.monitor;
        m.warning_threshold = m.warning_threshold.max(1);
        m.critical_threshold = m.critical_threshold.max(m.warning_threshold);
        m.health_check_interval_secs = m.health_check_interval_secs.clamp(1, MAX_DURATION_SECS);
        m.window_secs = m.window_secs.min(MAX_DURATION_SECS);
        m.resolve_threshold_secs = m.resolve_threshold_secs.min(MAX_DURATION_SECS);
        m.resolved_alert_max_age_secs = m.resolved_alert_max_age_secs.min(MAX_DURATION_SECS);
        m.sink_timeout_ms = m.sink_timeout_ms.clamp(1, MAX_DURATION_SECS * 1_000);

        if self.scheduler.operation.trim().is_empty() {
            self.scheduler.operation = SchedulerCfg::default().operation;
        }
        self
    }
}

fn resolve_config_path() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return Ok(Some(pb));
        }
    }
    Ok(None)
}

/* ----------------------------
Shared handle + hot reload
---------------------------- */

/// Cheap-to-clone handle; readers always see a complete config.
#[derive(Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<RefreshConfig>>,
}

impl ConfigHandle {
    pub fn new(cfg: RefreshConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(cfg)),
        }
    }

    pub fn current(&self) -> RefreshConfig {
        self.inner.read().clone()
    }

    pub fn freshness(&self) -> FreshnessPolicy {
        self.inner.read().freshness
    }

    pub fn monitor(&self) -> MonitorCfg {
        self.inner.read().monitor
    }

    pub fn fallback(&self) -> FallbackCfg {
        self.inner.read().fallback.clone()
    }

    pub fn replace(&self, cfg: RefreshConfig) {
        *self.inner.write() = cfg.sanitized();
    }
}

/// Stops the reload thread on the next poll.
#[derive(Clone)]
pub struct HotReloadGuard {
    stop: Arc<AtomicBool>,
}

impl HotReloadGuard {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Poll `path` mtime every `poll` and swap a freshly parsed config into `handle`.
/// Parse errors keep the previous config.
pub fn start_hot_reload_thread(handle: ConfigHandle, path: PathBuf, poll: Duration) -> HotReloadGuard {
    let stop = Arc::new(AtomicBool::new(false));
    let guard = HotReloadGuard { stop: stop.clone() };

    thread::spawn(move || {
        let mut last_mtime: Option<SystemTime> = fs::metadata(&path).and_then(|m| m.modified()).ok();

        while !stop.load(Ordering::SeqCst) {
            thread::sleep(poll);
            let Ok(mtime) = fs::metadata(&path).and_then(|m| m.modified()) else {
                continue;
            };
            if last_mtime.is_some_and(|prev| mtime <= prev) {
                continue;
            }
            last_mtime = Some(mtime);
            match RefreshConfig::load_from(&path) {
                Ok(cfg) => {
                    handle.replace(cfg);
                    info!(target: "config", path = %path.display(), "refresh config reloaded");
                }
                Err(e) => warn!(target: "config", error = %format!("{e:#}"), "config reload failed; keeping previous"),
            }
        }
    });

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = RefreshConfig::parse(
            r#"
[freshness]
freshness_threshold_days = 3.0

[monitor]
warning_threshold = 2
"#,
            "toml",
        )
        .unwrap();
        assert_eq!(cfg.freshness.freshness_threshold_days, 3.0);
        assert_eq!(cfg.freshness.high_priority_threshold_days, 14.0);
        assert_eq!(cfg.monitor.warning_threshold, 2);
        assert_eq!(cfg.monitor.critical_threshold, 10);
        assert_eq!(cfg.scheduler.inter_task_delay_ms, 2_000);
    }

    #[test]
    fn inverted_thresholds_are_swapped() {
        let cfg = RefreshConfig::parse(
            r#"{"freshness": {"freshness_threshold_days": 20, "high_priority_threshold_days": 5},
                "monitor": {"warning_threshold": 8, "critical_threshold": 3}}"#,
            "json",
        )
        .unwrap();
        assert_eq!(cfg.freshness.freshness_threshold_days, 5.0);
        assert_eq!(cfg.freshness.high_priority_threshold_days, 20.0);
        assert_eq!(cfg.monitor.critical_threshold, 8);
    }

    #[test]
    fn strategy_overrides_parse() {
        let cfg = RefreshConfig::parse(
            r#"
[fallback.strategies.derived-content]
enabled = true
min_failure_count = 2
"#,
            "",
        )
        .unwrap();
        let o = &cfg.fallback.strategies["derived-content"];
        assert_eq!(o.enabled, Some(true));
        assert_eq!(o.min_failure_count, Some(2));
        assert_eq!(o.time_window_ms, None);
    }

    #[test]
    fn huge_durations_are_clamped() {
        let cfg = RefreshConfig::parse(
            r#"
[monitor]
window_secs = 100000000000000000
resolve_threshold_secs = 9223372036854775807
resolved_alert_max_age_secs = 9300000000000000
health_check_interval_secs = 100000000000000000
"#,
            "toml",
        )
        .unwrap();
        assert_eq!(cfg.monitor.window_secs, MAX_DURATION_SECS);
        assert_eq!(cfg.monitor.resolve_threshold_secs, MAX_DURATION_SECS);
        assert_eq!(cfg.monitor.resolved_alert_max_age_secs, MAX_DURATION_SECS);
        assert_eq!(cfg.monitor.health_check_interval_secs, MAX_DURATION_SECS);
    }

    #[test]
    fn duration_conversion_saturates() {
        assert_eq!(secs_to_duration(60), chrono::Duration::minutes(1));
        assert_eq!(secs_to_duration(u64::MAX), chrono::Duration::MAX);
        assert_eq!(secs_to_duration(100_000_000_000_000_000), chrono::Duration::MAX);
    }
}
