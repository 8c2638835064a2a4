// src/lib.rs
// Public library surface for integration tests and the demo binary.

pub mod clock;
pub mod config;
pub mod error;
pub mod freshness;
pub mod target;

// Scheduling + failure tracking
pub mod monitor;
pub mod scheduler;

// Degraded content
pub mod fallback;

// Health rollup, sinks, wiring
pub mod context;
pub mod notify;
pub mod stats;

// ---- Re-exports for stable public API ----
pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use crate::config::{ConfigHandle, FreshnessPolicy, RefreshConfig};
pub use crate::context::{RefreshContext, RefreshOutcome, ReportInput, TargetReport};
pub use crate::error::{CollectionError, ErrorClass, MonitoringError};
pub use crate::fallback::{FallbackContent, FallbackOutcome, FallbackService, StrategyKind};
pub use crate::freshness::{FreshnessDecision, Priority};
pub use crate::monitor::{FailureAlert, FailureMonitor, Severity, SystemHealth};
pub use crate::notify::{AlertSink, SinkMux};
pub use crate::scheduler::{SchedulerRunResult, TaskScheduler};
pub use crate::stats::{HealthCheckHandle, StatsAggregator, StatsReport};
pub use crate::target::{CollectionTarget, Snapshot, SnapshotStore, TargetKind};
