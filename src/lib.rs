//! Service health monitoring for self-hosted dashboards.
//!
//! Probes HTTP, TCP and ping targets on per-monitor schedules, classifies
//! results into up/degraded/down with retry hysteresis and maintenance
//! windows, persists history plus hourly aggregates with retention pruning,
//! and dispatches notifications on official status transitions.
//!
//! The shipped binary runs standalone with log-based notifications; a host
//! application embeds the same engine by implementing the `NotificationSink`,
//! `TopicPublisher` and `PreferenceResolver` traits.

pub mod config;
pub mod logging;
pub mod monitoring;
pub mod pool;
pub mod retention;
pub mod storage;
pub mod validation;
