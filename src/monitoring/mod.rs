/// Monitoring engine module - handles execution of monitoring checks
///
/// This module is responsible for:
/// - Executing HTTP/TCP/ping probes
/// - Classifying probe outcomes into up/degraded/down
/// - Applying retry hysteresis and maintenance windows
/// - Scheduling per-monitor check loops
/// - Dispatching notifications on official status transitions
pub mod checker;
pub mod classifier;
pub mod executor;
pub mod hysteresis;
pub mod maintenance;
pub mod notifier;
pub mod scheduler;
pub mod types;

pub use executor::ProbeExecutor;
pub use notifier::NotificationDispatcher;
pub use scheduler::MonitorScheduler;
pub use types::{CheckResult, MonitorStatus};
