use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MonitorDefaults;
use crate::monitoring::classifier::normalize_status_codes;
use crate::monitoring::maintenance::{MaintenanceSchedule, is_in_maintenance_window};
use crate::monitoring::types::{CheckKind, MonitorStatus};

/// Monitor model - a configured service-health probe target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub icon_id: Option<String>,
    pub check_type: CheckKind,
    /// URL for http monitors, host:port for tcp, host for ping
    pub target: String,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    /// Consecutive down-classified checks before the official status flips
    pub retries: u32,
    pub degraded_threshold_ms: u64,
    /// Always a non-empty list of range strings like "200-299" or "301"
    pub expected_status_codes: Vec<String>,
    pub enabled: bool,
    /// Manual maintenance override; short-circuits the schedule
    pub maintenance: bool,
    /// Imported from an external monitoring system, not editable here
    pub read_only: bool,
    pub order_index: i64,
    pub notify_on_down: bool,
    pub notify_on_up: bool,
    pub notify_on_degraded: bool,
    pub maintenance_schedule: Option<MaintenanceSchedule>,
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    pub integration_uuid: Option<Uuid>,
    pub source_integration: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation request; unset probe settings fall back to configured defaults
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateMonitor {
    pub user_id: Uuid,
    pub name: String,
    pub check_type: CheckKind,
    pub target: String,
    pub icon_id: Option<String>,
    pub interval_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
    pub retries: Option<u32>,
    pub degraded_threshold_ms: Option<u64>,
    /// Comma-separated ranges, e.g. "200-299,301"
    pub expected_status_codes: Option<String>,
    pub maintenance_schedule: Option<MaintenanceSchedule>,
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    pub integration_uuid: Option<Uuid>,
    pub source_integration: Option<String>,
}

impl Monitor {
    pub fn from_request(request: CreateMonitor, defaults: &MonitorDefaults) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            user_id: request.user_id,
            name: request.name,
            icon_id: request.icon_id,
            check_type: request.check_type,
            target: request.target,
            interval_seconds: request.interval_seconds.unwrap_or(defaults.interval_seconds),
            timeout_seconds: request.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            retries: request.retries.unwrap_or(defaults.retries),
            degraded_threshold_ms: request
                .degraded_threshold_ms
                .unwrap_or(defaults.degraded_threshold_ms),
            expected_status_codes: normalize_status_codes(
                request.expected_status_codes.as_deref().unwrap_or(""),
            ),
            enabled: true,
            maintenance: false,
            read_only: request.external_id.is_some(),
            order_index: 0,
            notify_on_down: true,
            notify_on_up: true,
            notify_on_degraded: false,
            maintenance_schedule: request.maintenance_schedule,
            external_id: request.external_id,
            external_url: request.external_url,
            integration_uuid: request.integration_uuid,
            source_integration: request.source_integration,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update; untouched fields keep their values.
    pub fn apply_patch(&mut self, patch: MonitorPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(icon_id) = patch.icon_id {
            self.icon_id = icon_id;
        }
        if let Some(target) = patch.target {
            self.target = target;
        }
        if let Some(interval) = patch.interval_seconds {
            self.interval_seconds = interval;
        }
        if let Some(timeout) = patch.timeout_seconds {
            self.timeout_seconds = timeout;
        }
        if let Some(retries) = patch.retries {
            self.retries = retries;
        }
        if let Some(threshold) = patch.degraded_threshold_ms {
            self.degraded_threshold_ms = threshold;
        }
        if let Some(codes) = patch.expected_status_codes {
            self.expected_status_codes = normalize_status_codes(&codes);
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(order_index) = patch.order_index {
            self.order_index = order_index;
        }
        if let Some(notify_on_down) = patch.notify_on_down {
            self.notify_on_down = notify_on_down;
        }
        if let Some(notify_on_up) = patch.notify_on_up {
            self.notify_on_up = notify_on_up;
        }
        if let Some(notify_on_degraded) = patch.notify_on_degraded {
            self.notify_on_degraded = notify_on_degraded;
        }
        if let Some(schedule) = patch.maintenance_schedule {
            self.maintenance_schedule = schedule;
        }
        self.updated_at = Utc::now();
    }

    /// Whether checks are currently suppressed, either by the manual flag or
    /// by the recurring schedule.
    pub fn maintenance_active(&self, now: DateTime<Utc>) -> bool {
        if self.maintenance {
            return true;
        }
        self.maintenance_schedule
            .as_ref()
            .map(|schedule| is_in_maintenance_window(schedule, now))
            .unwrap_or(false)
    }
}

/// Partial-field monitor update. `None` leaves a field untouched; the
/// double-Option fields distinguish "unset" from "clear".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorPatch {
    pub name: Option<String>,
    pub icon_id: Option<Option<String>>,
    pub target: Option<String>,
    pub interval_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
    pub retries: Option<u32>,
    pub degraded_threshold_ms: Option<u64>,
    pub expected_status_codes: Option<String>,
    pub enabled: Option<bool>,
    pub order_index: Option<i64>,
    pub notify_on_down: Option<bool>,
    pub notify_on_up: Option<bool>,
    pub notify_on_degraded: Option<bool>,
    pub maintenance_schedule: Option<Option<MaintenanceSchedule>>,
}

/// HistoryEntry model - one row per completed probe cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Option<i64>,
    pub monitor_uuid: Uuid,
    pub status: MonitorStatus,
    pub latency_ms: Option<u64>,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Hourly rollup of check counts and average latency, one row per
/// (monitor, calendar hour).
///
/// Invariant: checks_total = checks_up + checks_degraded + checks_down.
/// Maintenance ticks are tracked separately and never counted in the total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyAggregate {
    pub monitor_uuid: Uuid,
    pub hour_start: DateTime<Utc>,
    pub checks_total: i64,
    pub checks_up: i64,
    pub checks_degraded: i64,
    pub checks_down: i64,
    pub checks_maintenance: i64,
    /// Number of checks that contributed a latency sample; keeps the running
    /// mean exact under concurrent upserts
    pub latency_samples: i64,
    /// Running mean over non-null latencies, rounded to whole milliseconds
    pub avg_response_ms: Option<i64>,
}

/// Truncate a timestamp to the start of its calendar hour
pub fn hour_start(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// MonitorShare model - grants a non-owner visibility and optional
/// notification delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorShare {
    pub monitor_uuid: Uuid,
    pub user_id: Uuid,
    pub notify: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn defaults() -> MonitorDefaults {
        MonitorDefaults {
            interval_seconds: 60,
            timeout_seconds: 10,
            retries: 3,
            degraded_threshold_ms: 2000,
        }
    }

    fn request(name: &str) -> CreateMonitor {
        CreateMonitor {
            user_id: Uuid::new_v4(),
            name: name.into(),
            check_type: CheckKind::Http,
            target: "http://plex.local:32400/identity".into(),
            ..CreateMonitor::default()
        }
    }

    #[test]
    fn creation_falls_back_to_defaults() {
        let monitor = Monitor::from_request(request("plex"), &defaults());
        assert_eq!(monitor.interval_seconds, 60);
        assert_eq!(monitor.timeout_seconds, 10);
        assert_eq!(monitor.retries, 3);
        assert_eq!(monitor.degraded_threshold_ms, 2000);
        assert_eq!(monitor.expected_status_codes, vec!["200-299"]);
        assert!(monitor.enabled);
        assert!(!monitor.read_only);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let mut req = request("sonarr");
        req.interval_seconds = Some(30);
        req.expected_status_codes = Some("200-299,301".into());

        let monitor = Monitor::from_request(req, &defaults());
        assert_eq!(monitor.interval_seconds, 30);
        assert_eq!(monitor.expected_status_codes, vec!["200-299", "301"]);
    }

    #[test]
    fn imported_monitors_are_read_only() {
        let mut req = request("kuma-import");
        req.external_id = Some("42".into());
        let monitor = Monitor::from_request(req, &defaults());
        assert!(monitor.read_only);
    }

    #[test]
    fn patch_normalizes_status_codes_like_create() {
        let mut monitor = Monitor::from_request(request("plex"), &defaults());
        monitor.apply_patch(MonitorPatch {
            expected_status_codes: Some("200-299,301".into()),
            ..MonitorPatch::default()
        });
        assert_eq!(monitor.expected_status_codes, vec!["200-299", "301"]);
    }

    #[test]
    fn patch_leaves_unset_fields_untouched() {
        let mut monitor = Monitor::from_request(request("plex"), &defaults());
        let name = monitor.name.clone();
        monitor.apply_patch(MonitorPatch {
            retries: Some(5),
            enabled: Some(false),
            ..MonitorPatch::default()
        });
        assert_eq!(monitor.name, name);
        assert_eq!(monitor.retries, 5);
        assert!(!monitor.enabled);
    }

    #[test]
    fn manual_flag_short_circuits_maintenance() {
        let mut monitor = Monitor::from_request(request("plex"), &defaults());
        assert!(!monitor.maintenance_active(Utc::now()));
        monitor.maintenance = true;
        assert!(monitor.maintenance_active(Utc::now()));
    }

    #[test]
    fn hour_start_truncates() {
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 14, 35, 17).unwrap();
        assert_eq!(hour_start(at), Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap());
    }
}
