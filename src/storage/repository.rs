use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use uuid::Uuid;

use super::migrations;
use super::models::{HistoryEntry, HourlyAggregate, Monitor, MonitorShare, hour_start};
use crate::monitoring::types::{CheckResult, MonitorStatus};
use crate::pool::{LibsqlManager, LibsqlPool};

const MONITOR_COLUMNS: &str = "id, uuid, user_id, name, icon_id, check_type, target, \
     interval_seconds, timeout_seconds, retries, degraded_threshold_ms, \
     expected_status_codes, enabled, maintenance, read_only, order_index, \
     notify_on_down, notify_on_up, notify_on_degraded, maintenance_schedule, \
     external_id, external_url, integration_uuid, source_integration, \
     created_at, updated_at";

/// Storage trait consumed by the scheduler and dispatcher.
///
/// All operations are async and fail with a generic error the callers treat
/// as non-fatal-but-logged: one lost write must not stop the scheduler.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_monitor(&self, monitor: &Monitor) -> Result<i64>;

    async fn get_monitor_by_uuid(&self, uuid: Uuid) -> Result<Option<Monitor>>;

    async fn get_enabled_monitors(&self) -> Result<Vec<Monitor>>;

    async fn update_monitor(&self, monitor: &Monitor) -> Result<()>;

    /// Deletes the monitor and, via cascade, its history/aggregates/shares
    async fn delete_monitor(&self, uuid: Uuid) -> Result<()>;

    async fn set_monitor_maintenance(&self, uuid: Uuid, maintenance: bool) -> Result<()>;

    /// Insert one history row and fold the result into the current hour's
    /// aggregate, atomically
    async fn record_check(&self, monitor_uuid: Uuid, result: &CheckResult) -> Result<()>;

    /// Bump only the maintenance counter on the hour's aggregate; writes no
    /// history row
    async fn record_maintenance_tick(&self, monitor_uuid: Uuid, at: DateTime<Utc>) -> Result<()>;

    async fn get_recent_checks(&self, monitor_uuid: Uuid, limit: usize)
    -> Result<Vec<HistoryEntry>>;

    async fn get_check_history(
        &self,
        monitor_uuid: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>>;

    /// Delete history older than the cutoff; returns rows deleted
    async fn prune_old_history(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn get_hourly_aggregates(
        &self,
        monitor_uuid: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<HourlyAggregate>>;

    /// Delete aggregates older than the cutoff; returns rows deleted
    async fn prune_old_aggregates(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn get_monitor_shares(&self, monitor_uuid: Uuid) -> Result<Vec<MonitorShare>>;

    async fn upsert_monitor_share(&self, share: &MonitorShare) -> Result<()>;
}

/// Libsql-backed storage implementation
pub struct LibsqlStorage {
    pool: LibsqlPool,
}

impl LibsqlStorage {
    /// Open (or create) a local database, run migrations and build the pool
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let database = libsql::Builder::new_local(path.as_ref()).build().await?;

        let conn = database.connect()?;
        migrations::run_migrations(&conn).await?;

        let pool = LibsqlPool::builder(LibsqlManager::new(database)).build()?;
        Ok(Self { pool })
    }

    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let uuid_str: String = row.get(1)?;
    let user_id_str: String = row.get(2)?;
    let check_type: String = row.get(5)?;
    let expected_codes: String = row.get(11)?;
    let schedule: Option<String> = row.get(19)?;
    let integration_uuid: Option<String> = row.get(22)?;

    Ok(Monitor {
        id: Some(row.get(0)?),
        uuid: Uuid::parse_str(&uuid_str)?,
        user_id: Uuid::parse_str(&user_id_str)?,
        name: row.get(3)?,
        icon_id: row.get(4)?,
        check_type: check_type.parse()?,
        target: row.get(6)?,
        interval_seconds: row.get::<i64>(7)? as u64,
        timeout_seconds: row.get::<i64>(8)? as u64,
        retries: row.get::<i64>(9)? as u32,
        degraded_threshold_ms: row.get::<i64>(10)? as u64,
        expected_status_codes: serde_json::from_str(&expected_codes)?,
        enabled: row.get::<i64>(12)? != 0,
        maintenance: row.get::<i64>(13)? != 0,
        read_only: row.get::<i64>(14)? != 0,
        order_index: row.get(15)?,
        notify_on_down: row.get::<i64>(16)? != 0,
        notify_on_up: row.get::<i64>(17)? != 0,
        notify_on_degraded: row.get::<i64>(18)? != 0,
        maintenance_schedule: schedule.map(|s| serde_json::from_str(&s)).transpose()?,
        external_id: row.get(20)?,
        external_url: row.get(21)?,
        integration_uuid: integration_uuid.map(|s| Uuid::parse_str(&s)).transpose()?,
        source_integration: row.get(23)?,
        created_at: timestamp_from_i64(row.get(24)?),
        updated_at: timestamp_from_i64(row.get(25)?),
    })
}

fn history_from_row(row: &Row) -> Result<HistoryEntry> {
    let monitor_uuid: String = row.get(1)?;
    let status: String = row.get(2)?;

    Ok(HistoryEntry {
        id: Some(row.get(0)?),
        monitor_uuid: Uuid::parse_str(&monitor_uuid)?,
        status: status.parse()?,
        latency_ms: row.get::<Option<i64>>(3)?.map(|v| v as u64),
        status_code: row.get::<Option<i64>>(4)?.map(|v| v as u16),
        error_message: row.get(5)?,
        checked_at: timestamp_from_i64(row.get(6)?),
    })
}

fn timestamp_from_i64(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or_default()
}

#[async_trait]
impl Storage for LibsqlStorage {
    async fn create_monitor(&self, monitor: &Monitor) -> Result<i64> {
        let conn = self.get_conn().await?;

        let schedule = monitor
            .maintenance_schedule
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            "INSERT INTO monitors (uuid, user_id, name, icon_id, check_type, target, \
             interval_seconds, timeout_seconds, retries, degraded_threshold_ms, \
             expected_status_codes, enabled, maintenance, read_only, order_index, \
             notify_on_down, notify_on_up, notify_on_degraded, maintenance_schedule, \
             external_id, external_url, integration_uuid, source_integration, \
             created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                monitor.uuid.to_string(),
                monitor.user_id.to_string(),
                monitor.name.clone(),
                monitor.icon_id.clone(),
                monitor.check_type.to_string(),
                monitor.target.clone(),
                monitor.interval_seconds as i64,
                monitor.timeout_seconds as i64,
                monitor.retries as i64,
                monitor.degraded_threshold_ms as i64,
                serde_json::to_string(&monitor.expected_status_codes)?,
                monitor.enabled as i64,
                monitor.maintenance as i64,
                monitor.read_only as i64,
                monitor.order_index,
                monitor.notify_on_down as i64,
                monitor.notify_on_up as i64,
                monitor.notify_on_degraded as i64,
                schedule,
                monitor.external_id.clone(),
                monitor.external_url.clone(),
                monitor.integration_uuid.map(|u| u.to_string()),
                monitor.source_integration.clone(),
                monitor.created_at.timestamp(),
                monitor.updated_at.timestamp()
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn get_monitor_by_uuid(&self, uuid: Uuid) -> Result<Option<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM monitors WHERE uuid = ?", MONITOR_COLUMNS),
                params![uuid.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(monitor_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_enabled_monitors(&self) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM monitors WHERE enabled = 1 ORDER BY order_index",
                    MONITOR_COLUMNS
                ),
                (),
            )
            .await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<()> {
        let conn = self.get_conn().await?;

        let schedule = monitor
            .maintenance_schedule
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            "UPDATE monitors SET user_id = ?, name = ?, icon_id = ?, check_type = ?, \
             target = ?, interval_seconds = ?, timeout_seconds = ?, retries = ?, \
             degraded_threshold_ms = ?, expected_status_codes = ?, enabled = ?, \
             maintenance = ?, read_only = ?, order_index = ?, notify_on_down = ?, \
             notify_on_up = ?, notify_on_degraded = ?, maintenance_schedule = ?, \
             external_id = ?, external_url = ?, integration_uuid = ?, \
             source_integration = ?, updated_at = ? WHERE uuid = ?",
            params![
                monitor.user_id.to_string(),
                monitor.name.clone(),
                monitor.icon_id.clone(),
                monitor.check_type.to_string(),
                monitor.target.clone(),
                monitor.interval_seconds as i64,
                monitor.timeout_seconds as i64,
                monitor.retries as i64,
                monitor.degraded_threshold_ms as i64,
                serde_json::to_string(&monitor.expected_status_codes)?,
                monitor.enabled as i64,
                monitor.maintenance as i64,
                monitor.read_only as i64,
                monitor.order_index,
                monitor.notify_on_down as i64,
                monitor.notify_on_up as i64,
                monitor.notify_on_degraded as i64,
                schedule,
                monitor.external_id.clone(),
                monitor.external_url.clone(),
                monitor.integration_uuid.map(|u| u.to_string()),
                monitor.source_integration.clone(),
                monitor.updated_at.timestamp(),
                monitor.uuid.to_string()
            ],
        )
        .await?;

        Ok(())
    }

    async fn delete_monitor(&self, uuid: Uuid) -> Result<()> {
        let conn = self.get_conn().await?;

        // Dependent history/aggregate/share rows go via ON DELETE CASCADE
        conn.execute("DELETE FROM monitors WHERE uuid = ?", params![uuid.to_string()]).await?;
        Ok(())
    }

    async fn set_monitor_maintenance(&self, uuid: Uuid, maintenance: bool) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET maintenance = ?, updated_at = ? WHERE uuid = ?",
            params![maintenance as i64, Utc::now().timestamp(), uuid.to_string()],
        )
        .await?;
        Ok(())
    }

    async fn record_check(&self, monitor_uuid: Uuid, result: &CheckResult) -> Result<()> {
        let conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        tx.execute(
            "INSERT INTO monitor_history \
             (monitor_uuid, status, latency_ms, status_code, error_message, checked_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                monitor_uuid.to_string(),
                result.status.to_string(),
                result.latency_ms.map(|v| v as i64),
                result.status_code.map(|v| v as i64),
                result.error_message.clone(),
                result.checked_at.timestamp()
            ],
        )
        .await?;

        let (up, degraded, down) = match result.status {
            MonitorStatus::Up => (1i64, 0i64, 0i64),
            MonitorStatus::Degraded => (0, 1, 0),
            _ => (0, 0, 1),
        };
        let latency = result.latency_ms.map(|v| v as i64);
        let latency_sample = latency.is_some() as i64;

        // Single-statement upsert: the SET expressions read the pre-update
        // row, so the weighted mean stays exact under concurrent increments.
        tx.execute(
            "INSERT INTO monitor_aggregates \
             (monitor_uuid, hour_start, checks_total, checks_up, checks_degraded, \
              checks_down, checks_maintenance, latency_samples, avg_response_ms) \
             VALUES (?, ?, 1, ?, ?, ?, 0, ?, ?) \
             ON CONFLICT(monitor_uuid, hour_start) DO UPDATE SET \
                 checks_total = checks_total + 1, \
                 checks_up = checks_up + excluded.checks_up, \
                 checks_degraded = checks_degraded + excluded.checks_degraded, \
                 checks_down = checks_down + excluded.checks_down, \
                 avg_response_ms = CASE \
                     WHEN excluded.latency_samples = 0 THEN avg_response_ms \
                     ELSE CAST(ROUND( \
                         (COALESCE(avg_response_ms, 0) * latency_samples \
                          + excluded.avg_response_ms) \
                         / (latency_samples + 1.0)) AS INTEGER) \
                 END, \
                 latency_samples = latency_samples + excluded.latency_samples",
            params![
                monitor_uuid.to_string(),
                hour_start(result.checked_at).timestamp(),
                up,
                degraded,
                down,
                latency_sample,
                latency
            ],
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_maintenance_tick(&self, monitor_uuid: Uuid, at: DateTime<Utc>) -> Result<()> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO monitor_aggregates \
             (monitor_uuid, hour_start, checks_total, checks_up, checks_degraded, \
              checks_down, checks_maintenance, latency_samples, avg_response_ms) \
             VALUES (?, ?, 0, 0, 0, 0, 1, 0, NULL) \
             ON CONFLICT(monitor_uuid, hour_start) DO UPDATE SET \
                 checks_maintenance = checks_maintenance + 1",
            params![monitor_uuid.to_string(), hour_start(at).timestamp()],
        )
        .await?;

        Ok(())
    }

    async fn get_recent_checks(
        &self,
        monitor_uuid: Uuid,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, monitor_uuid, status, latency_ms, status_code, error_message, \
                 checked_at FROM monitor_history WHERE monitor_uuid = ? \
                 ORDER BY checked_at DESC LIMIT ?",
                params![monitor_uuid.to_string(), limit as i64],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(history_from_row(&row)?);
        }
        Ok(entries)
    }

    async fn get_check_history(
        &self,
        monitor_uuid: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, monitor_uuid, status, latency_ms, status_code, error_message, \
                 checked_at FROM monitor_history \
                 WHERE monitor_uuid = ? AND checked_at >= ? ORDER BY checked_at ASC",
                params![monitor_uuid.to_string(), since.timestamp()],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(history_from_row(&row)?);
        }
        Ok(entries)
    }

    async fn prune_old_history(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM monitor_history WHERE checked_at < ?", params![
                cutoff.timestamp()
            ])
            .await?;
        Ok(deleted)
    }

    async fn get_hourly_aggregates(
        &self,
        monitor_uuid: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<HourlyAggregate>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT monitor_uuid, hour_start, checks_total, checks_up, checks_degraded, \
                 checks_down, checks_maintenance, latency_samples, avg_response_ms \
                 FROM monitor_aggregates \
                 WHERE monitor_uuid = ? AND hour_start >= ? ORDER BY hour_start ASC",
                params![monitor_uuid.to_string(), since.timestamp()],
            )
            .await?;

        let mut aggregates = Vec::new();
        while let Some(row) = rows.next().await? {
            let uuid_str: String = row.get(0)?;
            aggregates.push(HourlyAggregate {
                monitor_uuid: Uuid::parse_str(&uuid_str)?,
                hour_start: timestamp_from_i64(row.get(1)?),
                checks_total: row.get(2)?,
                checks_up: row.get(3)?,
                checks_degraded: row.get(4)?,
                checks_down: row.get(5)?,
                checks_maintenance: row.get(6)?,
                latency_samples: row.get(7)?,
                avg_response_ms: row.get(8)?,
            });
        }
        Ok(aggregates)
    }

    async fn prune_old_aggregates(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM monitor_aggregates WHERE hour_start < ?", params![
                cutoff.timestamp()
            ])
            .await?;
        Ok(deleted)
    }

    async fn get_monitor_shares(&self, monitor_uuid: Uuid) -> Result<Vec<MonitorShare>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT monitor_uuid, user_id, notify FROM monitor_shares WHERE monitor_uuid = ?",
                params![monitor_uuid.to_string()],
            )
            .await?;

        let mut shares = Vec::new();
        while let Some(row) = rows.next().await? {
            let uuid_str: String = row.get(0)?;
            let user_id_str: String = row.get(1)?;
            shares.push(MonitorShare {
                monitor_uuid: Uuid::parse_str(&uuid_str)?,
                user_id: Uuid::parse_str(&user_id_str)?,
                notify: row.get::<i64>(2)? != 0,
            });
        }
        Ok(shares)
    }

    async fn upsert_monitor_share(&self, share: &MonitorShare) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO monitor_shares (monitor_uuid, user_id, notify) VALUES (?, ?, ?) \
             ON CONFLICT(monitor_uuid, user_id) DO UPDATE SET notify = excluded.notify",
            params![
                share.monitor_uuid.to_string(),
                share.user_id.to_string(),
                share.notify as i64
            ],
        )
        .await?;
        Ok(())
    }
}
