use anyhow::Result;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Run database migrations.
///
/// Single source of truth for the schema; safe to call on every startup.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Initial monitor, history, aggregate and share tables").await?;
    }

    tracing::info!("Database migrations completed (now at version {})", SCHEMA_VERSION);
    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: monitors, monitor_history, monitor_aggregates,
/// monitor_shares. Structured fields (expected status codes, maintenance
/// schedule) are stored as JSON text columns.
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            icon_id TEXT,
            check_type TEXT NOT NULL,
            target TEXT NOT NULL,
            interval_seconds INTEGER NOT NULL DEFAULT 60,
            timeout_seconds INTEGER NOT NULL DEFAULT 10,
            retries INTEGER NOT NULL DEFAULT 3,
            degraded_threshold_ms INTEGER NOT NULL DEFAULT 2000,
            expected_status_codes TEXT NOT NULL DEFAULT '[\"200-299\"]',
            enabled INTEGER NOT NULL DEFAULT 1,
            maintenance INTEGER NOT NULL DEFAULT 0,
            read_only INTEGER NOT NULL DEFAULT 0,
            order_index INTEGER NOT NULL DEFAULT 0,
            notify_on_down INTEGER NOT NULL DEFAULT 1,
            notify_on_up INTEGER NOT NULL DEFAULT 1,
            notify_on_degraded INTEGER NOT NULL DEFAULT 0,
            maintenance_schedule TEXT,
            external_id TEXT,
            external_url TEXT,
            integration_uuid TEXT,
            source_integration TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitor_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            monitor_uuid TEXT NOT NULL,
            status TEXT NOT NULL,
            latency_ms INTEGER,
            status_code INTEGER,
            error_message TEXT,
            checked_at INTEGER NOT NULL,
            FOREIGN KEY (monitor_uuid) REFERENCES monitors(uuid) ON DELETE CASCADE
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitor_aggregates (
            monitor_uuid TEXT NOT NULL,
            hour_start INTEGER NOT NULL,
            checks_total INTEGER NOT NULL DEFAULT 0,
            checks_up INTEGER NOT NULL DEFAULT 0,
            checks_degraded INTEGER NOT NULL DEFAULT 0,
            checks_down INTEGER NOT NULL DEFAULT 0,
            checks_maintenance INTEGER NOT NULL DEFAULT 0,
            latency_samples INTEGER NOT NULL DEFAULT 0,
            avg_response_ms INTEGER,
            PRIMARY KEY (monitor_uuid, hour_start),
            FOREIGN KEY (monitor_uuid) REFERENCES monitors(uuid) ON DELETE CASCADE
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitor_shares (
            monitor_uuid TEXT NOT NULL,
            user_id TEXT NOT NULL,
            notify INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (monitor_uuid, user_id),
            FOREIGN KEY (monitor_uuid) REFERENCES monitors(uuid) ON DELETE CASCADE
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_monitors_uuid ON monitors(uuid)", ()).await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_monitors_enabled ON monitors(enabled)", ())
        .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_monitor_history_monitor_checked
         ON monitor_history(monitor_uuid, checked_at DESC)",
        (),
    )
    .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_monitor_history_checked_at
         ON monitor_history(checked_at)",
        (),
    )
    .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_monitor_aggregates_hour
         ON monitor_aggregates(hour_start)",
        (),
    )
    .await?;

    Ok(())
}
