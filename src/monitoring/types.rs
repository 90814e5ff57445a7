use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Semantic status of a monitored service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Degraded,
    /// No check has completed yet (fresh or reconfigured monitor)
    Pending,
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Down => write!(f, "down"),
            MonitorStatus::Degraded => write!(f, "degraded"),
            MonitorStatus::Pending => write!(f, "pending"),
        }
    }
}

impl std::str::FromStr for MonitorStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(MonitorStatus::Up),
            "down" => Ok(MonitorStatus::Down),
            "degraded" => Ok(MonitorStatus::Degraded),
            "pending" => Ok(MonitorStatus::Pending),
            other => Err(anyhow::anyhow!("unknown monitor status: {}", other)),
        }
    }
}

/// Protocol used to probe a monitor target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    #[default]
    Http,
    Tcp,
    Ping,
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::Http => write!(f, "http"),
            CheckKind::Tcp => write!(f, "tcp"),
            CheckKind::Ping => write!(f, "ping"),
        }
    }
}

impl std::str::FromStr for CheckKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" | "https" => Ok(CheckKind::Http),
            "tcp" => Ok(CheckKind::Tcp),
            "ping" => Ok(CheckKind::Ping),
            other => Err(anyhow::anyhow!("unknown check type: {}", other)),
        }
    }
}

/// Raw result of a single probe, before classification.
///
/// A probe never fails as such: connection errors, DNS failures and timeouts
/// are captured in `error` with `latency_ms` left unset.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub latency_ms: Option<u64>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn success(latency_ms: u64, status_code: Option<u16>) -> Self {
        Self { latency_ms: Some(latency_ms), status_code, error: None }
    }

    pub fn failure(error: String) -> Self {
        Self { latency_ms: None, status_code: None, error: Some(error) }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Classified result of one completed check cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: MonitorStatus,
    pub latency_ms: Option<u64>,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn from_outcome(
        outcome: ProbeOutcome,
        status: MonitorStatus,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            latency_ms: outcome.latency_ms,
            status_code: outcome.status_code,
            error_message: outcome.error,
            checked_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_display() {
        for status in [
            MonitorStatus::Up,
            MonitorStatus::Down,
            MonitorStatus::Degraded,
            MonitorStatus::Pending,
        ] {
            let parsed: MonitorStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn check_kind_accepts_https_alias() {
        assert_eq!("https".parse::<CheckKind>().unwrap(), CheckKind::Http);
        assert!("smtp".parse::<CheckKind>().is_err());
    }

    #[test]
    fn failure_outcome_has_no_latency() {
        let outcome = ProbeOutcome::failure("connection refused".into());
        assert!(outcome.is_failure());
        assert!(outcome.latency_ms.is_none());
        assert!(outcome.status_code.is_none());
    }
}
