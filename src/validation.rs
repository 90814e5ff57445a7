//! Monitor configuration validation, run before a monitor is created or
//! updated so the scheduler only ever sees well-formed definitions.
//! Private and LAN addresses are deliberately allowed; monitoring services
//! on the local network is the primary use case.

use thiserror::Error;
use url::Url;

use crate::monitoring::classifier::parse_code_range;
use crate::monitoring::types::CheckKind;
use crate::storage::models::Monitor;

pub const MIN_INTERVAL_SECONDS: u64 = 10;
pub const MAX_INTERVAL_SECONDS: u64 = 86_400;
pub const MIN_TIMEOUT_SECONDS: u64 = 1;
pub const MAX_TIMEOUT_SECONDS: u64 = 300;
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("monitor name cannot be empty")]
    EmptyName,
    #[error("target cannot be empty")]
    EmptyTarget,
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid scheme '{0}', must be http or https")]
    InvalidScheme(String),
    #[error("URL must have a valid host")]
    MissingHost,
    #[error("TCP target must be in format 'host:port'")]
    InvalidTcpTarget,
    #[error("invalid port number")]
    InvalidPort,
    #[error("interval must be between {MIN_INTERVAL_SECONDS} and {MAX_INTERVAL_SECONDS} seconds, got {0}")]
    IntervalOutOfRange(u64),
    #[error("timeout must be between {MIN_TIMEOUT_SECONDS} and {MAX_TIMEOUT_SECONDS} seconds, got {0}")]
    TimeoutOutOfRange(u64),
    #[error("timeout ({timeout}s) must be shorter than the interval ({interval}s)")]
    TimeoutExceedsInterval { timeout: u64, interval: u64 },
    #[error("retries must be between 1 and {MAX_RETRIES}, got {0}")]
    RetriesOutOfRange(u32),
    #[error("degraded threshold must be greater than zero")]
    ZeroDegradedThreshold,
    #[error("invalid status code range '{0}'")]
    InvalidStatusCodeRange(String),
}

/// Validate a full monitor definition
pub fn validate_monitor(monitor: &Monitor) -> Result<(), ValidationError> {
    if monitor.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }

    validate_target(monitor.check_type, &monitor.target)?;

    if !(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&monitor.interval_seconds) {
        return Err(ValidationError::IntervalOutOfRange(monitor.interval_seconds));
    }
    if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&monitor.timeout_seconds) {
        return Err(ValidationError::TimeoutOutOfRange(monitor.timeout_seconds));
    }
    if monitor.timeout_seconds >= monitor.interval_seconds {
        return Err(ValidationError::TimeoutExceedsInterval {
            timeout: monitor.timeout_seconds,
            interval: monitor.interval_seconds,
        });
    }
    if monitor.retries == 0 || monitor.retries > MAX_RETRIES {
        return Err(ValidationError::RetriesOutOfRange(monitor.retries));
    }
    if monitor.degraded_threshold_ms == 0 {
        return Err(ValidationError::ZeroDegradedThreshold);
    }

    for range in &monitor.expected_status_codes {
        if parse_code_range(range).is_none() {
            return Err(ValidationError::InvalidStatusCodeRange(range.clone()));
        }
    }

    Ok(())
}

/// Validate the probe target for the given check kind
pub fn validate_target(kind: CheckKind, target: &str) -> Result<(), ValidationError> {
    if target.trim().is_empty() {
        return Err(ValidationError::EmptyTarget);
    }

    match kind {
        CheckKind::Http => validate_http_target(target),
        CheckKind::Tcp => validate_tcp_target(target),
        CheckKind::Ping => validate_ping_target(target),
    }
}

fn validate_http_target(target: &str) -> Result<(), ValidationError> {
    let url = Url::parse(target).map_err(|e| {
        if !target.contains("://") {
            ValidationError::InvalidUrl("URL must include scheme (http:// or https://)".into())
        } else {
            ValidationError::InvalidUrl(e.to_string())
        }
    })?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ValidationError::InvalidScheme(scheme.to_string()));
    }
    if url.host_str().is_none() {
        return Err(ValidationError::MissingHost);
    }

    Ok(())
}

fn validate_tcp_target(target: &str) -> Result<(), ValidationError> {
    // host:port, where host may itself contain colons for IPv6 brackets
    let (host, port) = target.rsplit_once(':').ok_or(ValidationError::InvalidTcpTarget)?;

    if host.trim().is_empty() {
        return Err(ValidationError::InvalidTcpTarget);
    }

    match port.parse::<u16>() {
        Ok(port) if port > 0 => Ok(()),
        _ => Err(ValidationError::InvalidPort),
    }
}

fn validate_ping_target(target: &str) -> Result<(), ValidationError> {
    // Ping accepts any hostname or IP, but never something with a scheme
    // or whitespace (the target is passed to the ping binary as one arg)
    if target.contains("://") {
        return Err(ValidationError::InvalidUrl(
            "ping target must be a bare hostname or IP".into(),
        ));
    }
    if target.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidUrl("ping target cannot contain whitespace".into()));
    }
    Ok(())
}
