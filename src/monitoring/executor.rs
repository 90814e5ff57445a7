use anyhow::Result;
use std::sync::Arc;

use super::checker::{Checker, HttpChecker, PingChecker, TcpChecker};
use super::types::{CheckKind, ProbeOutcome};
use crate::storage::models::Monitor;

/// Executes individual probes against a monitor's target.
///
/// One executor is built per live monitor so the HTTP client carries that
/// monitor's timeout. `probe` never returns an error: all failure modes end
/// up in the outcome's `error` field for the classifier to judge.
pub struct ProbeExecutor {
    http_checker: Arc<HttpChecker>,
    tcp_checker: Arc<TcpChecker>,
    ping_checker: Arc<PingChecker>,
}

impl ProbeExecutor {
    pub fn new(timeout_seconds: u64) -> Result<Self> {
        Ok(Self {
            http_checker: Arc::new(HttpChecker::new(timeout_seconds)?),
            tcp_checker: Arc::new(TcpChecker::new(timeout_seconds)),
            ping_checker: Arc::new(PingChecker::new(timeout_seconds)),
        })
    }

    /// Execute one probe, bounded by the executor's timeout
    pub async fn probe(&self, monitor: &Monitor) -> ProbeOutcome {
        let checker: &dyn Checker = match monitor.check_type {
            CheckKind::Http => self.http_checker.as_ref(),
            CheckKind::Tcp => self.tcp_checker.as_ref(),
            CheckKind::Ping => self.ping_checker.as_ref(),
        };

        match checker.check(&monitor.target).await {
            Ok((latency_ms, status_code)) => ProbeOutcome::success(latency_ms, status_code),
            Err(e) => ProbeOutcome::failure(e.to_string()),
        }
    }
}
