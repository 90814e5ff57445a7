use anyhow::{Result, anyhow};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Checker trait for different probe protocols
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform the check and return latency in milliseconds and optional status code
    async fn check(&self, target: &str) -> Result<(u64, Option<u16>)>;
}

/// HTTP/HTTPS checker
///
/// Returns the response status code for any completed request, including 4xx
/// and 5xx; deciding whether a code counts as healthy is the classifier's job.
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &str) -> Result<(u64, Option<u16>)> {
        let start = Instant::now();

        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

        let latency = start.elapsed().as_millis() as u64;
        Ok((latency, Some(response.status().as_u16())))
    }
}

/// TCP port checker
pub struct TcpChecker {
    timeout_duration: Duration,
}

impl TcpChecker {
    pub fn new(timeout_seconds: u64) -> Self {
        Self { timeout_duration: Duration::from_secs(timeout_seconds) }
    }
}

#[async_trait::async_trait]
impl Checker for TcpChecker {
    async fn check(&self, target: &str) -> Result<(u64, Option<u16>)> {
        let start = Instant::now();

        let connect = tokio::net::TcpStream::connect(target);

        timeout(self.timeout_duration, connect)
            .await
            .map_err(|_| anyhow!("TCP connection timeout"))?
            .map_err(|e| anyhow!("TCP connection failed: {}", e))?;

        let latency = start.elapsed().as_millis() as u64;
        Ok((latency, None))
    }
}

/// Reachability checker backed by the system `ping` binary.
///
/// Raw ICMP sockets need elevated privileges, so a single bounded echo
/// request is delegated to the platform ping command instead. Same contract
/// as TCP: connect-style latency, no status code.
pub struct PingChecker {
    timeout_duration: Duration,
}

impl PingChecker {
    pub fn new(timeout_seconds: u64) -> Self {
        Self { timeout_duration: Duration::from_secs(timeout_seconds) }
    }
}

#[async_trait::async_trait]
impl Checker for PingChecker {
    async fn check(&self, target: &str) -> Result<(u64, Option<u16>)> {
        let timeout_secs = self.timeout_duration.as_secs().max(1);
        let start = Instant::now();

        let command = tokio::process::Command::new("ping")
            .args(["-c", "1", "-W", &timeout_secs.to_string(), target])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();

        // Grace second on top of ping's own -W deadline so a wedged binary
        // cannot hold the cycle open.
        let output = timeout(self.timeout_duration + Duration::from_secs(1), command)
            .await
            .map_err(|_| anyhow!("ping timed out after {}s", timeout_secs))?
            .map_err(|e| anyhow!("failed to execute ping: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.trim().is_empty() {
                return Err(anyhow!("ping: no reply from {}", target));
            }
            return Err(anyhow!("ping failed: {}", stderr.trim()));
        }

        let latency = start.elapsed().as_millis() as u64;
        Ok((latency, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tcp_check_succeeds_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let checker = TcpChecker::new(5);
        let (latency, code) = checker.check(&addr.to_string()).await.unwrap();

        assert!(latency < 5000);
        assert!(code.is_none());
    }

    #[tokio::test]
    async fn tcp_check_fails_on_closed_port() {
        // Bind then drop so the port is known to be closed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let checker = TcpChecker::new(2);
        assert!(checker.check(&addr.to_string()).await.is_err());
    }
}
