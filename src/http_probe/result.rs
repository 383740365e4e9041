use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ProbeError;

/// Outcome of one download probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub ip: IpAddr,
    pub ok: bool,
    /// HTTP status code, 0 when no response was received.
    pub status: u16,
    /// Error label, empty on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Body bytes read, including partial reads on failure.
    pub bytes: u64,
    pub total_ms: u64,
    pub mbps: f64,
    /// Probe start.
    pub when: DateTime<Utc>,
}

impl ProbeResult {
    pub(crate) fn started(ip: IpAddr, when: DateTime<Utc>) -> Self {
        Self {
            ip,
            ok: false,
            status: 0,
            error: String::new(),
            bytes: 0,
            total_ms: 0,
            mbps: 0.0,
            when,
        }
    }

    /// Record the elapsed time, throughput and final outcome.
    pub(crate) fn finish(&mut self, elapsed: Duration, outcome: Result<(), ProbeError>) {
        self.total_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.mbps = throughput_mbps(self.bytes, elapsed);
        match outcome {
            Ok(()) => {
                self.ok = true;
                self.error.clear();
            }
            Err(err) => {
                self.ok = false;
                self.error = err.to_string();
            }
        }
    }
}

/// Megabits per second for `bytes` transferred in `elapsed`; 0 when no time elapsed.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    if elapsed.is_zero() {
        return 0.0;
    }
    (bytes as f64 * 8.0) / elapsed.as_secs_f64() / 1e6
}
