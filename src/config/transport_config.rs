use std::time::Duration;

use super::probe_config::ProbeConfig;

/// Connection level settings for the probe client.
///
/// There is no proxy setting: the connector always dials the literal address found
/// in the request URI and never consults `HTTP(S)_PROXY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Maximum time to establish the TCP connection.
    pub dial_timeout: Duration,

    /// TCP keep-alive idle time and probe interval.
    pub keep_alive: Duration,

    /// Offer `h2` through ALPN and use it when the server agrees.
    pub http2: bool,

    /// Idle connections kept per target address.
    pub max_idle_per_host: usize,

    /// Idle connections kept across all addresses; the oldest is closed first.
    /// 0 means no global cap.
    pub max_idle: usize,

    /// How long an idle pooled connection is kept before it is closed.
    pub idle_timeout: Duration,

    pub tls_handshake_timeout: Duration,

    /// Maximum wait between sending a request and receiving the response head.
    /// Applies to HTTP/1.1 and HTTP/2 alike; zero disables it.
    pub response_header_timeout: Duration,
}

impl TransportConfig {
    /// Transport settings for a normalized probe config: the dial timeout follows the probe timeout.
    pub fn for_probe(cfg: &ProbeConfig) -> Self {
        Self {
            dial_timeout: cfg.timeout,
            ..Default::default()
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(45),
            keep_alive: Duration::from_secs(30),
            http2: true,
            max_idle_per_host: 8,
            max_idle: 64,
            idle_timeout: Duration::from_secs(30),
            tls_handshake_timeout: Duration::from_secs(10),
            response_header_timeout: Duration::from_secs(20),
        }
    }
}
