use std::time::Duration;

use serde::{Deserialize, Deserializer};
use url::{Host, Url};

use super::ConfigError;

/// Overall probe deadline applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

/// Bytes requested from the default endpoint when no limit is configured.
pub const DEFAULT_BYTES: u64 = 50_000_000;

/// Server name presented during the TLS handshake by default.
pub const DEFAULT_SNI: &str = "speed.cloudflare.com";

/// Virtual host sent in the `Host` header by default.
pub const DEFAULT_HOST_NAME: &str = "speed.cloudflare.com";

/// Download path of the default speed test endpoint.
pub const DEFAULT_PATH: &str = "/__down";

pub const DEFAULT_PORT: u16 = 443;

/// Settings for a single download probe.
///
/// Construct it with any subset of fields set and call [`ProbeConfig::normalized`]
/// (the `Prober` does this for you) to fill in the defaults. Zero values mean "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Upper bound for the whole probe, from dialing to the last body byte.
    #[serde(rename = "timeout_seconds", deserialize_with = "deserialize_seconds")]
    pub timeout: Duration,

    /// Number of body bytes to read.
    /// With `custom_url` set, 0 means "read until the server closes the stream".
    pub bytes: u64,

    /// TLS server name, independent of the dialed address.
    pub sni: String,

    /// Value of the `Host` header, independent of the TLS server name.
    pub host_name: String,

    /// Request path. May carry its own query string when `custom_url` is set.
    pub path: String,

    /// Destination port, 443 when unset.
    pub port: u16,

    /// Use `path` verbatim instead of appending `?bytes=<N>`.
    pub custom_url: bool,
}

impl ProbeConfig {
    /// Fill every unset field with its default.
    ///
    /// Applying it to an already normalized config is a no-op.
    pub fn normalized(mut self) -> Self {
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        // The default endpoint needs an explicit byte count; a custom URL may read to EOF.
        if self.bytes == 0 && !self.custom_url {
            self.bytes = DEFAULT_BYTES;
        }
        if self.sni.is_empty() {
            self.sni = DEFAULT_SNI.to_string();
        }
        if self.host_name.is_empty() {
            self.host_name = DEFAULT_HOST_NAME.to_string();
        }
        if self.path.is_empty() {
            self.path = DEFAULT_PATH.to_string();
        }
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        self
    }

    /// Build a config that downloads from a user supplied `https://` URL.
    ///
    /// The URL host becomes both the SNI and the virtual host, the path and query are
    /// sent verbatim and the body is read until the server closes the stream.
    /// Timeout and byte limit can still be overridden on the returned value.
    pub fn from_custom_url(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw).map_err(|source| ConfigError::Url {
            url: raw.to_string(),
            source,
        })?;

        if url.scheme() != "https" {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }

        // The host doubles as TLS server name, which must be a DNS name.
        let host = match url.host() {
            Some(Host::Domain(name)) if !name.is_empty() => name.to_string(),
            Some(Host::Ipv4(_) | Host::Ipv6(_)) => {
                return Err(ConfigError::AddressHost(raw.to_string()));
            }
            _ => return Err(ConfigError::MissingHost(raw.to_string())),
        };

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            sni: host.clone(),
            host_name: host,
            path,
            port: url.port_or_known_default().unwrap_or(DEFAULT_PORT),
            custom_url: true,
            ..Default::default()
        })
    }
}

fn deserialize_seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    // Negative or non-finite values count as unset and get the default on normalization.
    Ok(Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO))
}
