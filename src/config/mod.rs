pub mod app_config;
pub mod probe_config;
pub mod transport_config;

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid download URL {url:?}: {source}")]
    Url {
        url: String,
        source: url::ParseError,
    },
    #[error("unsupported URL scheme {0:?}, only https is probed")]
    UnsupportedScheme(String),
    #[error("download URL {0:?} has no host")]
    MissingHost(String),
    #[error("download URL {0:?} names an IP address, a host name is needed for SNI and Host")]
    AddressHost(String),
    #[error("target {target:?} is not an IP address: {source}")]
    Target {
        target: String,
        source: std::net::AddrParseError,
    },
}
