use std::error::Error as StdError;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use super::context::Interrupt;

/// Classified outcome of a failed probe.
///
/// The `Display` output is the stable label stored in `ProbeResult::error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The request could not be built from the configured values.
    #[error("{0}")]
    Request(String),
    #[error("timeout")]
    Timeout,
    #[error("canceled")]
    Canceled,
    #[error("http_status_{0}")]
    Status(u16),
    /// Dial, TLS or protocol failure before a response arrived.
    #[error("{0}")]
    Transport(String),
    /// Failure while consuming the response body.
    #[error("{0}")]
    Read(String),
}

impl From<Interrupt> for ProbeError {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::DeadlineExceeded => ProbeError::Timeout,
            Interrupt::Canceled => ProbeError::Canceled,
        }
    }
}

/// Failures raised by the direct-IP connector.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("no address in {0}")]
    MissingHost(String),
    #[error("{0:?} is not an IP address")]
    NotAnAddress(String),
    #[error("dial tcp {0}: i/o timeout")]
    DialTimeout(SocketAddr),
    #[error("dial tcp {addr}")]
    Dial {
        addr: SocketAddr,
        source: io::Error,
    },
    #[error("tls handshake with {0}: timeout")]
    HandshakeTimeout(SocketAddr),
    #[error("tls handshake with {addr}")]
    Handshake {
        addr: SocketAddr,
        source: io::Error,
    },
}

impl ConnectError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ConnectError::DialTimeout(_) | ConnectError::HandshakeTimeout(_)
        )
    }
}

/// Failures of one exchange on the probe client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("http handshake with {addr}")]
    Handshake {
        addr: SocketAddr,
        source: hyper::Error,
    },
    #[error(transparent)]
    Http(#[from] hyper::Error),
    #[error("invalid request target: {0}")]
    Uri(#[from] hyper::http::uri::InvalidUri),
    #[error("timeout awaiting response headers")]
    ResponseHeaderTimeout,
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ClientError::Connect(e) => e.is_timeout(),
            ClientError::ResponseHeaderTimeout => true,
            _ => false,
        }
    }
}

/// Failures constructing a `Prober`.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid TLS server name {name:?}: {source}")]
    ServerName {
        name: String,
        source: rustls::pki_types::InvalidDnsNameError,
    },
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),
}

/// True when any error in the chain is one of the transport's own phase timeouts.
pub fn is_phase_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(client) = e.downcast_ref::<ClientError>() {
            if client.is_timeout() {
                return true;
            }
        }
        if let Some(connect) = e.downcast_ref::<ConnectError>() {
            if connect.is_timeout() {
                return true;
            }
        }
        current = e.source();
    }
    false
}
