//! Connector that dials literal IP addresses and presents a fixed TLS server name.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use hyper::Uri;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::error::ConnectError;
use crate::config::transport_config::TransportConfig;

const DEFAULT_HTTPS_PORT: u16 = 443;

/// Dials an IP address and runs a TLS handshake with a preset SNI.
///
/// Host names are never resolved, and proxy settings from the environment are never
/// consulted, so every byte measured travels to the exact address under test.
#[derive(Clone)]
pub struct DirectIpConnector {
    tls: TlsConnector,
    server_name: ServerName<'static>,
    transport: Arc<TransportConfig>,
}

impl DirectIpConnector {
    pub fn new(
        tls: Arc<rustls::ClientConfig>,
        server_name: ServerName<'static>,
        transport: Arc<TransportConfig>,
    ) -> Self {
        Self {
            tls: TlsConnector::from(tls),
            server_name,
            transport,
        }
    }

    /// Open a TLS connection to `addr`.
    pub async fn connect(&self, addr: SocketAddr) -> Result<ProbeStream, ConnectError> {
        let tcp = match timeout(self.transport.dial_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(source)) => return Err(ConnectError::Dial { addr, source }),
            Err(_) => return Err(ConnectError::DialTimeout(addr)),
        };
        let _ = tcp.set_nodelay(true);

        let keep_alive = TcpKeepalive::new()
            .with_time(self.transport.keep_alive)
            .with_interval(self.transport.keep_alive);
        if let Err(e) = SockRef::from(&tcp).set_tcp_keepalive(&keep_alive) {
            tracing::trace!(%addr, "failed to enable TCP keep-alive: {e}");
        }

        let handshake = self.tls.connect(self.server_name.clone(), tcp);
        let tls = match timeout(self.transport.tls_handshake_timeout, handshake).await {
            Ok(Ok(tls)) => tls,
            Ok(Err(source)) => return Err(ConnectError::Handshake { addr, source }),
            Err(_) => return Err(ConnectError::HandshakeTimeout(addr)),
        };

        let h2 = tls.get_ref().1.alpn_protocol() == Some(&b"h2"[..]);
        tracing::trace!(%addr, sni = ?self.server_name, h2, "connected");

        Ok(ProbeStream {
            io: TokioIo::new(tls),
            h2,
        })
    }
}

/// Socket address for a URI whose host is an IP literal.
pub fn target_addr(uri: &Uri) -> Result<SocketAddr, ConnectError> {
    let host = uri
        .host()
        .ok_or_else(|| ConnectError::MissingHost(uri.to_string()))?;
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    let ip: IpAddr = literal
        .parse()
        .map_err(|_| ConnectError::NotAnAddress(host.to_string()))?;
    Ok(SocketAddr::new(ip, uri.port_u16().unwrap_or(DEFAULT_HTTPS_PORT)))
}

/// Established TLS connection, ready for an HTTP handshake.
pub struct ProbeStream {
    pub io: TokioIo<TlsStream<TcpStream>>,
    /// The server selected `h2` through ALPN.
    pub h2: bool,
}
