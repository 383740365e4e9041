use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper::client::conn::{http1, http2};
use hyper::header::HOST;
use hyper::{Request, Response, Uri};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::time::{Instant, timeout};

use super::connector::{DirectIpConnector, target_addr};
use super::error::{BuildError, ClientError};
use crate::config::probe_config::ProbeConfig;
use crate::config::transport_config::TransportConfig;

/// rustls client configuration trusting the Mozilla root set.
///
/// ALPN offers `h2` first when HTTP/2 is enabled, falling back to `http/1.1`.
pub fn tls_config(transport: &TransportConfig) -> Result<ClientConfig, BuildError> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.into(),
    };
    tls_config_with_roots(transport, roots)
}

pub(crate) fn tls_config_with_roots(
    transport: &TransportConfig,
    roots: RootCertStore,
) -> Result<ClientConfig, BuildError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    config.alpn_protocols = if transport.http2 {
        vec![b"h2".to_vec(), b"http/1.1".to_vec()]
    } else {
        vec![b"http/1.1".to_vec()]
    };

    Ok(config)
}

/// Build the reusable client shared by every probe of one `Prober`.
pub fn build_client(
    cfg: &ProbeConfig,
    transport: &TransportConfig,
) -> Result<ProbeClient, BuildError> {
    build_client_with(cfg, transport, tls_config(transport)?)
}

pub(crate) fn build_client_with(
    cfg: &ProbeConfig,
    transport: &TransportConfig,
    tls: ClientConfig,
) -> Result<ProbeClient, BuildError> {
    let server_name =
        ServerName::try_from(cfg.sni.clone()).map_err(|source| BuildError::ServerName {
            name: cfg.sni.clone(),
            source,
        })?;

    let transport = Arc::new(transport.clone());
    Ok(ProbeClient {
        connector: DirectIpConnector::new(Arc::new(tls), server_name, transport.clone()),
        transport,
        idle: Arc::new(Mutex::new(Vec::new())),
    })
}

/// HTTP/1.1 + HTTP/2 client over the direct-IP connector.
///
/// Connections are pooled per dialed address, never per virtual host, so two
/// targets behind the same `Host` never share a connection.
pub struct ProbeClient {
    connector: DirectIpConnector,
    transport: Arc<TransportConfig>,
    idle: Arc<Mutex<Vec<Idle>>>,
}

enum Sender {
    Http1(http1::SendRequest<Empty<Bytes>>),
    Http2(http2::SendRequest<Empty<Bytes>>),
}

impl Sender {
    fn is_h2(&self) -> bool {
        matches!(self, Sender::Http2(_))
    }

    fn is_ready(&self) -> bool {
        match self {
            Sender::Http1(tx) => tx.is_ready(),
            Sender::Http2(tx) => tx.is_ready(),
        }
    }

    fn is_closed(&self) -> bool {
        match self {
            Sender::Http1(tx) => tx.is_closed(),
            Sender::Http2(tx) => tx.is_closed(),
        }
    }
}

struct Idle {
    addr: SocketAddr,
    sender: Sender,
    since: Instant,
}

/// A connection taken for one exchange. `shared` marks an HTTP/2 connection that
/// stayed in the pool while it is used.
struct Checkout {
    sender: Sender,
    shared: bool,
}

impl ProbeClient {
    /// Send `req` and wait for the response head.
    ///
    /// The URI authority is the IP literal to dial. The `Host` header names the virtual
    /// host; on HTTP/2 it is sent as `:authority`.
    pub async fn request(&self, req: Request<Empty<Bytes>>) -> Result<Response<Incoming>, ClientError> {
        let addr = target_addr(req.uri())?;

        if let Some(conn) = self.checkout(addr) {
            let retry = req.clone();
            match self.exchange(addr, conn, req).await {
                // The pooled connection went away before the request was written.
                Err(ClientError::Http(e)) if e.is_canceled() => {
                    tracing::trace!(%addr, "pooled connection closed, dialing again");
                    let conn = self.connect(addr).await?;
                    self.exchange(addr, conn, retry).await
                }
                other => other,
            }
        } else {
            let conn = self.connect(addr).await?;
            self.exchange(addr, conn, req).await
        }
    }

    async fn exchange(
        &self,
        addr: SocketAddr,
        mut conn: Checkout,
        req: Request<Empty<Bytes>>,
    ) -> Result<Response<Incoming>, ClientError> {
        let req = wire_request(req, conn.sender.is_h2())?;

        let head = async {
            match &mut conn.sender {
                Sender::Http1(tx) => tx.send_request(req).await,
                Sender::Http2(tx) => tx.send_request(req).await,
            }
        };
        let header_timeout = self.transport.response_header_timeout;
        let response = if header_timeout.is_zero() {
            head.await?
        } else {
            timeout(header_timeout, head)
                .await
                .map_err(|_| ClientError::ResponseHeaderTimeout)??
        };

        self.checkin(addr, conn);
        Ok(response)
    }

    async fn connect(&self, addr: SocketAddr) -> Result<Checkout, ClientError> {
        let stream = self.connector.connect(addr).await?;

        let sender = if stream.h2 {
            let (tx, conn) = http2::Builder::new(TokioExecutor::new())
                .timer(TokioTimer::new())
                .handshake(stream.io)
                .await
                .map_err(|source| ClientError::Handshake { addr, source })?;
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    tracing::debug!(%addr, "h2 connection closed: {e}");
                }
            });
            Sender::Http2(tx)
        } else {
            let (tx, conn) = http1::handshake(stream.io)
                .await
                .map_err(|source| ClientError::Handshake { addr, source })?;
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    tracing::debug!(%addr, "http/1.1 connection closed: {e}");
                }
            });
            Sender::Http1(tx)
        };

        Ok(Checkout {
            sender,
            shared: false,
        })
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<Idle>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop closed and expired entries.
    fn prune(&self, idle: &mut Vec<Idle>, now: Instant) {
        let idle_timeout = self.transport.idle_timeout;
        idle.retain(|entry| {
            !entry.sender.is_closed()
                && (idle_timeout.is_zero() || now.duration_since(entry.since) < idle_timeout)
        });
    }

    fn checkout(&self, addr: SocketAddr) -> Option<Checkout> {
        let now = Instant::now();
        let mut idle = self.lock_idle();
        self.prune(&mut idle, now);

        // HTTP/1.1 connections stay pooled while their response body is read and
        // only become ready once it was consumed.
        let pos = idle
            .iter()
            .position(|entry| entry.addr == addr && entry.sender.is_ready())?;

        let multiplexed = match &idle[pos].sender {
            Sender::Http2(tx) => Some(tx.clone()),
            Sender::Http1(_) => None,
        };
        if let Some(tx) = multiplexed {
            idle[pos].since = now;
            return Some(Checkout {
                sender: Sender::Http2(tx),
                shared: true,
            });
        }
        let entry = idle.swap_remove(pos);
        Some(Checkout {
            sender: entry.sender,
            shared: false,
        })
    }

    fn checkin(&self, addr: SocketAddr, conn: Checkout) {
        if conn.shared {
            return;
        }
        let now = Instant::now();
        let mut idle = self.lock_idle();
        self.prune(&mut idle, now);

        let per_host = idle.iter().filter(|entry| entry.addr == addr).count();
        if per_host >= self.transport.max_idle_per_host {
            return;
        }

        let max_idle = self.transport.max_idle;
        if max_idle > 0 && idle.len() >= max_idle {
            let oldest = idle
                .iter()
                .enumerate()
                .min_by_key(|(_, entry)| entry.since)
                .map(|(pos, _)| pos);
            if let Some(pos) = oldest {
                let evicted = idle.swap_remove(pos);
                tracing::trace!(addr = %evicted.addr, "idle pool full, closing oldest connection");
            }
        }

        idle.push(Idle {
            addr,
            sender: conn.sender,
            since: now,
        });
    }

    /// Connections currently held by the pool.
    pub fn idle_connections(&self) -> usize {
        let mut idle = self.lock_idle();
        self.prune(&mut idle, Instant::now());
        idle.len()
    }
}

/// Put `req` into the form sent on the wire.
///
/// HTTP/1.1 gets the origin form and keeps `Host`. On HTTP/2 the `Host` value becomes
/// the URI authority, which hyper sends as `:authority`, and the header is dropped.
pub fn wire_request(
    mut req: Request<Empty<Bytes>>,
    h2: bool,
) -> Result<Request<Empty<Bytes>>, ClientError> {
    let path = req
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let uri: Uri = if h2 {
        let authority = match req.headers_mut().remove(HOST) {
            Some(host) => String::from_utf8_lossy(host.as_bytes()).into_owned(),
            None => req
                .uri()
                .authority()
                .map(|a| a.as_str().to_string())
                .unwrap_or_default(),
        };
        format!("https://{authority}{path}").parse()?
    } else {
        path.parse()?
    };

    *req.uri_mut() = uri;
    Ok(req)
}
