use std::error::Error as StdError;
use std::net::IpAddr;

use bytes::{Buf, Bytes};
use chrono::Utc;
use http_body_util::{BodyExt, Empty};
use hyper::body::Body;
use hyper::header::{ACCEPT, HOST, HeaderValue, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode, Uri};
use rustls::ClientConfig;
use tokio::time::Instant;
use url::Url;

use super::client::{build_client_with, tls_config};
use super::prelude::*;
use crate::config::probe_config::ProbeConfig;
use crate::config::transport_config::TransportConfig;

/// User agent sent with every probe request.
pub const PROBE_USER_AGENT: &str = concat!("speedprobe/", env!("CARGO_PKG_VERSION"));

const OCTET_STREAM: &str = "application/octet-stream";

/// Measures download throughput from individual IP addresses.
///
/// Build one per probe campaign and share it (e.g. behind an `Arc`) between tasks;
/// `download` takes `&self` and the pooled client is safe for concurrent use.
pub struct Prober {
    cfg: ProbeConfig,
    client: ProbeClient,
}

impl Prober {
    /// Normalize `cfg` and build the pooled client with the default transport settings.
    pub fn new(cfg: ProbeConfig) -> Result<Self, BuildError> {
        let cfg = cfg.normalized();
        let transport = TransportConfig::for_probe(&cfg);
        Self::with_transport(cfg, transport)
    }

    /// Like [`Prober::new`] with explicit transport settings.
    pub fn with_transport(cfg: ProbeConfig, transport: TransportConfig) -> Result<Self, BuildError> {
        let tls = tls_config(&transport)?;
        Self::with_tls(cfg, transport, tls)
    }

    pub(crate) fn with_tls(
        cfg: ProbeConfig,
        transport: TransportConfig,
        tls: ClientConfig,
    ) -> Result<Self, BuildError> {
        let cfg = cfg.normalized();
        let client = build_client_with(&cfg, &transport, tls)?;
        Ok(Self { cfg, client })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.cfg
    }

    /// URL dialed for `ip`: the IP literal as authority, bracketed for IPv6.
    ///
    /// The virtual host replaces this authority on the wire (`Host` or `:authority`).
    pub fn url_for(&self, ip: IpAddr) -> String {
        let host = match ip {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };
        let authority = if self.cfg.port == 443 {
            host
        } else {
            format!("{host}:{}", self.cfg.port)
        };

        if self.cfg.custom_url {
            format!("https://{authority}{}", self.cfg.path)
        } else {
            format!("https://{authority}{}?bytes={}", self.cfg.path, self.cfg.bytes)
        }
    }

    /// Run one timed, bounded download from `ip`.
    ///
    /// Never fails: every outcome, including timeouts, cancellation and HTTP errors,
    /// is reported in the returned [`ProbeResult`]. The earlier of the context deadline
    /// and the configured timeout governs the whole exchange.
    pub async fn download(&self, ctx: &ProbeContext, ip: IpAddr) -> ProbeResult {
        let start = Instant::now();
        let mut out = ProbeResult::started(ip, Utc::now());
        let limit = start + self.cfg.timeout;

        let outcome = match self.request(ip) {
            Ok(req) => match self.send(ctx, limit, req).await {
                Ok(response) => self.receive(ctx, limit, response, &mut out).await,
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };

        out.finish(start.elapsed(), outcome);

        tracing::debug!(
            ip = %out.ip,
            status = out.status,
            bytes = out.bytes,
            total_ms = out.total_ms,
            mbps = out.mbps,
            error = %out.error,
            "download probe finished"
        );

        out
    }

    fn request(&self, ip: IpAddr) -> Result<Request<Empty<Bytes>>, ProbeError> {
        let raw = self.url_for(ip);
        let url = Url::parse(&raw).map_err(|e| ProbeError::Request(format!("parse {raw:?}: {e}")))?;
        let uri: Uri = url
            .as_str()
            .parse()
            .map_err(|e| ProbeError::Request(format!("parse {raw:?}: {e}")))?;
        let host = HeaderValue::from_str(&self.cfg.host_name)
            .map_err(|e| ProbeError::Request(format!("invalid host {:?}: {e}", self.cfg.host_name)))?;

        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(HOST, host)
            .header(USER_AGENT, PROBE_USER_AGENT)
            .header(ACCEPT, OCTET_STREAM)
            .body(Empty::new())
            .map_err(|e| ProbeError::Request(e.to_string()))
    }

    async fn send(
        &self,
        ctx: &ProbeContext,
        limit: Instant,
        req: Request<Empty<Bytes>>,
    ) -> Result<Response<hyper::body::Incoming>, ProbeError> {
        match ctx.guard(limit, self.client.request(req)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => {
                if let Some(interrupt) = ctx.interrupted(limit) {
                    Err(interrupt.into())
                } else if is_phase_timeout(&err) {
                    Err(ProbeError::Timeout)
                } else {
                    Err(ProbeError::Transport(report(&err)))
                }
            }
            Err(interrupt) => Err(interrupt.into()),
        }
    }

    /// Check the status and drain the body up to the byte limit.
    ///
    /// Bytes read so far are stored in `out` even when reading fails.
    pub(crate) async fn receive<B>(
        &self,
        ctx: &ProbeContext,
        limit: Instant,
        response: Response<B>,
        out: &mut ProbeResult,
    ) -> Result<(), ProbeError>
    where
        B: Body + Unpin,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let status = response.status();
        out.status = status.as_u16();
        check_status(status)?;

        let mut body = response.into_body();
        let mut read = 0u64;
        let drained = ctx.guard(limit, drain(&mut body, self.cfg.bytes, &mut read)).await;
        out.bytes = read;

        match drained {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                let err: Box<dyn StdError + Send + Sync> = err.into();
                if let Some(interrupt) = ctx.interrupted(limit) {
                    Err(interrupt.into())
                } else if is_phase_timeout(&*err) {
                    Err(ProbeError::Timeout)
                } else {
                    Err(ProbeError::Read(report(&*err)))
                }
            }
            Err(interrupt) => Err(interrupt.into()),
        }
    }
}

/// Anything outside 2xx fails the probe.
pub fn check_status(status: StatusCode) -> Result<(), ProbeError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ProbeError::Status(status.as_u16()))
    }
}

/// Discard body data until `limit` bytes were counted or the stream ends.
/// A `limit` of 0 reads to the end of the stream.
async fn drain<B>(body: &mut B, limit: u64, read: &mut u64) -> Result<(), B::Error>
where
    B: Body + Unpin,
{
    while limit == 0 || *read < limit {
        let Some(frame) = body.frame().await else {
            return Ok(());
        };
        if let Ok(data) = frame?.into_data() {
            let len = data.remaining() as u64;
            *read += if limit == 0 { len } else { len.min(limit - *read) };
        }
    }
    Ok(())
}
