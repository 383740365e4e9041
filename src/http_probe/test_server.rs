//! Local TLS download endpoint for exercising the whole probe path.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{ACCEPT, HOST, HeaderName, USER_AGENT};
use hyper::service::service_fn;
use hyper::{Request, Response, Version};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::{RootCertStore, ServerConfig};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

/// Name on the server certificate.
pub const TLS_NAME: &str = "tls.example.net";

/// How the server answers every request.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// 200 with a body of this many bytes.
    Body(usize),
    Status(u16),
    /// Accept the request and never send a response head.
    Stall,
}

/// What one request looked like on the server side.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub version: Version,
    pub authority: Option<String>,
    pub host: Option<String>,
    pub user_agent: Option<String>,
    pub accept: Option<String>,
    pub path: String,
}

impl SeenRequest {
    fn record(req: &Request<Incoming>) -> Self {
        let header = |name: HeaderName| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            version: req.version(),
            authority: req.uri().authority().map(|a| a.to_string()),
            host: header(HOST),
            user_agent: header(USER_AGENT),
            accept: header(ACCEPT),
            path: req
                .uri()
                .path_and_query()
                .map(|p| p.to_string())
                .unwrap_or_default(),
        }
    }
}

/// Hands out the single certificate and remembers each ClientHello's SNI.
#[derive(Debug)]
struct CaptureSni {
    key: Arc<CertifiedKey>,
    names: Arc<Mutex<Vec<String>>>,
}

impl ResolvesServerCert for CaptureSni {
    fn resolve(&self, hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        if let Some(name) = hello.server_name() {
            self.names.lock().unwrap().push(name.to_string());
        }
        Some(self.key.clone())
    }
}

pub struct TlsServer {
    pub addr: SocketAddr,
    /// Trust store accepting the server certificate.
    pub roots: RootCertStore,
    sni: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<SeenRequest>>>,
    handle: JoinHandle<()>,
}

impl TlsServer {
    /// Listen on a local port offering `alpn`, answering with `reply`.
    pub async fn start(alpn: &[&[u8]], reply: Reply) -> Self {
        let certified = rcgen::generate_simple_self_signed(vec![TLS_NAME.to_string()]).unwrap();
        let cert = certified.cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            certified.signing_key.serialize_der(),
        ));
        let signing_key = rustls::crypto::ring::sign::any_supported_type(&key).unwrap();

        let sni = Arc::new(Mutex::new(Vec::new()));
        let resolver = CaptureSni {
            key: Arc::new(CertifiedKey::new(vec![cert.clone()], signing_key)),
            names: sni.clone(),
        };

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(resolver));
        config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let mut roots = RootCertStore::empty();
        roots.add(cert).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        let handle = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let Ok(tls) = acceptor.accept(tcp).await else {
                        return;
                    };
                    let service = service_fn(move |req| answer(req, reply, seen.clone()));
                    let _ = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(tls), service)
                        .await;
                });
            }
        });

        Self {
            addr,
            roots,
            sni,
            requests,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// SNI of every completed ClientHello, in arrival order.
    pub fn server_names(&self) -> Vec<String> {
        self.sni.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for TlsServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn answer(
    req: Request<Incoming>,
    reply: Reply,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let request = SeenRequest::record(&req);
    seen.lock().unwrap().push(request);

    match reply {
        Reply::Body(len) => Ok(Response::new(Full::new(Bytes::from(vec![7u8; len])))),
        Reply::Status(code) => Ok(Response::builder()
            .status(code)
            .body(Full::new(Bytes::from_static(b"unavailable")))
            .unwrap()),
        Reply::Stall => std::future::pending().await,
    }
}
