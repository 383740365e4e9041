//! Direct-IP HTTPS download probes.
//!
//! A [`Prober`] dials a literal IP address, presents a configurable TLS server name and
//! virtual host (`Host`, or `:authority` on HTTP/2) independently of that address,
//! reads a bounded amount of the response body and reports the throughput as a
//! [`ProbeResult`].
//!
//! ```no_run
//! use speedprobe::{ProbeConfig, ProbeContext, Prober};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let prober = Prober::new(ProbeConfig {
//!     bytes: 10_000_000,
//!     ..Default::default()
//! })?;
//! let ctx = ProbeContext::with_timeout(Duration::from_secs(30));
//! let result = prober.download(&ctx, "104.16.0.1".parse()?).await;
//! println!("{} Mbps", result.mbps);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod http_probe;

pub use config::probe_config::ProbeConfig;
pub use config::transport_config::TransportConfig;
pub use http_probe::context::ProbeContext;
pub use http_probe::probe::Prober;
pub use http_probe::result::ProbeResult;
