pub mod client;
pub mod connector;
pub mod context;
pub mod error;
pub mod probe;
pub mod result;
#[cfg(test)]
pub(crate) mod test_server;

pub mod prelude {
    pub use super::client::{ProbeClient, build_client};
    pub use super::context::{Interrupt, ProbeContext};
    pub use super::error::{BuildError, ClientError, ConnectError, ProbeError, is_phase_timeout};
    pub use super::probe::Prober;
    pub use super::report;
    pub use super::result::ProbeResult;
}

use std::fmt::Write;

/// Render an error with its whole source chain, e.g. `client error (Connect): dial tcp ...`.
pub fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, ": {}", src);
        err = src;
    }
    s
}
