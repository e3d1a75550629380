use std::sync::Arc;

use middleware::gate::GateMiddleware;

pub mod pipeline;

pub mod middleware {
    pub mod gate;
}

pub use pipeline::{Admission, DownstreamOutcome, Gatekeeper, Handled, Stage};

/// Runs every request of the wrapped scope through `gatekeeper`.
pub fn middleware(gatekeeper: Arc<Gatekeeper>) -> GateMiddleware {
    GateMiddleware::new(gatekeeper)
}
