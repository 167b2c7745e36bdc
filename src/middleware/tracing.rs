use std::time::Duration;

use tracing::{debug, info, warn};

use super::Middleware;
use crate::dispatcher::HandlerResponse;
use crate::request::DispatchRequest;

/// Logs one line per request with status and latency.
///
/// Server errors are logged at `warn`, everything else at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn before(&self, req: &DispatchRequest) -> Option<HandlerResponse> {
        debug!(method = %req.method, path = %req.path, "Request received");
        None
    }

    fn after(&self, req: &DispatchRequest, res: &mut HandlerResponse, latency: Duration) {
        let latency_us = latency.as_micros() as u64;
        let status = res.status.as_u16();
        if res.status.is_server_error() {
            warn!(method = %req.method, path = %req.path, status, latency_us, "Request completed");
        } else {
            info!(method = %req.method, path = %req.path, status, latency_us, "Request completed");
        }
    }
}
