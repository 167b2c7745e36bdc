use std::time::Duration;

use crate::dispatcher::HandlerResponse;
use crate::request::DispatchRequest;

/// Hooks around every dispatch.
///
/// `before` runs ahead of routing and may short-circuit with a response.
/// `after` sees every response, including error and short-circuit responses,
/// together with the request head (the body has been consumed by then).
pub trait Middleware: Send + Sync {
    fn before(&self, _req: &DispatchRequest) -> Option<HandlerResponse> {
        None
    }
    fn after(&self, _req: &DispatchRequest, _res: &mut HandlerResponse, _latency: Duration) {}
}
