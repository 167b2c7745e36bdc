use super::app::{AppScope, AppState};
use super::provider::{Cleanup, DepValue, Outcome};
use crate::request::RequestParts;
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A cleanup waiting for the pipeline to finish.
pub(crate) struct PendingCleanup {
    pub(crate) provider: Arc<str>,
    pub(crate) cleanup: Cleanup,
}

/// What happened during a teardown pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Cleanups that completed successfully, in the order they ran
    pub completed: Vec<String>,
    /// Cleanups that returned an error or panicked
    pub failed: Vec<String>,
}

impl TeardownReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Request,
    Startup,
}

/// Per-request resolution state: cache, call stack and cleanup stack.
///
/// Every cleanup registered here runs exactly once: through
/// [`teardown`](Self::teardown) when the pipeline finishes, or from `Drop` if
/// the request future is abandoned first.
pub struct ResolutionContext {
    pub(crate) request: Option<Arc<RequestParts>>,
    pub(crate) state: Arc<AppState>,
    pub(crate) app: Option<Arc<AppScope>>,
    pub(crate) mode: Mode,
    pub(crate) cache: HashMap<Arc<str>, DepValue>,
    pub(crate) call_stack: Vec<Arc<str>>,
    cleanups: Vec<PendingCleanup>,
}

impl ResolutionContext {
    #[must_use]
    pub fn for_request(request: Arc<RequestParts>, app: Arc<AppScope>) -> Self {
        Self {
            request: Some(request),
            state: Arc::clone(app.state()),
            app: Some(app),
            mode: Mode::Request,
            cache: HashMap::new(),
            call_stack: Vec::new(),
            cleanups: Vec::new(),
        }
    }

    pub(crate) fn for_startup(state: Arc<AppState>) -> Self {
        Self {
            request: None,
            state,
            app: None,
            mode: Mode::Startup,
            cache: HashMap::new(),
            call_stack: Vec::new(),
            cleanups: Vec::new(),
        }
    }

    /// Value stored for `provider` by the most recent resolution, if any.
    #[must_use]
    pub fn cached(&self, provider: &str) -> Option<&DepValue> {
        self.cache.get(provider)
    }

    /// Providers currently being resolved, outermost first.
    #[must_use]
    pub fn call_stack(&self) -> Vec<&str> {
        self.call_stack.iter().map(AsRef::as_ref).collect()
    }

    #[must_use]
    pub fn pending_cleanups(&self) -> usize {
        self.cleanups.len()
    }

    #[must_use]
    pub fn request(&self) -> Option<&Arc<RequestParts>> {
        self.request.as_ref()
    }

    pub(crate) fn push_cleanup(&mut self, provider: Arc<str>, cleanup: Cleanup) {
        debug!(provider = %provider, position = self.cleanups.len(), "Cleanup registered");
        self.cleanups.push(PendingCleanup { provider, cleanup });
    }

    pub(crate) fn take_cache(&mut self) -> HashMap<Arc<str>, DepValue> {
        std::mem::take(&mut self.cache)
    }

    pub(crate) fn take_cleanups(&mut self) -> Vec<PendingCleanup> {
        std::mem::take(&mut self.cleanups)
    }

    /// Run every pending cleanup in reverse acquisition order.
    ///
    /// A failing or panicking cleanup is logged and the rest still run.
    pub async fn teardown(&mut self, outcome: Outcome) -> TeardownReport {
        let cleanups = self.take_cleanups();
        run_cleanups(cleanups, outcome).await
    }
}

impl Drop for ResolutionContext {
    fn drop(&mut self) {
        if self.cleanups.is_empty() {
            return;
        }
        let cleanups = self.take_cleanups();
        let pending = cleanups.len();
        warn!(
            pending_cleanups = pending,
            "Resolution context dropped before teardown, running cleanups as cancelled"
        );
        let teardown = run_cleanups(cleanups, Outcome::Cancelled);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            drop(handle.spawn(teardown));
            return;
        }
        // block_on panics when nested inside another futures executor
        match futures::executor::enter() {
            Ok(enter) => {
                drop(enter);
                futures::executor::block_on(teardown);
            }
            Err(_) => {
                error!(
                    pending_cleanups = pending,
                    "Resolution context dropped inside a non-tokio executor, cleanups skipped"
                );
            }
        }
    }
}

impl fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cached: Vec<&str> = self.cache.keys().map(AsRef::as_ref).collect();
        cached.sort_unstable();
        f.debug_struct("ResolutionContext")
            .field("mode", &self.mode)
            .field("cached", &cached)
            .field("call_stack", &self.call_stack)
            .field("pending_cleanups", &self.cleanups.len())
            .finish()
    }
}

pub(crate) async fn run_cleanups(mut cleanups: Vec<PendingCleanup>, outcome: Outcome) -> TeardownReport {
    let mut report = TeardownReport::default();
    while let Some(PendingCleanup { provider, cleanup }) = cleanups.pop() {
        let result = AssertUnwindSafe(async move { cleanup(outcome).await })
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(())) => {
                debug!(provider = %provider, outcome = %outcome, "Cleanup completed");
                report.completed.push(provider.to_string());
            }
            Ok(Err(err)) => {
                error!(
                    provider = %provider,
                    outcome = %outcome,
                    error = %format!("{err:#}"),
                    "Cleanup failed"
                );
                report.failed.push(provider.to_string());
            }
            Err(panic) => {
                error!(
                    provider = %provider,
                    outcome = %outcome,
                    panic = %panic_message(panic.as_ref()),
                    "Cleanup panicked"
                );
                report.failed.push(provider.to_string());
            }
        }
    }
    report
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use parking_lot::Mutex;

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &str) -> PendingCleanup {
        let log = Arc::clone(log);
        let label = name.to_string();
        PendingCleanup {
            provider: Arc::from(name),
            cleanup: Box::new(move |outcome: Outcome| {
                async move {
                    log.lock().push(format!("{label}:{outcome}"));
                    Ok::<(), anyhow::Error>(())
                }
                .boxed()
            }),
        }
    }

    #[tokio::test]
    async fn runs_in_reverse_order_and_survives_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing = PendingCleanup {
            provider: Arc::from("broken"),
            cleanup: Box::new(|_: Outcome| async { Err::<(), _>(anyhow::anyhow!("boom")) }.boxed()),
        };
        let panicking = PendingCleanup {
            provider: Arc::from("panicky"),
            cleanup: Box::new(|_: Outcome| {
                async {
                    if true {
                        panic!("cleanup exploded");
                    }
                    Ok::<(), anyhow::Error>(())
                }
                .boxed()
            }),
        };
        let cleanups = vec![
            recording(&log, "first"),
            failing,
            recording(&log, "second"),
            panicking,
            recording(&log, "third"),
        ];

        let report = run_cleanups(cleanups, Outcome::Failed).await;

        assert_eq!(
            *log.lock(),
            vec!["third:failed", "second:failed", "first:failed"]
        );
        assert_eq!(report.completed, vec!["third", "second", "first"]);
        assert_eq!(report.failed, vec!["panicky", "broken"]);
        assert_eq!(report.total(), 5);
    }

    #[test]
    fn drop_without_runtime_runs_cleanups_inline() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = ResolutionContext::for_startup(Arc::new(AppState::new()));
        let c = recording(&log, "conn");
        ctx.push_cleanup(c.provider, c.cleanup);
        assert_eq!(ctx.pending_cleanups(), 1);
        drop(ctx);
        assert_eq!(*log.lock(), vec!["conn:cancelled"]);
    }

    #[test]
    fn drop_inside_foreign_executor_skips_cleanups() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = ResolutionContext::for_startup(Arc::new(AppState::new()));
        let c = recording(&log, "conn");
        ctx.push_cleanup(c.provider, c.cleanup);

        futures::executor::block_on(async move { drop(ctx) });
        assert!(log.lock().is_empty());
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let caught = std::panic::catch_unwind(|| panic!("plain")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "plain");
    }
}
