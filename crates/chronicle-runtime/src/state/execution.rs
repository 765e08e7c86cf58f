//! Execution status and interrupt handling.
//!
//! Interrupting cancels only the active model call's token and flips the
//! status. Tool work already past the network layer is left to finish; its
//! result is dropped when it reaches [`ExecutionControl::accepts_results`].
//! Stopping cancels the root token, and with it every call derived from it.

use chronicle_core::cancel::CancelToken;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::types::ExecutionStatus;

#[derive(Default)]
struct ExecutionInner {
    status: ExecutionStatus,
    active_call: Option<CancelToken>,
}

/// Status plus the cancellation tree of in-flight model calls.
#[derive(Default)]
pub(crate) struct ExecutionControl {
    root: CancelToken,
    inner: Mutex<ExecutionInner>,
}

impl ExecutionControl {
    pub(crate) fn status(&self) -> ExecutionStatus {
        self.inner.lock().status
    }

    pub(crate) fn set_status(&self, status: ExecutionStatus) {
        let mut inner = self.inner.lock();
        if inner.status != status {
            debug!(from = ?inner.status, to = ?status, "execution status changed");
            inner.status = status;
        }
    }

    /// Mark a model call as started and hand out its token.
    pub(crate) fn begin_model_call(&self) -> CancelToken {
        let token = self.root.child();
        let mut inner = self.inner.lock();
        inner.status = ExecutionStatus::Running;
        inner.active_call = Some(token.clone());
        token
    }

    /// Clear the active call without changing status.
    pub(crate) fn end_model_call(&self) {
        let _ = self.inner.lock().active_call.take();
    }

    /// Cancel the active model call. Returns whether one was cancelled.
    pub(crate) fn interrupt(&self) -> bool {
        let active = {
            let mut inner = self.inner.lock();
            inner.status = ExecutionStatus::Interrupted;
            inner.active_call.take()
        };
        let had_call = active.is_some();
        if let Some(token) = active {
            token.cancel();
        }
        info!(had_call, "execution interrupted");
        had_call
    }

    /// Cancel everything and finish.
    pub(crate) fn stop(&self) {
        self.root.cancel();
        let mut inner = self.inner.lock();
        inner.active_call = None;
        inner.status = ExecutionStatus::Finished;
        info!("execution stopped");
    }

    pub(crate) fn accepts_results(&self) -> bool {
        self.status().accepts_results()
    }

    pub(crate) fn root(&self) -> &CancelToken {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_call_runs_then_interrupts() {
        let control = ExecutionControl::default();
        assert_eq!(control.status(), ExecutionStatus::Idle);

        let token = control.begin_model_call();
        assert_eq!(control.status(), ExecutionStatus::Running);
        assert!(control.interrupt());
        assert!(token.is_cancelled());
        assert_eq!(control.status(), ExecutionStatus::Interrupted);
        assert!(!control.accepts_results());
        assert!(!control.root().is_cancelled());
    }

    #[test]
    fn interrupt_without_call_still_flips_status() {
        let control = ExecutionControl::default();
        assert!(!control.interrupt());
        assert_eq!(control.status(), ExecutionStatus::Interrupted);
    }

    #[test]
    fn ended_call_is_not_cancelled_by_interrupt() {
        let control = ExecutionControl::default();
        let token = control.begin_model_call();
        control.end_model_call();
        assert!(!control.interrupt());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn stop_cancels_every_call() {
        let control = ExecutionControl::default();
        let first = control.begin_model_call();
        control.stop();
        assert!(first.is_cancelled());
        assert!(control.begin_model_call().is_cancelled());
    }
}
