use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU8, Ordering},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl BatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => BatchState::Running,
            2 => BatchState::Completed,
            3 => BatchState::Cancelled,
            4 => BatchState::Failed,
            _ => BatchState::Idle,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchState::Completed | BatchState::Cancelled | BatchState::Failed
        )
    }
}

#[derive(Default)]
struct ControlState {
    state: AtomicU8,
    cancel_requested: AtomicBool,
}

/// Handle for observing and cancelling a batch from another task or thread.
#[derive(Clone, Default)]
pub struct BatchControl {
    inner: Arc<ControlState>,
}

impl BatchControl {
    /// Asks the running batch to stop before its next item.
    pub fn cancel(&self) {
        self.inner.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn state(&self) -> BatchState {
        BatchState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_processing(&self) -> bool {
        self.state() == BatchState::Running
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::SeqCst)
    }

    /// Moves to `Running` unless a run is already in progress. Clears any
    /// cancel request left over from an earlier run.
    pub(crate) fn try_begin(&self) -> bool {
        let running = BatchState::Running as u8;
        let mut current = self.inner.state.load(Ordering::SeqCst);
        loop {
            if current == running {
                return false;
            }
            match self.inner.state.compare_exchange(
                current,
                running,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.inner.cancel_requested.store(false, Ordering::SeqCst);
        true
    }

    /// `try_begin` that hands back a guard. If the run is dropped before it
    /// reaches a terminal state, the guard marks it `Cancelled` so later runs
    /// are not locked out.
    pub(crate) fn begin(&self) -> Option<RunGuard<'_>> {
        self.try_begin().then(|| RunGuard { control: self })
    }

    pub(crate) fn finish(&self, state: BatchState) {
        self.inner.state.store(state as u8, Ordering::SeqCst);
    }
}

pub(crate) struct RunGuard<'a> {
    control: &'a BatchControl,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.control.is_processing() {
            log::warn!("Batch run dropped before finishing, marking it cancelled");
            self.control.finish(BatchState::Cancelled);
        }
    }
}

impl std::fmt::Debug for BatchControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchControl")
            .field("state", &self.state())
            .field("cancel_requested", &self.is_cancel_requested())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let control = BatchControl::default();
        assert_eq!(control.state(), BatchState::Idle);

        control.cancel();
        assert!(control.try_begin());
        assert!(!control.is_cancel_requested());
        assert!(control.is_processing());
        assert!(!control.clone().try_begin());

        control.cancel();
        assert!(control.is_cancel_requested());
        control.finish(BatchState::Cancelled);
        assert!(control.state().is_terminal());
        assert!(!control.is_processing());
        assert!(control.try_begin());
    }

    #[test]
    fn dropped_guard_releases_the_run() {
        let control = BatchControl::default();
        {
            let _guard = control.begin().unwrap();
            assert!(control.begin().is_none());
        }
        assert_eq!(control.state(), BatchState::Cancelled);

        let guard = control.begin().unwrap();
        control.finish(BatchState::Completed);
        drop(guard);
        assert_eq!(control.state(), BatchState::Completed);
    }
}
