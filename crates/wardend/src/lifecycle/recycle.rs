//! Recycle requests: the node's only recovery path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use super::LIFECYCLE_TARGET;
use super::errors::RecycleReason;
use super::schedule::Cancellation;

/// Host capability that tears the node down and relaunches it.
pub trait Recycler: Send + Sync {
    /// Requests a recycle without blocking.
    fn request_recycle(&self, reason: &RecycleReason);
}

impl<T> Recycler for Arc<T>
where
    T: Recycler,
{
    fn request_recycle(&self, reason: &RecycleReason) {
        (**self).request_recycle(reason);
    }
}

/// One-shot latch letting only the first recycle request through.
#[derive(Debug, Clone, Default)]
pub struct RecycleLatch {
    engaged: Arc<AtomicBool>,
}

impl RecycleLatch {
    /// Engages the latch, returning `true` only for the first caller.
    pub fn engage(&self) -> bool {
        !self.engaged.swap(true, Ordering::AcqRel)
    }

    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }
}

/// Recycler that ends the run so the host supervisor restarts the node.
///
/// Requests cancel monitoring; `run_node` then exits with the recycle exit
/// code.
#[derive(Debug, Clone)]
pub struct HostRecycler {
    latch: RecycleLatch,
    cancellation: Cancellation,
}

impl HostRecycler {
    #[must_use]
    pub fn new(cancellation: Cancellation) -> Self {
        Self {
            latch: RecycleLatch::default(),
            cancellation,
        }
    }

    /// Reports whether a recycle has been requested.
    #[must_use]
    pub fn requested(&self) -> bool {
        self.latch.is_engaged()
    }
}

impl Recycler for HostRecycler {
    fn request_recycle(&self, reason: &RecycleReason) {
        if self.latch.engage() {
            warn!(target: LIFECYCLE_TARGET, %reason, "node recycle requested");
        } else {
            debug!(target: LIFECYCLE_TARGET, %reason, "recycle already requested");
        }
        self.cancellation.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::lifecycle::RuntimeFault;

    #[test]
    fn latch_admits_a_single_request_across_threads() {
        let latch = RecycleLatch::default();
        let winners = (0..8)
            .map(|_| {
                let latch = latch.clone();
                thread::spawn(move || latch.engage())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|handle| handle.join().ok())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(latch.is_engaged());
    }

    #[test]
    fn host_recycler_cancels_monitoring() {
        let cancellation = Cancellation::new();
        let recycler = HostRecycler::new(cancellation.clone());
        assert!(!recycler.requested());

        let reason = RecycleReason::Runtime(RuntimeFault::HostReconfigured);
        recycler.request_recycle(&reason);
        recycler.request_recycle(&reason);

        assert!(recycler.requested());
        assert!(cancellation.is_cancelled());
    }
}
