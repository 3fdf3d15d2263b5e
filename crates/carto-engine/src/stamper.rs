use std::sync::atomic::{AtomicU64, Ordering};

/// Server-wide monotonic transaction id source.
///
/// Every routed operation draws a tid; ids are strictly increasing and never
/// reused, giving a total order over mutations. One stamper lives in the
/// shared application state and is passed where needed, never reached
/// through ambient globals.
#[derive(Debug, Default)]
pub struct TidStamper {
    last: AtomicU64,
}

impl TidStamper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next tid.
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Raise the floor to at least `tid`. Used when replaying a journal so
    /// fresh tids continue above everything already persisted.
    pub fn observe(&self, tid: u64) {
        self.last.fetch_max(tid, Ordering::SeqCst);
    }

    /// The most recently issued (or observed) tid.
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}
