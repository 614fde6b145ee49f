//! Per-kernel logical-segment-number locks: the cross-thread
//! synchronization primitive a segment-parallel or pipeline-parallel
//! driver uses to serialize access to one kernel while letting different
//! kernels run concurrently.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::Backoff;

/// Sentinel LSN value meaning "this kernel has terminated and will never
/// publish another segment". Ordinary segment numbers never reach this,
/// so any waiter can tell it apart from a real segment boundary.
const TERMINATED: u64 = u64::MAX;

/// One kernel's LSN scalar. A worker claims segment `n` by spinning until
/// `load() == n`, runs the kernel body, then calls `release(n + 1)`.
#[derive(Debug, Default)]
pub struct KernelLsn {
    value: AtomicU64,
}

impl KernelLsn {
    pub fn new() -> Self {
        Self { value: AtomicU64::new(0) }
    }

    /// Busy-waits until this kernel's LSN reaches `segment`, then returns.
    /// Also returns once the LSN is marked terminated: a kernel that has
    /// exited will never publish `segment`, so a downstream waiter must
    /// not block on it forever. Backs off from a tight spin to a thread
    /// yield as contention persists.
    pub fn acquire(&self, segment: u64) {
        let backoff = Backoff::new();
        loop {
            let current = self.value.load(Ordering::Acquire);
            if current == segment || current == TERMINATED {
                return;
            }
            if backoff.is_completed() {
                std::thread::yield_now();
            } else {
                backoff.snooze();
            }
        }
    }

    /// Publishes that this kernel has finished `segment`, letting whoever
    /// is spinning on `segment + 1` proceed. All stores made inside the
    /// critical section happen-before this release.
    pub fn release(&self, next_segment: u64) {
        self.value.store(next_segment, Ordering::Release);
    }

    /// Publishes that this kernel has terminated and releases every
    /// waiter currently spinning on any future segment.
    pub fn release_terminated(&self) {
        self.value.store(TERMINATED, Ordering::Release);
    }

    pub fn current(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    pub fn is_terminated(&self) -> bool {
        self.value.load(Ordering::Acquire) == TERMINATED
    }
}

/// Claims monotonically increasing segment numbers for segment-parallel
/// workers via `fetch_add`.
#[derive(Debug, Default)]
pub struct SegmentCounter {
    next: AtomicU64,
}

impl SegmentCounter {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(0) }
    }

    pub fn claim(&self) -> u64 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_blocks_until_matching_release() {
        let lsn = Arc::new(KernelLsn::new());
        let waiter = {
            let lsn = Arc::clone(&lsn);
            thread::spawn(move || {
                lsn.acquire(1);
                42
            })
        };
        thread::sleep(std::time::Duration::from_millis(20));
        lsn.release(1);
        assert_eq!(waiter.join().unwrap(), 42);
    }

    #[test]
    fn acquire_unblocks_on_termination_sentinel() {
        let lsn = Arc::new(KernelLsn::new());
        let waiter = {
            let lsn = Arc::clone(&lsn);
            thread::spawn(move || {
                lsn.acquire(5);
                7
            })
        };
        thread::sleep(std::time::Duration::from_millis(20));
        lsn.release_terminated();
        assert_eq!(waiter.join().unwrap(), 7);
        assert!(lsn.is_terminated());
    }

    #[test]
    fn segment_counter_hands_out_distinct_numbers() {
        let counter = SegmentCounter::new();
        let a = counter.claim();
        let b = counter.claim();
        assert_ne!(a, b);
    }
}
