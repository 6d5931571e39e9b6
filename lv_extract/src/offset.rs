use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Component C3. Hands out disjoint half-open windows `[offset,
/// offset+limit)` on demand. Lock-free: a single `AtomicI64` advances
/// monotonically and an `AtomicBool` latches end-of-stream.
#[derive(Debug)]
pub struct OffsetCoordinator {
    next_offset: AtomicI64,
    limit: i64,
    ended: AtomicBool,
}

impl OffsetCoordinator {
    pub fn new(limit: i64) -> Self {
        Self::resuming_at(limit, 0)
    }

    /// Seeds the coordinator at `last_offset`, as the orchestrator does
    /// when resuming from a checkpoint (§4.4 Resume).
    pub fn resuming_at(limit: i64, last_offset: i64) -> Self {
        Self {
            next_offset: AtomicI64::new(last_offset),
            limit,
            ended: AtomicBool::new(false),
        }
    }

    /// Atomically returns the next offset and advances by `limit`, or
    /// `None` once `mark_end` has been observed.
    pub fn claim(&self) -> Option<i64> {
        if self.ended.load(Ordering::Acquire) {
            return None;
        }
        Some(self.next_offset.fetch_add(self.limit, Ordering::AcqRel))
    }

    pub fn mark_end(&self) {
        self.ended.store(true, Ordering::Release);
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn claims_are_disjoint_across_threads() {
        let coordinator = Arc::new(OffsetCoordinator::new(10));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = coordinator.clone();
                std::thread::spawn(move || {
                    let mut claims = Vec::new();
                    for _ in 0..50 {
                        claims.push(c.claim().unwrap());
                    }
                    claims
                })
            })
            .collect();

        let mut all = HashSet::new();
        for h in handles {
            for offset in h.join().unwrap() {
                assert!(all.insert(offset), "offset {offset} claimed twice");
            }
        }
        assert_eq!(all.len(), 400);
    }

    #[test]
    fn claim_returns_none_after_mark_end() {
        let coordinator = OffsetCoordinator::new(10);
        coordinator.claim().unwrap();
        coordinator.mark_end();
        assert!(coordinator.claim().is_none());
        assert!(coordinator.has_ended());
    }

    #[test]
    fn resumes_at_last_offset() {
        let coordinator = OffsetCoordinator::resuming_at(10, 50);
        assert_eq!(coordinator.claim(), Some(50));
        assert_eq!(coordinator.claim(), Some(60));
    }
}
