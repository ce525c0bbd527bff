use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const ABANDONED: u8 = 2;
const COMMITTED: u8 = 3;

/// Shared between an async caller and the blocking write it started.
///
/// The caller abandons the gate when it stops waiting. The write claims the
/// gate once it holds the connection and again right before commit, so a
/// write whose caller has given up is never started or is rolled back.
#[derive(Debug, Clone, Default)]
pub struct WriteGate(Arc<AtomicU8>);

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the write. False if the caller already gave up.
    pub fn begin(&self) -> bool {
        self.advance(PENDING, RUNNING)
    }

    /// Claim the commit. False if the caller gave up while the write ran.
    pub fn commit(&self) -> bool {
        self.advance(RUNNING, COMMITTED)
    }

    /// Give up on the write. Returns true if it had already committed.
    pub fn abandon(&self) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current == COMMITTED {
                return true;
            }
            match self
                .0
                .compare_exchange(current, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return false,
                Err(actual) => current = actual,
            }
        }
    }

    fn advance(&self, from: u8, to: u8) -> bool {
        self.0
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
