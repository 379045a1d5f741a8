use common::Triplet;
use crossbeam_channel::{Receiver, unbounded};

/// Unbounded multi-consumer queue of structured work units.
///
/// The queue is fully seeded at construction and closed for writes, so the
/// only states a worker can observe are "one whole triplet" or "empty".
/// A non-blocking pop delivering each unit to exactly one consumer replaces
/// the historical flat queue of raw identifiers, where three consecutive
/// pops under concurrent consumers could interleave triplets.
#[derive(Clone)]
pub struct WorkQueue {
    rx: Receiver<Triplet>,
}

impl WorkQueue {
    pub fn seeded(triplets: &[Triplet]) -> Self {
        let (tx, rx) = unbounded();
        for triplet in triplets {
            // Unbounded channel: send cannot fail while rx is alive.
            let _ = tx.send(triplet.clone());
        }
        Self { rx }
    }

    /// Non-blocking pop; `None` means empty. Absence of work is the worker's
    /// termination signal, never a wait condition.
    pub fn try_pop(&self) -> Option<Triplet> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
