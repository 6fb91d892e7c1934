//! Concurrency gate: bounds simultaneous backend fetches.
//! Callers beyond the limit wait in a FIFO queue and are admitted one per
//! released slot, in arrival order.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error};

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 10;
pub const DEFAULT_CONCURRENCY: usize = 3;

struct GateState {
    active: usize,
    max: usize,
    queue: VecDeque<oneshot::Sender<()>>,
}

impl GateState {
    /// Hand free slots to queued waiters, oldest first. Waiters that gave up
    /// (receiver dropped) are skipped without consuming a slot.
    fn admit_waiting(&mut self) {
        while self.active < self.max {
            let Some(tx) = self.queue.pop_front() else {
                break;
            };
            if tx.send(()).is_ok() {
                self.active += 1;
            }
        }
    }
}

/// Cheap-clone handle to one shared gate.
#[derive(Clone)]
pub struct ConcurrencyGate {
    state: Arc<Mutex<GateState>>,
}

impl ConcurrencyGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                active: 0,
                max: max_concurrent.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
                queue: VecDeque::new(),
            })),
        }
    }

    /// Wait for a slot. Never fails; the returned permit frees the slot on drop.
    pub async fn acquire(&self) -> GatePermit {
        let rx = {
            let mut state = self.state.lock();
            if state.active < state.max && state.queue.is_empty() {
                state.active += 1;
                return GatePermit { gate: self.clone() };
            }
            let (tx, rx) = oneshot::channel();
            state.queue.push_back(tx);
            debug!(queued = state.queue.len(), active = state.active, "gate full, queued");
            rx
        };

        let mut admission = Admission {
            rx,
            gate: self.clone(),
            admitted: false,
        };
        if (&mut admission.rx).await.is_err() {
            // Senders are only consumed through `admit_waiting`; treat a lost
            // sender as a forced admission so the caller still makes progress.
            error!("gate admission channel closed unexpectedly");
            self.state.lock().active += 1;
        }
        admission.admitted = true;
        GatePermit { gate: self.clone() }
    }

    /// Change the limit (clamped to 1..=10) and admit queued callers that now fit.
    /// Lowering the limit never revokes slots already held.
    pub fn set_max_concurrent(&self, max_concurrent: usize) -> usize {
        let mut state = self.state.lock();
        state.max = max_concurrent.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        state.admit_waiting();
        state.max
    }

    pub fn max_concurrent(&self) -> usize {
        self.state.lock().max
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active
    }

    /// Callers still waiting for admission.
    pub fn queue_length(&self) -> usize {
        self.state
            .lock()
            .queue
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        state.admit_waiting();
    }
}

/// A held gate slot.
pub struct GatePermit {
    gate: ConcurrencyGate,
}

impl GatePermit {
    /// Explicit release; equivalent to dropping the permit.
    pub fn release(self) {}
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// Queue ticket for a waiting caller. If the caller is dropped after the gate
/// already granted it a slot, the slot is handed back.
struct Admission {
    rx: oneshot::Receiver<()>,
    gate: ConcurrencyGate,
    admitted: bool,
}

impl Drop for Admission {
    fn drop(&mut self) {
        if self.admitted {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            self.gate.release();
        }
    }
}
