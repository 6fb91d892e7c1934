//! Cache epochs: a generation counter plus a CancellationToken.
//! `clear_cache` advances the epoch, which cancels timers scheduled under the
//! previous epoch and marks any settlement that started before it as stale.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

pub struct CacheEpoch {
    current_token: RwLock<CancellationToken>,
    generation: AtomicU64,
}

impl CacheEpoch {
    pub fn new() -> Self {
        Self {
            current_token: RwLock::new(CancellationToken::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Cancel everything tied to the current epoch and start a new one.
    pub fn advance(&self) -> u64 {
        let mut token_guard = self.current_token.write();
        token_guard.cancel();
        *token_guard = CancellationToken::new();
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Child token and generation for work started now.
    pub fn guard(&self) -> EpochGuard {
        let token_guard = self.current_token.read();
        EpochGuard {
            generation: self.generation.load(Ordering::SeqCst),
            token: token_guard.child_token(),
        }
    }

    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn is_current(&self, guard: &EpochGuard) -> bool {
        self.current() == guard.generation
    }
}

impl Default for CacheEpoch {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the epoch a task was started under.
#[derive(Clone)]
pub struct EpochGuard {
    generation: u64,
    token: CancellationToken,
}

impl EpochGuard {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
