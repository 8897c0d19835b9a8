//! Revocation registry for bearer tokens invalidated before their expiry.
//!
//! The store is injectable so a multi-instance deployment can plug in an
//! external backend. The default in-memory store is process-local: it does
//! not survive restarts and is not shared across instances, so revocation
//! only holds on a single-instance deployment.

use std::collections::HashSet;
use std::sync::Mutex;
use tracing::warn;

/// Default number of revoked tokens held before the wholesale clear.
pub const DEFAULT_REVOCATION_CAPACITY: usize = 1000;

/// Set of tokens explicitly invalidated before their natural expiry.
///
/// `revoke` is idempotent: revoking an already-revoked token is a no-op.
pub trait RevocationStore: Send + Sync {
    fn revoke(&self, token: &str);
    fn is_revoked(&self, token: &str) -> bool;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory registry with a capacity-triggered wholesale clear.
///
/// When the set is full, the *entire* set is emptied before the next insert.
/// Prior revocations are silently forgotten at that point; a forgotten token
/// passes verification again until its own expiry elapses. Lossy by design
/// (see DESIGN.md) and pinned by tests.
pub struct InMemoryRevocationStore {
    capacity: usize,
    revoked: Mutex<HashSet<String>>,
}

impl InMemoryRevocationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REVOCATION_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            revoked: Mutex::new(HashSet::new()),
        }
    }
}

impl Default for InMemoryRevocationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RevocationStore for InMemoryRevocationStore {
    fn revoke(&self, token: &str) {
        let Ok(mut revoked) = self.revoked.lock() else {
            warn!("Revocation registry lock poisoned, dropping revocation");
            return;
        };

        if revoked.len() >= self.capacity {
            warn!(
                dropped = revoked.len(),
                "Revocation registry full, clearing all prior revocations"
            );
            revoked.clear();
        }

        revoked.insert(token.to_string());
    }

    fn is_revoked(&self, token: &str) -> bool {
        self.revoked
            .lock()
            .map(|revoked| revoked.contains(token))
            .unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.revoked.lock().map(|revoked| revoked.len()).unwrap_or(0)
    }
}
