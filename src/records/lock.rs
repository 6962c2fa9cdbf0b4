//! Per-client exclusivity between recalculation and incremental checks
//!
//! Checks share a client; a recalculation needs it alone. The lock state
//! lives in the store so every process using it sees the same claims.
//! Conflicts fail fast with `RecordError::ClientBusy` instead of waiting.

use std::fmt;

use anyhow::Result;
use tracing::{debug, error};

use super::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Incremental checks, any number at once
    Shared,
    /// Recalculation, nobody else
    Exclusive,
}

impl LockMode {
    /// Column value used by the store
    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Shared => "check",
            LockMode::Exclusive => "recalculate",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claim on a client, released through the store on drop
pub struct ClientGuard<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    client_id: String,
    mode: LockMode,
}

impl<'a, S: RecordStore + ?Sized> ClientGuard<'a, S> {
    pub fn acquire(store: &'a S, client_id: &str, mode: LockMode) -> Result<Self> {
        store.acquire_client(client_id, mode)?;
        debug!("Client {} claimed for {}", client_id, mode);
        Ok(Self {
            store,
            client_id: client_id.to_string(),
            mode,
        })
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl<S: RecordStore + ?Sized> Drop for ClientGuard<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_client(&self.client_id, self.mode) {
            error!("Failed to release {} claim on {}: {:#}", self.mode, self.client_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordError;
    use crate::records::testing::MemoryStore;

    fn is_busy(result: Result<ClientGuard<'_, MemoryStore>>) -> bool {
        match result {
            Err(e) => matches!(e.downcast_ref::<RecordError>(), Some(RecordError::ClientBusy { .. })),
            Ok(_) => false,
        }
    }

    #[test]
    fn test_checks_share_a_client() {
        let store = MemoryStore::default();
        let a = ClientGuard::acquire(&store, "c1", LockMode::Shared).unwrap();
        let b = ClientGuard::acquire(&store, "c1", LockMode::Shared).unwrap();
        assert!(is_busy(ClientGuard::acquire(&store, "c1", LockMode::Exclusive)));

        drop(a);
        assert!(is_busy(ClientGuard::acquire(&store, "c1", LockMode::Exclusive)));
        drop(b);
        let guard = ClientGuard::acquire(&store, "c1", LockMode::Exclusive).unwrap();
        assert_eq!(guard.mode(), LockMode::Exclusive);
    }

    #[test]
    fn test_recalculation_excludes_everyone() {
        let store = MemoryStore::default();
        let guard = ClientGuard::acquire(&store, "c1", LockMode::Exclusive).unwrap();
        assert!(is_busy(ClientGuard::acquire(&store, "c1", LockMode::Shared)));
        assert!(is_busy(ClientGuard::acquire(&store, "c1", LockMode::Exclusive)));
        assert!(ClientGuard::acquire(&store, "c2", LockMode::Shared).is_ok());

        drop(guard);
        assert!(ClientGuard::acquire(&store, "c1", LockMode::Shared).is_ok());
    }
}
