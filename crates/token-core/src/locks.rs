//! Per-mint serialization of state-changing operations.
//!
//! Mint and Transfer hold the lock for their mint from the balance read
//! through the overlay update, so two operations on the same token never
//! interleave. Different mints proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chain_sol::Pubkey;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct MintLocks {
    locks: Mutex<HashMap<Pubkey, Arc<AsyncMutex<()>>>>,
}

impl MintLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `mint`. Released when the guard drops.
    pub async fn acquire(&self, mint: &Pubkey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(*mint).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of mints that have been locked at least once.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
