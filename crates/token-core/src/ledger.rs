//! Session-scoped local ledger.
//!
//! Tracks tokens created in this session, their advisory overlay balances,
//! and locally originated history entries. Nothing here survives the
//! process; chain data supersedes it wherever both exist.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use chain_sol::Pubkey;

use crate::amount::TokenAmount;
use crate::types::{
    EntrySource, LedgerEntry, OperationKind, OperationStatus, TokenDescriptor,
};

/// A token this session created, with its overlay balance in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalToken {
    pub descriptor: TokenDescriptor,
    pub balance: u64,
}

/// Input for [`LocalLedger::add_entry`]; id and timestamp are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub mint: Option<Pubkey>,
    pub amount: Option<TokenAmount>,
    pub counterparties: Vec<Pubkey>,
    pub signature: Option<String>,
    pub fee: Option<u64>,
}

#[derive(Default)]
struct State {
    tokens: HashMap<Pubkey, LocalToken>,
    /// Newest first.
    entries: Vec<LedgerEntry>,
    next_id: u64,
}

#[derive(Default)]
pub struct LocalLedger {
    state: RwLock<State>,
}

impl LocalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // Every writer makes one assignment, so a poisoned lock still guards
    // consistent state.
    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a newly created token with its initial overlay balance.
    pub fn add_token(&self, descriptor: TokenDescriptor, initial_balance: u64) {
        let mint = descriptor.mint;
        self.write().tokens.insert(
            mint,
            LocalToken {
                descriptor,
                balance: initial_balance,
            },
        );
    }

    pub fn token(&self, mint: &Pubkey) -> Option<LocalToken> {
        self.read().tokens.get(mint).cloned()
    }

    /// All local tokens, oldest first.
    pub fn tokens(&self) -> Vec<LocalToken> {
        let mut tokens: Vec<LocalToken> = self.read().tokens.values().cloned().collect();
        tokens.sort_by(|a, b| {
            a.descriptor
                .created_at
                .cmp(&b.descriptor.created_at)
                .then(a.descriptor.mint.cmp(&b.descriptor.mint))
        });
        tokens
    }

    pub fn balance(&self, mint: &Pubkey) -> Option<u64> {
        self.read().tokens.get(mint).map(|t| t.balance)
    }

    /// Replace the overlay balance. Returns `false` (and does nothing) when
    /// the mint is not a local token.
    pub fn update_balance(&self, mint: &Pubkey, new_balance: u64) -> bool {
        match self.write().tokens.get_mut(mint) {
            Some(token) => {
                token.balance = new_balance;
                true
            }
            None => false,
        }
    }

    /// Prepend an entry stamped with the current time.
    pub fn add_entry(&self, entry: NewEntry) -> LedgerEntry {
        self.add_entry_at(entry, unix_now())
    }

    /// Prepend an entry with an explicit timestamp.
    pub fn add_entry_at(&self, entry: NewEntry, timestamp: i64) -> LedgerEntry {
        let mut state = self.write();
        state.next_id += 1;
        let id = format!("local-{}", state.next_id);

        let record = LedgerEntry {
            signature: entry.signature.unwrap_or_else(|| id.clone()),
            id,
            source: EntrySource::Local,
            timestamp: Some(timestamp),
            kind: entry.kind,
            status: entry.status,
            mint: entry.mint,
            amount: entry.amount,
            counterparties: entry.counterparties,
            fee: entry.fee,
            movements: Vec::new(),
        };
        state.entries.insert(0, record.clone());
        record
    }

    /// Local entries, newest first.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.read().entries.clone()
    }

    pub fn entry_count(&self) -> usize {
        self.read().entries.len()
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
