//! Merged transaction history.
//!
//! The reconciler reads the owner's signature log a page at a time, turns
//! each transaction into a [`LedgerEntry`] from its token balance deltas and
//! decoded token instructions, and on the first page folds in the local
//! entries. A transaction that cannot be fetched is dropped; a log that
//! cannot be read degrades to local data with a warning.

use std::collections::BTreeMap;
use std::sync::Arc;

use chain_sol::{decode_token_instruction, Pubkey, TokenInstruction, TOKEN_PROGRAM_ID};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::amount::TokenAmount;
use crate::error::TokenError;
use crate::ledger::LocalLedger;
use crate::network::{LedgerClient, SignatureInfo, TransactionDetail};
use crate::types::{
    EntrySource, HistoryPage, LedgerEntry, OperationKind, OperationStatus, TokenMovement,
};

const DEGRADED_WARNING: &str = "transaction history unavailable; showing local activity only";

pub struct LedgerReconciler<'a, C: ?Sized> {
    client: &'a C,
    ledger: &'a LocalLedger,
}

impl<'a, C: LedgerClient + ?Sized> LedgerReconciler<'a, C> {
    pub fn new(client: &'a C, ledger: &'a LocalLedger) -> Self {
        Self { client, ledger }
    }

    /// One page of history for `owner`, strictly older than `cursor`.
    ///
    /// Without a cursor this is the first page and includes every local
    /// entry not already represented by a chain entry.
    pub async fn page(
        &self,
        owner: &Pubkey,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<HistoryPage, TokenError> {
        if limit == 0 {
            return Err(TokenError::validation("limit", "must be at least 1"));
        }
        let first_page = cursor.is_none();

        let signatures = match self
            .client
            .get_signatures_for_address(owner, limit, cursor)
            .await
        {
            Ok(signatures) => signatures,
            Err(e) => {
                warn!(owner = %owner.short(), error = %e, "signature log unavailable");
                return Ok(self.degraded(first_page, limit));
            }
        };
        debug!(owner = %owner.short(), count = signatures.len(), ?cursor, "fetched signatures");

        let has_more = signatures.len() == limit;
        let next_cursor = if has_more {
            signatures.last().map(|s| s.signature.clone())
        } else {
            None
        };

        let chain = self.fetch_entries(owner, &signatures).await;
        let entries = if first_page {
            merge_first_page(self.ledger.entries(), chain)
        } else {
            chain
        };

        Ok(HistoryPage {
            entries,
            next_cursor,
            has_more,
            warning: None,
        })
    }

    async fn fetch_entries(&self, owner: &Pubkey, signatures: &[SignatureInfo]) -> Vec<LedgerEntry> {
        let details = join_all(
            signatures
                .iter()
                .map(|info| self.client.get_transaction(&info.signature)),
        )
        .await;

        signatures
            .iter()
            .zip(details)
            .filter_map(|(info, detail)| match detail {
                Ok(Some(detail)) => Some(entry_from_transaction(&detail, owner)),
                Ok(None) => {
                    warn!(signature = %info.signature, "transaction not found; dropped");
                    None
                }
                Err(e) => {
                    warn!(signature = %info.signature, error = %e, "transaction fetch failed; dropped");
                    None
                }
            })
            .collect()
    }

    fn degraded(&self, first_page: bool, limit: usize) -> HistoryPage {
        let entries = if first_page {
            self.ledger.entries().into_iter().take(limit).collect()
        } else {
            Vec::new()
        };
        HistoryPage {
            entries,
            next_cursor: None,
            has_more: false,
            warning: Some(DEGRADED_WARNING.to_string()),
        }
    }
}

/// Describe a chain transaction from `owner`'s point of view.
///
/// Classification order: a mint initialization is a Create, a mint-to is a
/// MintTo, then the owner's balance deltas decide Received, Sent or Swap, and
/// a token transfer with no owner delta is a Transfer. Anything else is Other.
pub fn entry_from_transaction(detail: &TransactionDetail, owner: &Pubkey) -> LedgerEntry {
    let movements = owner_movements(detail, owner);

    let mut initialized_mint = None;
    let mut minted = None;
    let mut transferred = None;
    for ix in detail.instructions.iter().filter(|ix| ix.program_id == TOKEN_PROGRAM_ID) {
        match decode_token_instruction(&ix.data) {
            Ok(TokenInstruction::InitializeMint { decimals, .. }) => {
                initialized_mint = ix.accounts.first().map(|mint| (*mint, decimals));
            }
            Ok(TokenInstruction::MintTo { amount })
            | Ok(TokenInstruction::MintToChecked { amount, .. }) => {
                minted = ix.accounts.first().map(|mint| (*mint, amount));
            }
            Ok(TokenInstruction::Transfer { amount })
            | Ok(TokenInstruction::TransferChecked { amount, .. }) => {
                transferred = Some(amount);
            }
            _ => {}
        }
    }

    let gained = movements.iter().any(|m| m.delta > 0);
    let lost = movements.iter().any(|m| m.delta < 0);

    let kind = if initialized_mint.is_some() {
        OperationKind::Create
    } else if minted.is_some() {
        OperationKind::MintTo
    } else if gained && lost {
        OperationKind::Swap
    } else if gained {
        OperationKind::Received
    } else if lost {
        OperationKind::Sent
    } else if transferred.is_some() {
        OperationKind::Transfer
    } else {
        OperationKind::Other
    };

    // The largest owner movement names the token; otherwise fall back to
    // what the instructions say.
    let headline = movements.iter().max_by_key(|m| m.delta.unsigned_abs());
    let (mint, amount) = match (headline, minted, initialized_mint) {
        (Some(m), _, _) => (
            Some(m.mint),
            u64::try_from(m.delta.unsigned_abs())
                .ok()
                .map(|raw| TokenAmount::new(raw, m.decimals)),
        ),
        (None, Some((mint, raw)), _) => (
            Some(mint),
            decimals_of(detail, &mint).map(|d| TokenAmount::new(raw, d)),
        ),
        (None, None, Some((mint, decimals))) => (Some(mint), Some(TokenAmount::new(0, decimals))),
        (None, None, None) => (None, None),
    };

    let mut counterparties: Vec<Pubkey> = Vec::new();
    for record in detail.post_token_balances.iter().chain(&detail.pre_token_balances) {
        if let Some(other) = record.owner {
            if other != *owner && !counterparties.contains(&other) {
                counterparties.push(other);
            }
        }
    }

    LedgerEntry {
        id: detail.signature.clone(),
        source: EntrySource::Chain,
        timestamp: detail.block_time,
        kind,
        status: if detail.err.is_some() {
            OperationStatus::Failed
        } else {
            OperationStatus::Success
        },
        mint,
        amount,
        counterparties,
        signature: detail.signature.clone(),
        fee: Some(detail.fee),
        movements,
    }
}

/// Nonzero balance changes of token accounts owned by `owner`. An account
/// absent before or after the transaction held zero at that point.
fn owner_movements(detail: &TransactionDetail, owner: &Pubkey) -> Vec<TokenMovement> {
    // account index -> (mint, decimals, pre, post)
    let mut balances: BTreeMap<usize, (Pubkey, u8, u64, u64)> = BTreeMap::new();
    for record in detail
        .pre_token_balances
        .iter()
        .filter(|r| r.owner.as_ref() == Some(owner))
    {
        balances.insert(record.account_index, (record.mint, record.decimals, record.amount, 0));
    }
    for record in detail
        .post_token_balances
        .iter()
        .filter(|r| r.owner.as_ref() == Some(owner))
    {
        balances
            .entry(record.account_index)
            .or_insert((record.mint, record.decimals, 0, 0))
            .3 = record.amount;
    }

    balances
        .into_iter()
        .filter_map(|(index, (mint, decimals, pre, post))| {
            let delta = i128::from(post) - i128::from(pre);
            if delta == 0 {
                return None;
            }
            Some(TokenMovement {
                mint,
                account: detail.account_keys.get(index).copied().unwrap_or_default(),
                delta,
                decimals,
            })
        })
        .collect()
}

fn decimals_of(detail: &TransactionDetail, mint: &Pubkey) -> Option<u8> {
    detail
        .post_token_balances
        .iter()
        .chain(&detail.pre_token_balances)
        .find(|r| r.mint == *mint)
        .map(|r| r.decimals)
}

/// Fold local entries into the first chain page.
///
/// A local entry whose signature the chain already reports is dropped; the
/// chain entry keeps its timestamp, fee and movements but takes the local
/// operation kind, so the session's own Transfer stays a Transfer rather
/// than a Sent. The result is ordered newest first, local entries ahead of
/// chain entries with the same timestamp.
pub fn merge_first_page(local: Vec<LedgerEntry>, mut chain: Vec<LedgerEntry>) -> Vec<LedgerEntry> {
    let local: Vec<LedgerEntry> = local
        .into_iter()
        .filter(|entry| match chain.iter_mut().find(|c| c.signature == entry.signature) {
            Some(seen) => {
                seen.kind = entry.kind;
                false
            }
            None => true,
        })
        .collect();

    let mut merged = local;
    merged.append(&mut chain);
    // Stable, so ties keep local-before-chain and each side's own order.
    merged.sort_by(|a, b| b.timestamp.unwrap_or(0).cmp(&a.timestamp.unwrap_or(0)));
    merged
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagerState {
    Start,
    More(String),
    Exhausted,
}

/// Walks history page by page: `Start → More(cursor) → … → Exhausted`.
pub struct HistoryPager<C: ?Sized> {
    client: Arc<C>,
    ledger: Arc<LocalLedger>,
    owner: Pubkey,
    page_size: usize,
    state: PagerState,
}

impl<C: LedgerClient + ?Sized> HistoryPager<C> {
    pub fn new(client: Arc<C>, ledger: Arc<LocalLedger>, owner: Pubkey, page_size: usize) -> Self {
        Self {
            client,
            ledger,
            owner,
            page_size,
            state: PagerState::Start,
        }
    }

    pub fn state(&self) -> &PagerState {
        &self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == PagerState::Exhausted
    }

    /// The next page, or `None` once history is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<HistoryPage>, TokenError> {
        let cursor = match &self.state {
            PagerState::Start => None,
            PagerState::More(cursor) => Some(cursor.clone()),
            PagerState::Exhausted => return Ok(None),
        };

        let reconciler = LedgerReconciler::new(self.client.as_ref(), self.ledger.as_ref());
        let page = reconciler
            .page(&self.owner, cursor.as_deref(), self.page_size)
            .await?;

        self.state = match (&page.next_cursor, page.has_more) {
            (Some(next), true) => PagerState::More(next.clone()),
            _ => PagerState::Exhausted,
        };
        Ok(Some(page))
    }
}
