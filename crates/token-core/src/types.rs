use std::fmt;

use chain_sol::Pubkey;
use serde::{Deserialize, Serialize};

use crate::amount::{TokenAmount, UiAmount};

/// What an operation or history entry did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    MintTo,
    Transfer,
    /// Chain-derived: the owner's token balance went up.
    Received,
    /// Chain-derived: the owner's token balance went down.
    Sent,
    /// Chain-derived: some balances went up and others down.
    Swap,
    Other,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Create => "create",
            OperationKind::MintTo => "mint_to",
            OperationKind::Transfer => "transfer",
            OperationKind::Received => "received",
            OperationKind::Sent => "sent",
            OperationKind::Swap => "swap",
            OperationKind::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    Failed,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Unvalidated operation input, exactly as a form would hand it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRequest {
    Create {
        name: String,
        symbol: String,
        decimals: String,
        initial_supply: String,
        description: Option<String>,
    },
    MintTo {
        mint: String,
        recipient: String,
        amount: String,
        decimals: Option<String>,
    },
    Transfer {
        mint: String,
        recipient: String,
        amount: String,
        decimals: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub initial_supply: UiAmount,
    pub description: Option<String>,
}

/// Shared by MintTo and Transfer: an amount of `mint` bound for `recipient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub mint: Pubkey,
    pub recipient: Pubkey,
    pub amount: UiAmount,
    /// Must equal the mint's decimals when given.
    pub decimals: Option<u8>,
}

/// A validated operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationRequest {
    Create(CreateRequest),
    MintTo(MovementRequest),
    Transfer(MovementRequest),
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Create(_) => OperationKind::Create,
            OperationRequest::MintTo(_) => OperationKind::MintTo,
            OperationRequest::Transfer(_) => OperationKind::Transfer,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of one submitted and confirmed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub kind: OperationKind,
    pub signature: String,
    pub status: OperationStatus,
    /// `None` when the fee could not be read back from the ledger.
    pub fee_paid: Option<u64>,
    pub explorer_url: String,
    pub mint: Pubkey,
    pub amount: TokenAmount,
}

/// A token created in this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub mint: Pubkey,
    pub decimals: u8,
    pub symbol: String,
    pub name: String,
    pub description: Option<String>,
    pub mint_authority: Pubkey,
    /// Unix seconds.
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    Chain,
    Local,
}

/// A change of one token account's balance inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMovement {
    pub mint: Pubkey,
    pub account: Pubkey,
    pub delta: i128,
    pub decimals: u8,
}

/// One row of the merged history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub source: EntrySource,
    /// Unix seconds; chain entries may lack a block time.
    pub timestamp: Option<i64>,
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub mint: Option<Pubkey>,
    pub amount: Option<TokenAmount>,
    pub counterparties: Vec<Pubkey>,
    pub signature: String,
    pub fee: Option<u64>,
    pub movements: Vec<TokenMovement>,
}

/// One page of history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub entries: Vec<LedgerEntry>,
    /// Pass back to fetch the next (older) page.
    pub next_cursor: Option<String>,
    pub has_more: bool,
    /// Set when the chain could not be queried and local data was returned.
    pub warning: Option<String>,
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceOrigin {
    Chain,
    Local,
}

/// Balance of one mint, combining the chain reading and the local overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub mint: Pubkey,
    pub on_chain_amount: Option<u64>,
    pub local_overlay_amount: Option<u64>,
    pub decimals: u8,
    pub origin: BalanceOrigin,
    /// Present for tokens created in this session.
    pub symbol: Option<String>,
}

impl BalanceSnapshot {
    /// The displayed amount: chain when present, otherwise the overlay.
    pub fn amount(&self) -> TokenAmount {
        let raw = match self.origin {
            BalanceOrigin::Chain => self.on_chain_amount,
            BalanceOrigin::Local => self.local_overlay_amount,
        };
        TokenAmount::new(raw.unwrap_or(0), self.decimals)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub owner: Pubkey,
    pub native_lamports: u64,
    /// Sorted by mint address.
    pub tokens: Vec<BalanceSnapshot>,
    /// Native balance is under the configured fee budget.
    pub below_fee_budget: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_kind_display_matches_serde() {
        for kind in [
            OperationKind::Create,
            OperationKind::MintTo,
            OperationKind::Transfer,
            OperationKind::Received,
            OperationKind::Sent,
            OperationKind::Swap,
            OperationKind::Other,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn request_kind() {
        let req = OperationRequest::Transfer(MovementRequest {
            mint: Pubkey::new([1; 32]),
            recipient: Pubkey::new([2; 32]),
            amount: UiAmount::parse("1").unwrap(),
            decimals: None,
        });
        assert_eq!(req.kind(), OperationKind::Transfer);
    }

    #[test]
    fn snapshot_amount_prefers_origin_source() {
        let chain = BalanceSnapshot {
            mint: Pubkey::new([1; 32]),
            on_chain_amount: Some(700),
            local_overlay_amount: Some(900),
            decimals: 2,
            origin: BalanceOrigin::Chain,
            symbol: None,
        };
        assert_eq!(chain.amount(), TokenAmount::new(700, 2));

        let local = BalanceSnapshot {
            origin: BalanceOrigin::Local,
            on_chain_amount: None,
            ..chain
        };
        assert_eq!(local.amount().to_string(), "9");
    }
}
