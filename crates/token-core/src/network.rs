//! The ledger query and submission interface the engine runs against.
//!
//! [`LedgerClient`] is the only seam between the engine and the network.
//! [`crate::rpc::RpcClient`] implements it over JSON-RPC; tests implement it
//! in memory.

use std::fmt;

use async_trait::async_trait;
use chain_sol::Pubkey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Confirmation depth, ordered from shallowest to deepest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Transaction errors
// ---------------------------------------------------------------------------

/// Error inside a single instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("custom program error {0:#x}")]
    Custom(u32),
    #[error("{0}")]
    Other(String),
}

/// Why the network refused or failed a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("instruction {index} failed: {error}")]
    InstructionError { index: u8, error: InstructionError },

    #[error("insufficient funds for fee")]
    InsufficientFundsForFee,

    #[error("insufficient funds for rent (account {account_index})")]
    InsufficientFundsForRent { account_index: u8 },

    #[error("blockhash not found")]
    BlockhashNotFound,

    #[error("account not found")]
    AccountNotFound,

    #[error("{0}")]
    Other(String),
}

/// Failures talking to the ledger.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node rejected the transaction (for example during preflight).
    #[error("transaction rejected: {0}")]
    Transaction(TransactionError),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

// ---------------------------------------------------------------------------
// Query results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestBlockhash {
    pub blockhash: [u8; 32],
    pub last_valid_block_height: u64,
}

/// Raw account as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountData {
    pub owner: Pubkey,
    pub lamports: u64,
    pub data: Vec<u8>,
}

/// One token account held by an owner, as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccountBalance {
    pub address: Pubkey,
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub confirmation: Option<Commitment>,
    pub err: Option<TransactionError>,
}

/// One entry from the address signature log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub err: Option<TransactionError>,
}

/// Instruction with account indices resolved to keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInstruction {
    pub program_id: Pubkey,
    pub accounts: Vec<Pubkey>,
    pub data: Vec<u8>,
}

/// A token balance of one account before or after a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalanceRecord {
    pub account_index: usize,
    pub mint: Pubkey,
    pub owner: Option<Pubkey>,
    pub amount: u64,
    pub decimals: u8,
}

/// A confirmed transaction with the metadata history needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDetail {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub fee: u64,
    pub err: Option<TransactionError>,
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<RawInstruction>,
    pub pre_token_balances: Vec<TokenBalanceRecord>,
    pub post_token_balances: Vec<TokenBalanceRecord>,
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_latest_blockhash(&self) -> Result<LatestBlockhash, ClientError>;

    async fn get_block_height(&self) -> Result<u64, ClientError>;

    async fn get_minimum_balance_for_rent_exemption(&self, size: usize)
        -> Result<u64, ClientError>;

    /// Native balance in lamports.
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, ClientError>;

    /// `None` when the account does not exist.
    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountData>, ClientError>;

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<TokenAccountBalance>, ClientError>;

    /// Submit a signed wire transaction; returns its signature.
    async fn send_transaction(&self, wire: &[u8]) -> Result<String, ClientError>;

    /// `None` when the network has not seen the signature.
    async fn get_signature_status(
        &self,
        signature: &str,
    ) -> Result<Option<SignatureStatus>, ClientError>;

    /// Newest first, at most `limit`, strictly older than `before`.
    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<SignatureInfo>, ClientError>;

    async fn get_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<TransactionDetail>, ClientError>;
}
