//! SPL token orchestration and ledger reconciliation.
//!
//! [`TokenEngine`] creates tokens, mints and transfers them on behalf of a
//! [`WalletSigner`], and reports balances and history merged from the chain
//! and a session-local ledger. All ledger access goes through the
//! [`LedgerClient`] trait: [`RpcClient`] talks JSON-RPC to a cluster,
//! [`MemoryLedger`] simulates one in process.

pub mod amount;
pub mod balance;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod ledger;
pub mod locks;
pub mod memory;
pub mod mint;
pub mod network;
pub mod rpc;
pub mod signer;
pub mod submit;
pub mod types;
pub mod validate;

pub use amount::{TokenAmount, UiAmount};
pub use balance::{aggregate, BalanceAggregator};
pub use builder::{BuiltTransaction, TransactionBuilder};
pub use config::{Cluster, ConfirmationPolicy, EngineConfig};
pub use engine::TokenEngine;
pub use error::{NetworkFailure, TokenError};
pub use history::{entry_from_transaction, merge_first_page, HistoryPager, LedgerReconciler, PagerState};
pub use ledger::{LocalLedger, LocalToken, NewEntry};
pub use memory::{ConfirmationMode, MemoryLedger};
pub use mint::{resolve_mint, MintInfo};
pub use network::{ClientError, Commitment, LedgerClient};
pub use rpc::RpcClient;
pub use signer::{KeypairSigner, SignerError, WalletSigner};
pub use submit::{classify_transaction_error, Confirmed, SubmissionCoordinator};
pub use types::*;
pub use validate::validate_request;
