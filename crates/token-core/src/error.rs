use thiserror::Error;

use crate::network::ClientError;
use crate::signer::SignerError;

/// Every failure an operation, history query or balance query can surface.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Unknown mint: {0}")]
    UnknownMint(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Insufficient native balance: {0}")]
    InsufficientNativeBalance(String),

    #[error("Insufficient token balance: {0}")]
    InsufficientTokenBalance(String),

    #[error("Request rejected by the signer")]
    UserRejected,

    #[error("Network error: {0}")]
    Network(#[from] NetworkFailure),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// The ways the network side of an operation can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkFailure {
    #[error("blockhash expired before the transaction was confirmed")]
    BlockhashExpired,

    #[error("transaction not confirmed after {attempts} status checks")]
    ConfirmationTimeout { attempts: u32 },

    #[error("rpc request failed: {0}")]
    Rpc(String),
}

impl TokenError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        TokenError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Short stable name for the error class, used in logs and the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Validation { .. } => "validation",
            TokenError::UnknownMint(_) => "unknown_mint",
            TokenError::Authorization(_) => "authorization",
            TokenError::InsufficientNativeBalance(_) => "insufficient_native_balance",
            TokenError::InsufficientTokenBalance(_) => "insufficient_token_balance",
            TokenError::UserRejected => "user_rejected",
            TokenError::Network(_) => "network",
            TokenError::Cancelled => "cancelled",
            TokenError::Unknown(_) => "unknown",
        }
    }
}

impl From<chain_sol::SolError> for TokenError {
    fn from(e: chain_sol::SolError) -> Self {
        TokenError::Unknown(format!("SOL: {e}"))
    }
}

impl From<SignerError> for TokenError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::Rejected => TokenError::UserRejected,
            SignerError::Unavailable(msg) => TokenError::Unknown(format!("signer unavailable: {msg}")),
        }
    }
}

/// Transport-level client failures. Transaction-level failures need the
/// compiled message to be classified and are handled by the coordinator.
impl From<ClientError> for TokenError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Transport(msg) => TokenError::Network(NetworkFailure::Rpc(msg)),
            ClientError::Rpc { code, message } => {
                TokenError::Network(NetworkFailure::Rpc(format!("{code}: {message}")))
            }
            ClientError::Transaction(err) => TokenError::Unknown(err.to_string()),
            ClientError::InvalidResponse(msg) => {
                TokenError::Unknown(format!("invalid rpc response: {msg}"))
            }
        }
    }
}
