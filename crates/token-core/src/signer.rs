//! The caller's signing capability.
//!
//! The engine never holds the caller's secret key directly; it asks a
//! [`WalletSigner`] for a signature over the exact message bytes. A browser
//! wallet or hardware device sits behind this trait in production;
//! [`KeypairSigner`] covers local keypair files and tests.

use std::path::Path;

use async_trait::async_trait;
use chain_sol::{Keypair, Pubkey};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum SignerError {
    /// The user declined to sign.
    #[error("signing request rejected")]
    Rejected,

    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// The identity that pays fees and owns balances.
    fn pubkey(&self) -> Pubkey;

    /// Sign a serialized transaction message.
    async fn sign_message(&self, message: &[u8]) -> Result<[u8; 64], SignerError>;
}

/// Signs with a keypair held in memory.
#[derive(Debug)]
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Parse the JSON byte-array keypair format (`[12, 34, ...]`, 64 numbers).
    pub fn from_json(json: &str) -> Result<Self, SignerError> {
        let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
            serde_json::from_str(json)
                .map_err(|e| SignerError::Unavailable(format!("invalid keypair json: {e}")))?,
        );
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| SignerError::Unavailable(e.to_string()))?;
        Ok(Self { keypair })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SignerError> {
        let path = path.as_ref();
        let json = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            SignerError::Unavailable(format!("cannot read {}: {e}", path.display()))
        })?);
        Self::from_json(&json)
    }
}

#[async_trait]
impl WalletSigner for KeypairSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<[u8; 64], SignerError> {
        Ok(self.keypair.sign(message))
    }
}
