//! Mint resolution: authoritative decimals and authorities from the ledger.

use chain_sol::{unpack_mint, Pubkey, TOKEN_PROGRAM_ID};
use tracing::debug;

use crate::error::TokenError;
use crate::network::LedgerClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintInfo {
    pub address: Pubkey,
    pub decimals: u8,
    pub mint_authority: Option<Pubkey>,
    pub freeze_authority: Option<Pubkey>,
    pub supply: u64,
}

impl MintInfo {
    /// Only the mint authority may issue supply.
    pub fn authorize_mint(&self, caller: &Pubkey) -> Result<(), TokenError> {
        match &self.mint_authority {
            Some(authority) if authority == caller => Ok(()),
            Some(authority) => Err(TokenError::Authorization(format!(
                "{caller} is not the mint authority of {} (authority is {authority})",
                self.address
            ))),
            None => Err(TokenError::Authorization(format!(
                "mint {} has no mint authority; supply is fixed",
                self.address
            ))),
        }
    }

    /// The mint's decimals, checked against an optional caller override.
    pub fn decimals_for(&self, requested: Option<u8>) -> Result<u8, TokenError> {
        match requested {
            Some(d) if d != self.decimals => Err(TokenError::validation(
                "decimals",
                format!("mint {} uses {} decimals, not {d}", self.address, self.decimals),
            )),
            _ => Ok(self.decimals),
        }
    }
}

/// Fetch and parse a mint account.
///
/// Missing accounts, accounts not owned by the token program, and data that
/// does not unpack as an initialized mint are all `UnknownMint`.
pub async fn resolve_mint<C: LedgerClient + ?Sized>(
    client: &C,
    mint: &Pubkey,
) -> Result<MintInfo, TokenError> {
    let account = client
        .get_account(mint)
        .await?
        .ok_or_else(|| TokenError::UnknownMint(format!("{mint}: account not found")))?;

    if account.owner != TOKEN_PROGRAM_ID {
        return Err(TokenError::UnknownMint(format!(
            "{mint}: owned by {}, not the token program",
            account.owner
        )));
    }

    let state = unpack_mint(&account.data)
        .map_err(|e| TokenError::UnknownMint(format!("{mint}: {e}")))?;
    if !state.is_initialized {
        return Err(TokenError::UnknownMint(format!("{mint}: not initialized")));
    }

    debug!(mint = %mint.short(), decimals = state.decimals, "resolved mint");

    Ok(MintInfo {
        address: *mint,
        decimals: state.decimals,
        mint_authority: state.mint_authority,
        freeze_authority: state.freeze_authority,
        supply: state.supply,
    })
}
