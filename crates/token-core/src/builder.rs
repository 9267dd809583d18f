//! Turns validated requests into instruction sequences.
//!
//! The builder reads ledger state (account existence, balances, rent) but
//! never changes it. For Create it generates the new mint's keypair, which
//! travels with the instructions as a required co-signer.

use chain_sol::{
    build_create_account, build_create_associated_token_account_idempotent,
    build_initialize_mint, build_mint_to, build_spl_transfer, derive_associated_token_address,
    unpack_token_account, Keypair, Pubkey, SolInstruction, MINT_SIZE, TOKEN_ACCOUNT_SIZE,
    TOKEN_PROGRAM_ID,
};
use tracing::debug;

use crate::amount::TokenAmount;
use crate::error::TokenError;
use crate::network::LedgerClient;
use crate::types::{CreateRequest, OperationKind};

/// Instructions ready for signing, plus what the coordinator needs to know.
#[derive(Debug)]
pub struct BuiltTransaction {
    pub kind: OperationKind,
    pub instructions: Vec<SolInstruction>,
    /// Locally generated keys that must sign before the caller does.
    pub co_signers: Vec<Keypair>,
    pub mint: Pubkey,
    pub amount: TokenAmount,
    /// Lamports the payer funds into new accounts (rent exemption).
    pub rent_lamports: u64,
}

pub struct TransactionBuilder<'a, C: ?Sized> {
    client: &'a C,
    payer: Pubkey,
}

impl<'a, C: LedgerClient + ?Sized> TransactionBuilder<'a, C> {
    pub fn new(client: &'a C, payer: Pubkey) -> Self {
        Self { client, payer }
    }

    /// Create a mint with the payer as mint and freeze authority, and
    /// optionally mint `initial_supply` into the payer's associated account.
    pub async fn create(&self, request: &CreateRequest) -> Result<BuiltTransaction, TokenError> {
        let supply = request.initial_supply.to_raw(request.decimals)?;
        let mint_keypair = Keypair::generate();
        let mint = mint_keypair.pubkey();

        let mint_rent = self
            .client
            .get_minimum_balance_for_rent_exemption(MINT_SIZE)
            .await?;

        let mut instructions = vec![
            build_create_account(
                &self.payer,
                &mint,
                mint_rent,
                MINT_SIZE as u64,
                &TOKEN_PROGRAM_ID,
            ),
            build_initialize_mint(&mint, request.decimals, &self.payer, Some(&self.payer))?,
        ];
        let mut rent_lamports = mint_rent;

        if supply > 0 {
            let (create_ata, ata) =
                build_create_associated_token_account_idempotent(&self.payer, &self.payer, &mint)?;
            instructions.push(create_ata);
            instructions.push(build_mint_to(&mint, &ata, &self.payer, supply)?);
            rent_lamports += self.token_account_rent().await?;
        }

        debug!(mint = %mint.short(), supply, decimals = request.decimals, "built create");

        Ok(BuiltTransaction {
            kind: OperationKind::Create,
            instructions,
            co_signers: vec![mint_keypair],
            mint,
            amount: TokenAmount::new(supply, request.decimals),
            rent_lamports,
        })
    }

    /// Issue `amount` (minor units) of `mint` to `recipient`'s associated
    /// account, creating it when missing. The payer must be the mint
    /// authority; that check belongs to the caller.
    pub async fn mint_to(
        &self,
        mint: &Pubkey,
        recipient: &Pubkey,
        amount: TokenAmount,
    ) -> Result<BuiltTransaction, TokenError> {
        let mut instructions = Vec::with_capacity(2);
        let (destination, rent_lamports) =
            self.ensure_associated_account(recipient, mint, &mut instructions).await?;
        instructions.push(build_mint_to(mint, &destination, &self.payer, amount.raw)?);

        Ok(BuiltTransaction {
            kind: OperationKind::MintTo,
            instructions,
            co_signers: Vec::new(),
            mint: *mint,
            amount,
            rent_lamports,
        })
    }

    /// Move `amount` (minor units) from the payer's associated account to
    /// `recipient`'s, creating the recipient's account when missing.
    pub async fn transfer(
        &self,
        mint: &Pubkey,
        recipient: &Pubkey,
        amount: TokenAmount,
    ) -> Result<BuiltTransaction, TokenError> {
        let source = derive_associated_token_address(&self.payer, mint)?;
        let available = self.token_balance(&source).await?;
        if available < amount.raw {
            return Err(TokenError::InsufficientTokenBalance(format!(
                "requested {}, available {}",
                amount,
                TokenAmount::new(available, amount.decimals)
            )));
        }

        let mut instructions = Vec::with_capacity(2);
        let (destination, rent_lamports) =
            self.ensure_associated_account(recipient, mint, &mut instructions).await?;
        instructions.push(build_spl_transfer(
            &source,
            &destination,
            &self.payer,
            amount.raw,
        )?);

        Ok(BuiltTransaction {
            kind: OperationKind::Transfer,
            instructions,
            co_signers: Vec::new(),
            mint: *mint,
            amount,
            rent_lamports,
        })
    }

    /// Token balance of an account; a missing account holds nothing.
    async fn token_balance(&self, account: &Pubkey) -> Result<u64, TokenError> {
        match self.client.get_account(account).await? {
            Some(data) => Ok(unpack_token_account(&data.data)
                .map_err(|e| TokenError::Unknown(format!("token account {account}: {e}")))?
                .amount),
            None => Ok(0),
        }
    }

    /// Derive `owner`'s associated account for `mint` and queue its creation
    /// when it does not exist yet. Returns the address and the rent needed.
    async fn ensure_associated_account(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
        instructions: &mut Vec<SolInstruction>,
    ) -> Result<(Pubkey, u64), TokenError> {
        let ata = derive_associated_token_address(owner, mint)?;
        if self.client.get_account(&ata).await?.is_some() {
            return Ok((ata, 0));
        }

        debug!(owner = %owner.short(), account = %ata.short(), "creating associated account");
        let (ix, _) = build_create_associated_token_account_idempotent(&self.payer, owner, mint)?;
        instructions.push(ix);
        Ok((ata, self.token_account_rent().await?))
    }

    async fn token_account_rent(&self) -> Result<u64, TokenError> {
        Ok(self
            .client
            .get_minimum_balance_for_rent_exemption(TOKEN_ACCOUNT_SIZE)
            .await?)
    }
}
