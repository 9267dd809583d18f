//! Signing, submission and confirmation.
//!
//! The only stage that changes ledger state. A submitted transaction is
//! never retried here; the caller decides whether to resubmit.

use chain_sol::{
    compile_transaction, PartiallySignedTransaction, Pubkey, SolTransaction,
    ASSOCIATED_TOKEN_PROGRAM_ID, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID,
};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::builder::BuiltTransaction;
use crate::config::ConfirmationPolicy;
use crate::error::{NetworkFailure, TokenError};
use crate::network::{ClientError, Commitment, InstructionError, LedgerClient, TransactionError};
use crate::signer::WalletSigner;

/// A transaction that reached the requested commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmed {
    pub signature: String,
    pub fee_paid: Option<u64>,
}

/// Where a submitted transaction stands after one status check.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Poll {
    Pending,
    Landed,
    Failed(TransactionError),
}

pub struct SubmissionCoordinator<'a, C: ?Sized, S: ?Sized> {
    client: &'a C,
    signer: &'a S,
    commitment: Commitment,
    policy: &'a ConfirmationPolicy,
    cancel: &'a CancellationToken,
}

impl<'a, C, S> SubmissionCoordinator<'a, C, S>
where
    C: LedgerClient + ?Sized,
    S: WalletSigner + ?Sized,
{
    pub fn new(
        client: &'a C,
        signer: &'a S,
        commitment: Commitment,
        policy: &'a ConfirmationPolicy,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            client,
            signer,
            commitment,
            policy,
            cancel,
        }
    }

    /// Check funds, sign, submit and wait for confirmation.
    pub async fn submit(&self, built: &BuiltTransaction) -> Result<Confirmed, TokenError> {
        let payer = self.signer.pubkey();

        let blockhash = self.client.get_latest_blockhash().await?;
        let message = compile_transaction(&built.instructions, &payer, &blockhash.blockhash)?;

        self.check_native_balance(&payer, &message, built.rent_lamports)
            .await?;

        let mut tx = PartiallySignedTransaction::new(message)?;
        for co_signer in &built.co_signers {
            tx.partial_sign(co_signer)?;
        }

        if self.cancel.is_cancelled() {
            return Err(TokenError::Cancelled);
        }
        let signature = self.signer.sign_message(tx.message_bytes()).await?;
        tx.add_signature(&payer, signature)?;

        let wire = tx.to_wire()?;
        let signature = match self.client.send_transaction(&wire).await {
            Ok(sig) => sig,
            Err(ClientError::Transaction(err)) => {
                return Err(classify_transaction_error(&err, tx.message()))
            }
            Err(e) => return Err(e.into()),
        };
        info!(kind = %built.kind, mint = %built.mint.short(), %signature, "submitted");

        self.await_confirmation(&signature, blockhash.last_valid_block_height, tx.message())
            .await?;

        let fee_paid = self.fetch_fee(&signature).await;
        info!(kind = %built.kind, %signature, ?fee_paid, "confirmed");

        Ok(Confirmed {
            signature,
            fee_paid,
        })
    }

    /// Fail before asking the user to sign when fees and rent cannot be
    /// covered.
    async fn check_native_balance(
        &self,
        payer: &Pubkey,
        message: &SolTransaction,
        rent: u64,
    ) -> Result<(), TokenError> {
        let required = message.base_fee().saturating_add(rent);
        let available = self.client.get_balance(payer).await?;
        debug!(required, available, "native balance check");
        if available < required {
            return Err(TokenError::InsufficientNativeBalance(format!(
                "need {required} lamports for fees and rent, have {available}"
            )));
        }
        Ok(())
    }

    /// Poll until the commitment is reached, the blockhash expires, the
    /// attempt or time budget runs out, or the token is cancelled.
    async fn await_confirmation(
        &self,
        signature: &str,
        last_valid_block_height: u64,
        message: &SolTransaction,
    ) -> Result<(), TokenError> {
        let deadline = Instant::now() + self.policy.timeout();
        let mut attempts = 0;

        while attempts < self.policy.max_attempts {
            attempts += 1;

            match self.poll(signature).await {
                Poll::Landed => return Ok(()),
                Poll::Failed(err) => return Err(classify_transaction_error(&err, message)),
                Poll::Pending => {}
            }

            match self.client.get_block_height().await {
                Ok(height) if height > last_valid_block_height => {
                    warn!(%signature, height, last_valid_block_height, "blockhash expired");
                    return Err(NetworkFailure::BlockhashExpired.into());
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "block height check failed"),
            }

            if Instant::now() >= deadline {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    warn!(%signature, "confirmation abandoned; the transaction may still land");
                    return Err(TokenError::Cancelled);
                }
                _ = sleep(self.policy.poll_interval()) => {}
            }
        }

        Err(NetworkFailure::ConfirmationTimeout { attempts }.into())
    }

    async fn poll(&self, signature: &str) -> Poll {
        match self.client.get_signature_status(signature).await {
            Ok(Some(status)) => {
                if let Some(err) = status.err {
                    return Poll::Failed(err);
                }
                match status.confirmation {
                    Some(level) if level >= self.commitment => Poll::Landed,
                    _ => Poll::Pending,
                }
            }
            Ok(None) => Poll::Pending,
            // A failed status query says nothing about the transaction.
            Err(e) => {
                debug!(%signature, error = %e, "status check failed");
                Poll::Pending
            }
        }
    }

    async fn fetch_fee(&self, signature: &str) -> Option<u64> {
        match self.client.get_transaction(signature).await {
            Ok(Some(detail)) => Some(detail.fee),
            Ok(None) => None,
            Err(e) => {
                debug!(%signature, error = %e, "fee lookup failed");
                None
            }
        }
    }
}

// System program: ResultWithNegativeLamports.
const SYSTEM_ERR_INSUFFICIENT_LAMPORTS: u32 = 1;
// Token program error codes.
const TOKEN_ERR_INSUFFICIENT_FUNDS: u32 = 1;
const TOKEN_ERR_INVALID_MINT: u32 = 2;
const TOKEN_ERR_MINT_MISMATCH: u32 = 3;
const TOKEN_ERR_OWNER_MISMATCH: u32 = 4;
const TOKEN_ERR_FIXED_SUPPLY: u32 = 5;

/// Map a ledger-reported failure onto the error taxonomy using the program
/// that raised it.
pub fn classify_transaction_error(err: &TransactionError, message: &SolTransaction) -> TokenError {
    match err {
        TransactionError::InsufficientFundsForFee
        | TransactionError::InsufficientFundsForRent { .. } => {
            TokenError::InsufficientNativeBalance(err.to_string())
        }
        TransactionError::BlockhashNotFound => NetworkFailure::BlockhashExpired.into(),
        TransactionError::InstructionError {
            index,
            error: InstructionError::Custom(code),
        } => {
            let program = message
                .compiled_instructions
                .get(*index as usize)
                .and_then(|ix| message.account_keys.get(ix.program_id_index as usize));

            match (program, *code) {
                (Some(p), SYSTEM_ERR_INSUFFICIENT_LAMPORTS) if *p == SYSTEM_PROGRAM_ID => {
                    TokenError::InsufficientNativeBalance(err.to_string())
                }
                (Some(p), TOKEN_ERR_INSUFFICIENT_FUNDS) if *p == TOKEN_PROGRAM_ID => {
                    TokenError::InsufficientTokenBalance(err.to_string())
                }
                (Some(p), TOKEN_ERR_INVALID_MINT | TOKEN_ERR_MINT_MISMATCH)
                    if *p == TOKEN_PROGRAM_ID =>
                {
                    TokenError::UnknownMint(err.to_string())
                }
                (Some(p), TOKEN_ERR_OWNER_MISMATCH | TOKEN_ERR_FIXED_SUPPLY)
                    if *p == TOKEN_PROGRAM_ID =>
                {
                    TokenError::Authorization(err.to_string())
                }
                (Some(p), _) if *p == ASSOCIATED_TOKEN_PROGRAM_ID => {
                    TokenError::Unknown(format!("associated account program: {err}"))
                }
                _ => TokenError::Unknown(err.to_string()),
            }
        }
        _ => TokenError::Unknown(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use chain_sol::{build_create_account, build_spl_transfer};

    use super::*;

    fn key(b: u8) -> Pubkey {
        Pubkey::new([b; 32])
    }

    /// Instruction 0 is a system create-account, instruction 1 a token transfer.
    fn message() -> SolTransaction {
        let payer = key(1);
        let ixs = vec![
            build_create_account(&payer, &key(2), 1, 82, &TOKEN_PROGRAM_ID),
            build_spl_transfer(&key(3), &key(4), &payer, 10).unwrap(),
        ];
        compile_transaction(&ixs, &payer, &[7u8; 32]).unwrap()
    }

    fn custom(index: u8, code: u32) -> TransactionError {
        TransactionError::InstructionError {
            index,
            error: InstructionError::Custom(code),
        }
    }

    #[test]
    fn system_lamport_shortfall_is_native_balance() {
        let err = classify_transaction_error(&custom(0, 1), &message());
        assert!(matches!(err, TokenError::InsufficientNativeBalance(_)));
    }

    #[test]
    fn token_insufficient_funds_is_token_balance() {
        let err = classify_transaction_error(&custom(1, 1), &message());
        assert!(matches!(err, TokenError::InsufficientTokenBalance(_)));
    }

    #[test]
    fn token_owner_mismatch_is_authorization() {
        let err = classify_transaction_error(&custom(1, 4), &message());
        assert!(matches!(err, TokenError::Authorization(_)));
    }

    #[test]
    fn same_code_from_other_program_is_not_confused() {
        // Code 4 from the system program is not an authorization failure.
        let err = classify_transaction_error(&custom(0, 4), &message());
        assert!(matches!(err, TokenError::Unknown(_)));
    }

    #[test]
    fn out_of_range_instruction_index_is_unknown() {
        let err = classify_transaction_error(&custom(9, 1), &message());
        assert!(matches!(err, TokenError::Unknown(_)));
    }

    #[test]
    fn fee_and_blockhash_failures() {
        let msg = message();
        assert!(matches!(
            classify_transaction_error(&TransactionError::InsufficientFundsForFee, &msg),
            TokenError::InsufficientNativeBalance(_)
        ));
        assert!(matches!(
            classify_transaction_error(&TransactionError::BlockhashNotFound, &msg),
            TokenError::Network(NetworkFailure::BlockhashExpired)
        ));
        let other = classify_transaction_error(&TransactionError::Other("Weird".into()), &msg);
        assert!(matches!(other, TokenError::Unknown(ref m) if m == "Weird"));
    }
}
