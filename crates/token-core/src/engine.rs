//! The operation surface: Create, MintTo, Transfer, history and balances.

use std::sync::Arc;

use chain_sol::Pubkey;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::amount::TokenAmount;
use crate::balance::BalanceAggregator;
use crate::builder::TransactionBuilder;
use crate::config::EngineConfig;
use crate::error::TokenError;
use crate::history::{HistoryPager, LedgerReconciler};
use crate::ledger::{unix_now, LocalLedger, NewEntry};
use crate::locks::MintLocks;
use crate::mint::resolve_mint;
use crate::network::LedgerClient;
use crate::signer::WalletSigner;
use crate::submit::{Confirmed, SubmissionCoordinator};
use crate::types::{
    BalanceReport, CreateRequest, HistoryPage, MovementRequest, OperationKind,
    OperationRequest, OperationResult, OperationStatus, RawRequest, TokenDescriptor,
};
use crate::validate::validate_request;

struct Inner<C: ?Sized, S> {
    config: EngineConfig,
    signer: S,
    ledger: Arc<LocalLedger>,
    locks: MintLocks,
    cancel: CancellationToken,
    client: Arc<C>,
}

/// Cheap to clone; clones share the ledger, locks and cancellation.
pub struct TokenEngine<C: ?Sized, S> {
    inner: Arc<Inner<C, S>>,
}

impl<C: ?Sized, S> Clone for TokenEngine<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, S> TokenEngine<C, S>
where
    C: LedgerClient + ?Sized,
    S: WalletSigner,
{
    pub fn new(config: EngineConfig, client: Arc<C>, signer: S) -> Result<Self, TokenError> {
        Self::with_ledger(config, client, signer, Arc::new(LocalLedger::new()))
    }

    /// Use an existing local ledger, for example one shared with a UI.
    pub fn with_ledger(
        config: EngineConfig,
        client: Arc<C>,
        signer: S,
        ledger: Arc<LocalLedger>,
    ) -> Result<Self, TokenError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                signer,
                ledger,
                locks: MintLocks::new(),
                cancel: CancellationToken::new(),
                client,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn ledger(&self) -> &Arc<LocalLedger> {
        &self.inner.ledger
    }

    /// The caller: fee payer, mint authority for created tokens, and the
    /// owner whose balances and history are reported.
    pub fn owner(&self) -> Pubkey {
        self.inner.signer.pubkey()
    }

    /// Stop waiting on in-flight confirmations and refuse new operations.
    /// Transactions already submitted stay submitted.
    pub fn shutdown(&self) {
        info!("engine shutting down");
        self.inner.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Validate raw form input, then execute it.
    pub async fn execute_raw(&self, raw: &RawRequest) -> Result<OperationResult, TokenError> {
        let request = validate_request(raw)?;
        self.execute(request).await
    }

    pub async fn execute(&self, request: OperationRequest) -> Result<OperationResult, TokenError> {
        match &request {
            OperationRequest::Create(create) => self.create_token(create).await,
            OperationRequest::MintTo(movement) => self.mint_to(movement).await,
            OperationRequest::Transfer(movement) => self.transfer(movement).await,
        }
    }

    pub async fn create_token(&self, request: &CreateRequest) -> Result<OperationResult, TokenError> {
        self.ensure_active()?;
        let owner = self.owner();
        info!(symbol = %request.symbol, decimals = request.decimals, "create started");

        let built = TransactionBuilder::new(self.inner.client.as_ref(), owner)
            .create(request)
            .await?;
        let confirmed = self.coordinator().submit(&built).await?;

        let ledger = &self.inner.ledger;
        ledger.add_token(
            TokenDescriptor {
                mint: built.mint,
                decimals: request.decimals,
                symbol: request.symbol.clone(),
                name: request.name.clone(),
                description: request.description.clone(),
                mint_authority: owner,
                created_at: unix_now(),
            },
            built.amount.raw,
        );
        ledger.add_entry(NewEntry {
            kind: OperationKind::Create,
            status: OperationStatus::Success,
            mint: Some(built.mint),
            amount: Some(built.amount),
            counterparties: Vec::new(),
            signature: Some(confirmed.signature.clone()),
            fee: confirmed.fee_paid,
        });

        Ok(OperationResult {
            kind: OperationKind::Create,
            explorer_url: self.inner.config.explorer_address_url(&built.mint),
            signature: confirmed.signature,
            status: OperationStatus::Success,
            fee_paid: confirmed.fee_paid,
            mint: built.mint,
            amount: built.amount,
        })
    }

    pub async fn mint_to(&self, request: &MovementRequest) -> Result<OperationResult, TokenError> {
        self.ensure_active()?;
        let owner = self.owner();
        let _guard = self.inner.locks.acquire(&request.mint).await;
        info!(mint = %request.mint.short(), recipient = %request.recipient.short(), "mint started");

        let client = self.inner.client.as_ref();
        let mint = resolve_mint(client, &request.mint).await?;
        mint.authorize_mint(&owner)?;
        let amount = movement_amount(request, mint.decimals_for(request.decimals)?)?;

        let built = TransactionBuilder::new(client, owner)
            .mint_to(&request.mint, &request.recipient, amount)
            .await?;
        let confirmed = self.coordinator().submit(&built).await?;

        let ledger = &self.inner.ledger;
        if request.recipient == owner {
            if let Some(balance) = ledger.balance(&request.mint) {
                ledger.update_balance(&request.mint, balance.saturating_add(amount.raw));
            }
        }
        self.record_movement(OperationKind::MintTo, request, amount, &confirmed);

        Ok(self.movement_result(OperationKind::MintTo, request, amount, confirmed))
    }

    pub async fn transfer(&self, request: &MovementRequest) -> Result<OperationResult, TokenError> {
        self.ensure_active()?;
        let owner = self.owner();
        let _guard = self.inner.locks.acquire(&request.mint).await;
        info!(mint = %request.mint.short(), recipient = %request.recipient.short(), "transfer started");

        let client = self.inner.client.as_ref();
        let mint = resolve_mint(client, &request.mint).await?;
        let amount = movement_amount(request, mint.decimals_for(request.decimals)?)?;

        let built = TransactionBuilder::new(client, owner)
            .transfer(&request.mint, &request.recipient, amount)
            .await?;
        let confirmed = self.coordinator().submit(&built).await?;

        let ledger = &self.inner.ledger;
        if request.recipient != owner {
            if let Some(balance) = ledger.balance(&request.mint) {
                ledger.update_balance(&request.mint, balance.saturating_sub(amount.raw));
            }
        }
        self.record_movement(OperationKind::Transfer, request, amount, &confirmed);

        Ok(self.movement_result(OperationKind::Transfer, request, amount, confirmed))
    }

    /// One page of merged history; `limit` defaults to the configured page size.
    pub async fn history(
        &self,
        cursor: Option<&str>,
        limit: Option<usize>,
    ) -> Result<HistoryPage, TokenError> {
        let limit = limit.unwrap_or(self.inner.config.history_page_size);
        LedgerReconciler::new(self.inner.client.as_ref(), &self.inner.ledger)
            .page(&self.owner(), cursor, limit)
            .await
    }

    pub fn history_pager(&self) -> HistoryPager<C> {
        HistoryPager::new(
            Arc::clone(&self.inner.client),
            Arc::clone(&self.inner.ledger),
            self.owner(),
            self.inner.config.history_page_size,
        )
    }

    pub async fn balances(&self) -> Result<BalanceReport, TokenError> {
        BalanceAggregator::new(
            self.inner.client.as_ref(),
            &self.inner.ledger,
            self.inner.config.min_fee_budget_lamports,
        )
        .report(&self.owner())
        .await
    }

    fn ensure_active(&self) -> Result<(), TokenError> {
        if self.inner.cancel.is_cancelled() {
            return Err(TokenError::Cancelled);
        }
        Ok(())
    }

    fn coordinator(&self) -> SubmissionCoordinator<'_, C, S> {
        SubmissionCoordinator::new(
            self.inner.client.as_ref(),
            &self.inner.signer,
            self.inner.config.commitment,
            &self.inner.config.confirmation,
            &self.inner.cancel,
        )
    }

    fn record_movement(
        &self,
        kind: OperationKind,
        request: &MovementRequest,
        amount: TokenAmount,
        confirmed: &Confirmed,
    ) {
        self.inner.ledger.add_entry(NewEntry {
            kind,
            status: OperationStatus::Success,
            mint: Some(request.mint),
            amount: Some(amount),
            counterparties: vec![request.recipient],
            signature: Some(confirmed.signature.clone()),
            fee: confirmed.fee_paid,
        });
    }

    fn movement_result(
        &self,
        kind: OperationKind,
        request: &MovementRequest,
        amount: TokenAmount,
        confirmed: Confirmed,
    ) -> OperationResult {
        OperationResult {
            kind,
            explorer_url: self.inner.config.explorer_tx_url(&confirmed.signature),
            signature: confirmed.signature,
            status: OperationStatus::Success,
            fee_paid: confirmed.fee_paid,
            mint: request.mint,
            amount,
        }
    }
}

/// Floor the requested amount to minor units; nothing left is a validation
/// failure.
fn movement_amount(request: &MovementRequest, decimals: u8) -> Result<TokenAmount, TokenError> {
    let raw = request.amount.to_raw(decimals)?;
    if raw == 0 {
        return Err(TokenError::validation(
            "amount",
            format!("{} is below the smallest unit at {decimals} decimals", request.amount),
        ));
    }
    Ok(TokenAmount::new(raw, decimals))
}
