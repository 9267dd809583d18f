//! End-to-end operation tests against the in-memory ledger.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chain_sol::{derive_associated_token_address, Keypair, Pubkey, TOKEN_ACCOUNT_SIZE};
use token_core::memory::rent_exempt_minimum;
use token_core::{
    BalanceOrigin, Cluster, ConfirmationMode, ConfirmationPolicy, EngineConfig, EntrySource,
    KeypairSigner, MemoryLedger, MovementRequest, NetworkFailure, OperationKind, OperationStatus,
    RawRequest, SignerError, TokenEngine, TokenError, UiAmount, WalletSigner,
};

const SOL: u64 = 1_000_000_000;

fn config(max_attempts: u32) -> EngineConfig {
    let mut config = EngineConfig::for_cluster(Cluster::Localnet);
    config.confirmation = ConfirmationPolicy {
        max_attempts,
        poll_interval_ms: 10,
        timeout_ms: 60_000,
    };
    config
}

fn setup() -> (Arc<MemoryLedger>, TokenEngine<MemoryLedger, KeypairSigner>) {
    let client = Arc::new(MemoryLedger::new());
    let signer = KeypairSigner::new(Keypair::generate());
    client.airdrop(&signer.pubkey(), 10 * SOL);
    let engine = TokenEngine::new(config(5), Arc::clone(&client), signer).unwrap();
    (client, engine)
}

fn create(symbol: &str, decimals: &str, supply: &str) -> RawRequest {
    RawRequest::Create {
        name: "Demo".into(),
        symbol: symbol.into(),
        decimals: decimals.into(),
        initial_supply: supply.into(),
        description: None,
    }
}

fn transfer(mint: &Pubkey, recipient: &Pubkey, amount: &str) -> RawRequest {
    RawRequest::Transfer {
        mint: mint.to_string(),
        recipient: recipient.to_string(),
        amount: amount.into(),
        decimals: None,
    }
}

fn mint_to(mint: &Pubkey, recipient: &Pubkey, amount: &str) -> RawRequest {
    RawRequest::MintTo {
        mint: mint.to_string(),
        recipient: recipient.to_string(),
        amount: amount.into(),
        decimals: None,
    }
}

fn movement(mint: &Pubkey, recipient: &Pubkey, amount: &str) -> MovementRequest {
    MovementRequest {
        mint: *mint,
        recipient: *recipient,
        amount: UiAmount::parse(amount).unwrap(),
        decimals: None,
    }
}

/// A wallet that always declines, counting how often it was asked.
struct DecliningSigner {
    pubkey: Pubkey,
    asked: Arc<AtomicUsize>,
}

#[async_trait]
impl WalletSigner for DecliningSigner {
    fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    async fn sign_message(&self, _message: &[u8]) -> Result<[u8; 64], SignerError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Err(SignerError::Rejected)
    }
}

#[tokio::test]
async fn create_then_transfer_tracks_overlay_and_entries() {
    let (client, engine) = setup();
    let owner = engine.owner();
    let recipient = Pubkey::new([0x42; 32]);

    let created = engine.execute_raw(&create("DMO", "9", "1000")).await.unwrap();
    let mint = created.mint;
    let thousand = 1_000 * SOL;

    assert_eq!(created.kind, OperationKind::Create);
    assert_eq!(created.status, OperationStatus::Success);
    assert_eq!(created.amount.raw, thousand);
    assert_eq!(created.fee_paid, Some(10_000));
    assert_eq!(
        created.explorer_url,
        format!("https://explorer.solana.com/address/{mint}?cluster=custom")
    );
    assert_eq!(engine.ledger().balance(&mint), Some(thousand));
    assert_eq!(client.token_balance(&owner, &mint), Some(thousand));

    let entries = engine.ledger().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, OperationKind::Create);
    assert_eq!(entries[0].status, OperationStatus::Success);
    assert_eq!(entries[0].signature, created.signature);

    let sent = engine
        .execute_raw(&transfer(&mint, &recipient, "100"))
        .await
        .unwrap();
    assert_eq!(sent.kind, OperationKind::Transfer);
    assert_eq!(sent.amount.raw, 100 * SOL);
    assert!(sent.explorer_url.contains(&format!("/tx/{}", sent.signature)));
    assert_eq!(engine.ledger().balance(&mint), Some(900 * SOL));
    assert_eq!(client.token_balance(&recipient, &mint), Some(100 * SOL));

    let entries = engine.ledger().entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, OperationKind::Transfer);
    assert_eq!(entries[0].amount.map(|a| a.raw), Some(100 * SOL));
    assert_eq!(entries[0].counterparties, vec![recipient]);

    // Over-spend is caught before anything is signed or sent.
    let before = client.sent_count();
    let err = engine
        .execute_raw(&transfer(&mint, &recipient, "5000"))
        .await
        .unwrap_err();
    assert!(matches!(err, TokenError::InsufficientTokenBalance(_)));
    assert_eq!(engine.ledger().balance(&mint), Some(900 * SOL));
    assert_eq!(engine.ledger().entry_count(), 2);
    assert_eq!(client.sent_count(), before);
}

#[tokio::test]
async fn zero_supply_create_skips_the_token_account() {
    let (client, engine) = setup();
    let owner = engine.owner();

    let created = engine.execute_raw(&create("ZRO", "0", "0")).await.unwrap();

    assert_eq!(created.amount.raw, 0);
    assert_eq!(engine.ledger().balance(&created.mint), Some(0));
    assert_eq!(client.token_balance(&owner, &created.mint), None);
    let state = client.mint_state(&created.mint).unwrap();
    assert_eq!(state.decimals, 0);
    assert_eq!(state.mint_authority, Some(owner));
    assert_eq!(state.freeze_authority, Some(owner));
}

#[tokio::test]
async fn create_accepts_the_decimal_bounds() {
    let (_client, engine) = setup();
    let high = engine.execute_raw(&create("HI", "18", "1.5")).await.unwrap();
    assert_eq!(high.amount.raw, 1_500_000_000_000_000_000);

    let err = engine.execute_raw(&create("BAD", "19", "1")).await.unwrap_err();
    assert!(matches!(err, TokenError::Validation { ref field, .. } if field == "decimals"));
}

#[tokio::test]
async fn create_with_supply_below_one_unit_is_refused() {
    let (client, engine) = setup();

    let err = engine.execute_raw(&create("DST", "0", "0.5")).await.unwrap_err();

    assert!(matches!(err, TokenError::Validation { ref field, .. } if field == "initial_supply"));
    assert_eq!(client.sent_count(), 0);
    assert_eq!(engine.ledger().entry_count(), 0);
    assert!(engine.ledger().tokens().is_empty());
}

#[tokio::test]
async fn mint_amounts_are_floored_and_dust_is_rejected() {
    let (client, engine) = setup();
    let owner = engine.owner();
    let created = engine.execute_raw(&create("FLR", "2", "0")).await.unwrap();
    let mint = created.mint;

    let minted = engine.execute_raw(&mint_to(&mint, &owner, "1.239")).await.unwrap();
    assert_eq!(minted.amount.raw, 123);
    assert_eq!(client.token_balance(&owner, &mint), Some(123));
    // Minting to the caller raises the overlay.
    assert_eq!(engine.ledger().balance(&mint), Some(123));

    let before = client.sent_count();
    let err = engine
        .execute_raw(&mint_to(&mint, &owner, "0.001"))
        .await
        .unwrap_err();
    assert!(matches!(err, TokenError::Validation { ref field, .. } if field == "amount"));
    assert_eq!(client.sent_count(), before);
}

#[tokio::test]
async fn minting_to_someone_else_leaves_the_overlay() {
    let (client, engine) = setup();
    let other = Pubkey::new([9; 32]);
    let created = engine.execute_raw(&create("OTH", "0", "10")).await.unwrap();

    engine
        .execute_raw(&mint_to(&created.mint, &other, "5"))
        .await
        .unwrap();

    assert_eq!(engine.ledger().balance(&created.mint), Some(10));
    assert_eq!(client.token_balance(&other, &created.mint), Some(5));
    assert_eq!(engine.ledger().entries()[0].kind, OperationKind::MintTo);
}

#[tokio::test]
async fn mint_by_non_authority_is_refused_before_submission() {
    let (client, engine) = setup();
    let mint = Pubkey::new([0x77; 32]);
    client.set_mint(&mint, 6, Some(Pubkey::new([0x55; 32])), 0);

    let err = engine
        .execute_raw(&mint_to(&mint, &engine.owner(), "1"))
        .await
        .unwrap_err();

    assert!(matches!(err, TokenError::Authorization(_)));
    assert_eq!(client.sent_count(), 0);
    assert_eq!(engine.ledger().entry_count(), 0);
}

#[tokio::test]
async fn fixed_supply_mint_is_an_authorization_error() {
    let (client, engine) = setup();
    let mint = Pubkey::new([0x78; 32]);
    client.set_mint(&mint, 6, None, 1_000);

    let err = engine
        .execute_raw(&mint_to(&mint, &engine.owner(), "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, TokenError::Authorization(_)));
}

#[tokio::test]
async fn unknown_mint_and_decimals_mismatch() {
    let (client, engine) = setup();
    let owner = engine.owner();

    let err = engine
        .execute_raw(&transfer(&Pubkey::new([0x99; 32]), &owner, "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, TokenError::UnknownMint(_)));

    let mint = Pubkey::new([0x66; 32]);
    client.set_mint(&mint, 6, Some(owner), 0);
    let err = engine
        .execute_raw(&RawRequest::MintTo {
            mint: mint.to_string(),
            recipient: owner.to_string(),
            amount: "1".into(),
            decimals: Some("9".into()),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TokenError::Validation { ref field, .. } if field == "decimals"));
    assert_eq!(client.sent_count(), 0);
}

#[tokio::test]
async fn invalid_input_never_reaches_the_ledger() {
    let (client, engine) = setup();
    let err = engine
        .execute_raw(&transfer(&Pubkey::new([1; 32]), &Pubkey::new([2; 32]), "-3"))
        .await
        .unwrap_err();
    assert!(matches!(err, TokenError::Validation { .. }));

    let err = engine
        .execute_raw(&RawRequest::Transfer {
            mint: "not-an-address".into(),
            recipient: Pubkey::new([2; 32]).to_string(),
            amount: "1".into(),
            decimals: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TokenError::Validation { ref field, .. } if field == "mint"));
    assert_eq!(client.sent_count(), 0);
}

#[tokio::test]
async fn declined_signature_changes_nothing() {
    let client = Arc::new(MemoryLedger::new());
    let asked = Arc::new(AtomicUsize::new(0));
    let signer = DecliningSigner {
        pubkey: Keypair::generate().pubkey(),
        asked: Arc::clone(&asked),
    };
    client.airdrop(&signer.pubkey, 10 * SOL);
    let engine = TokenEngine::new(config(5), Arc::clone(&client), signer).unwrap();

    let err = engine.execute_raw(&create("NOP", "6", "10")).await.unwrap_err();

    assert!(matches!(err, TokenError::UserRejected));
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(client.sent_count(), 0);
    assert!(engine.ledger().tokens().is_empty());
    assert_eq!(engine.ledger().entry_count(), 0);
}

#[tokio::test]
async fn unfunded_caller_is_stopped_before_signing() {
    let client = Arc::new(MemoryLedger::new());
    let asked = Arc::new(AtomicUsize::new(0));
    let signer = DecliningSigner {
        pubkey: Keypair::generate().pubkey(),
        asked: Arc::clone(&asked),
    };
    client.airdrop(&signer.pubkey, 1_000);
    let engine = TokenEngine::new(config(5), Arc::clone(&client), signer).unwrap();

    let err = engine.execute_raw(&create("POOR", "6", "10")).await.unwrap_err();

    assert!(matches!(err, TokenError::InsufficientNativeBalance(_)));
    assert_eq!(asked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn network_rejection_is_classified_by_program() {
    let (client, engine) = setup();
    let created = engine.execute_raw(&create("REJ", "0", "10")).await.unwrap();

    // The token program refuses the transfer (index 0: recipient account exists).
    let recipient = Pubkey::new([0x31; 32]);
    client.set_token_balance(&recipient, &created.mint, 0);
    client.reject_next_send(token_core::network::TransactionError::InstructionError {
        index: 0,
        error: token_core::network::InstructionError::Custom(4),
    });

    let err = engine
        .transfer(&movement(&created.mint, &recipient, "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, TokenError::Authorization(_)));
    assert_eq!(engine.ledger().balance(&created.mint), Some(10));
}

#[tokio::test]
async fn new_recipient_account_is_funded_by_the_caller() {
    let (client, engine) = setup();
    let owner = engine.owner();
    let created = engine.execute_raw(&create("ATA", "0", "10")).await.unwrap();
    let recipient = Pubkey::new([0x21; 32]);
    let before = client.lamports(&owner);

    let sent = engine
        .execute_raw(&transfer(&created.mint, &recipient, "3"))
        .await
        .unwrap();

    let ata = derive_associated_token_address(&recipient, &created.mint).unwrap();
    assert_eq!(client.lamports(&ata), rent_exempt_minimum(TOKEN_ACCOUNT_SIZE));
    assert_eq!(
        client.lamports(&owner),
        before - rent_exempt_minimum(TOKEN_ACCOUNT_SIZE) - sent.fee_paid.unwrap()
    );
}

#[tokio::test]
async fn same_mint_transfers_are_serialized() {
    let (client, engine) = setup();
    let created = engine.execute_raw(&create("SER", "0", "1000")).await.unwrap();
    let mint = created.mint;
    let a = Pubkey::new([0x0a; 32]);
    let b = Pubkey::new([0x0b; 32]);

    let first_movement = movement(&mint, &a, "600");
    let second_movement = movement(&mint, &b, "600");
    let first = engine.transfer(&first_movement);
    let second = engine.transfer(&second_movement);
    let (first, second) = tokio::join!(first, second);

    let outcomes = [first, second];
    let ok = outcomes.iter().filter(|r| r.is_ok()).count();
    let short = outcomes
        .iter()
        .filter(|r| matches!(r, Err(TokenError::InsufficientTokenBalance(_))))
        .count();
    assert_eq!((ok, short), (1, 1));
    assert_eq!(engine.ledger().balance(&mint), Some(400));
    assert_eq!(client.token_balance(&engine.owner(), &mint), Some(400));
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_transaction_times_out() {
    let (client, engine) = setup();
    client.set_confirmation_mode(ConfirmationMode::Never);

    let err = engine.execute_raw(&create("SLO", "0", "1")).await.unwrap_err();

    assert!(matches!(
        err,
        TokenError::Network(NetworkFailure::ConfirmationTimeout { attempts: 5 })
    ));
    // The transaction itself landed; only the local record is missing.
    assert_eq!(client.sent_count(), 1);
    assert_eq!(engine.ledger().entry_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_confirmation_still_succeeds() {
    let (client, engine) = setup();
    client.set_confirmation_mode(ConfirmationMode::AfterPolls(3));

    let created = engine.execute_raw(&create("LAG", "0", "1")).await.unwrap();
    assert_eq!(engine.ledger().balance(&created.mint), Some(1));
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_confirmation() {
    let client = Arc::new(MemoryLedger::new());
    let signer = KeypairSigner::new(Keypair::generate());
    client.airdrop(&signer.pubkey(), 10 * SOL);
    client.set_confirmation_mode(ConfirmationMode::Never);
    let engine = TokenEngine::new(config(1_000), Arc::clone(&client), signer).unwrap();

    let pending = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.execute_raw(&create("CXL", "0", "1")).await })
    };
    tokio::time::sleep(Duration::from_millis(55)).await;
    engine.shutdown();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, TokenError::Cancelled));
    assert_eq!(client.sent_count(), 1);

    let err = engine.execute_raw(&create("NEW", "0", "1")).await.unwrap_err();
    assert!(matches!(err, TokenError::Cancelled));
    assert!(engine.is_shut_down());
}

#[tokio::test]
async fn history_merges_chain_and_local() {
    let (client, engine) = setup();
    let recipient = Pubkey::new([0x42; 32]);
    let created = engine.execute_raw(&create("HIS", "0", "50")).await.unwrap();
    let sent = engine
        .execute_raw(&transfer(&created.mint, &recipient, "20"))
        .await
        .unwrap();

    let minted = engine
        .execute_raw(&mint_to(&created.mint, &engine.owner(), "5"))
        .await
        .unwrap();

    let page = engine.history(None, Some(10)).await.unwrap();
    assert!(page.warning.is_none());
    assert!(!page.has_more);
    // Local entries are represented by their chain counterparts, under the
    // operation kind the session recorded.
    assert_eq!(page.entries.len(), 3);
    assert!(page.entries.iter().all(|e| e.source == EntrySource::Chain));
    let by_sig = |sig: &str| page.entries.iter().find(|e| e.signature == sig).unwrap();

    let sent_entry = by_sig(&sent.signature);
    assert_eq!(sent_entry.kind, OperationKind::Transfer);
    assert_eq!(sent_entry.amount.map(|a| a.raw), Some(20));
    assert_eq!(sent_entry.fee, sent.fee_paid);

    let minted_entry = by_sig(&minted.signature);
    assert_eq!(minted_entry.kind, OperationKind::MintTo);
    assert_eq!(minted_entry.amount.map(|a| a.raw), Some(5));

    assert_eq!(by_sig(&created.signature).kind, OperationKind::Create);

    client.set_history_available(false);
    let degraded = engine.history(None, Some(10)).await.unwrap();
    assert!(degraded.warning.is_some());
    assert_eq!(degraded.entries.len(), 3);
    assert!(degraded.entries.iter().all(|e| e.source == EntrySource::Local));
}

#[tokio::test]
async fn pager_walks_the_whole_history() {
    let (_client, engine) = setup();
    let created = engine.execute_raw(&create("PGR", "0", "10")).await.unwrap();
    for i in 0..4u8 {
        engine
            .execute_raw(&transfer(&created.mint, &Pubkey::new([0x50 + i; 32]), "1"))
            .await
            .unwrap();
    }

    let mut pager = engine.history_pager();
    let mut signatures = Vec::new();
    while let Some(page) = pager.next_page().await.unwrap() {
        signatures.extend(page.entries.into_iter().map(|e| e.signature));
    }
    assert_eq!(signatures.len(), 5);
    assert!(pager.is_exhausted());
}

#[tokio::test]
async fn balances_prefer_chain_and_are_idempotent() {
    let (client, engine) = setup();
    let created = engine.execute_raw(&create("BAL", "3", "2.5")).await.unwrap();

    // A token the caller merely holds.
    let foreign = Pubkey::new([0x88; 32]);
    client.set_mint(&foreign, 0, None, 7);
    client.set_token_balance(&engine.owner(), &foreign, 7);

    let first = engine.balances().await.unwrap();
    let second = engine.balances().await.unwrap();
    assert_eq!(first, second);
    assert!(!first.below_fee_budget);
    assert_eq!(first.tokens.len(), 2);

    let own = first.tokens.iter().find(|t| t.mint == created.mint).unwrap();
    assert_eq!(own.origin, BalanceOrigin::Chain);
    assert_eq!(own.on_chain_amount, Some(2_500));
    assert_eq!(own.symbol.as_deref(), Some("BAL"));

    let held = first.tokens.iter().find(|t| t.mint == foreign).unwrap();
    assert_eq!(held.amount().raw, 7);
    assert_eq!(held.symbol, None);
}
