//! An in-memory ledger that executes the instructions the engine emits.
//!
//! [`MemoryLedger`] implements [`LedgerClient`] by decoding submitted wire
//! transactions, verifying their signatures and running the System, SPL
//! Token and associated-account instructions against an account map. It backs
//! the CLI's `--simulate` mode and the test suites. Fault knobs let callers
//! exercise rejection, expiry and history failures.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chain_sol::{
    decode_token_instruction, decode_transaction, derive_associated_token_address, pack_mint,
    pack_token_account, unpack_mint, unpack_token_account, AccountState, DecodedTransaction,
    MintState, Pubkey, TokenAccountState, TokenInstruction, ASSOCIATED_TOKEN_PROGRAM_ID,
    MINT_SIZE, SYSTEM_PROGRAM_ID, TOKEN_ACCOUNT_SIZE, TOKEN_PROGRAM_ID,
};
use tracing::debug;

use crate::ledger::unix_now;
use crate::network::{
    AccountData, ClientError, Commitment, InstructionError, LatestBlockhash, LedgerClient,
    RawInstruction, SignatureInfo, SignatureStatus, TokenAccountBalance, TokenBalanceRecord,
    TransactionDetail, TransactionError,
};

/// Lamports per byte-year times the two-year exemption threshold.
const RENT_LAMPORTS_PER_BYTE: u64 = 6_960;
/// Account storage overhead counted by the rent calculation.
const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;
/// Blocks a blockhash stays valid for.
const BLOCKHASH_VALIDITY: u64 = 150;

const SYSTEM_IX_CREATE_ACCOUNT: u32 = 0;
const SYSTEM_IX_TRANSFER: u32 = 2;

/// How status queries report a landed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationMode {
    /// Finalized on the first query.
    Immediate,
    /// Unknown for this many queries, then finalized.
    AfterPolls(u32),
    /// Never reported.
    Never,
}

struct State {
    accounts: HashMap<Pubkey, AccountData>,
    block_height: u64,
    slot: u64,
    issued_blockhashes: HashMap<[u8; 32], u64>,
    transactions: HashMap<String, TransactionDetail>,
    /// Newest first.
    log: Vec<(SignatureInfo, Vec<Pubkey>)>,
    pending_polls: HashMap<String, u32>,
    sent: usize,
    // Fault knobs.
    confirmation: ConfirmationMode,
    reject_next: Option<TransactionError>,
    history_unavailable: bool,
    unfetchable: HashSet<String>,
}

pub struct MemoryLedger {
    state: Mutex<State>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

pub fn rent_exempt_minimum(size: usize) -> u64 {
    (size as u64 + ACCOUNT_STORAGE_OVERHEAD) * RENT_LAMPORTS_PER_BYTE
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                accounts: HashMap::new(),
                block_height: 1_000,
                slot: 5_000,
                issued_blockhashes: HashMap::new(),
                transactions: HashMap::new(),
                log: Vec::new(),
                pending_polls: HashMap::new(),
                sent: 0,
                confirmation: ConfirmationMode::Immediate,
                reject_next: None,
                history_unavailable: false,
                unfetchable: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    /// Credit native lamports to a wallet, creating it if needed.
    pub fn airdrop(&self, address: &Pubkey, lamports: u64) {
        let mut state = self.lock();
        let account = state.accounts.entry(*address).or_insert_with(|| AccountData {
            owner: SYSTEM_PROGRAM_ID,
            lamports: 0,
            data: Vec::new(),
        });
        account.lamports = account.lamports.saturating_add(lamports);
    }

    /// Place an initialized mint account directly.
    pub fn set_mint(&self, mint: &Pubkey, decimals: u8, authority: Option<Pubkey>, supply: u64) {
        let data = pack_mint(&MintState {
            mint_authority: authority,
            supply,
            decimals,
            is_initialized: true,
            freeze_authority: None,
        });
        self.set_account(mint, TOKEN_PROGRAM_ID, data);
    }

    /// Place `owner`'s associated token account for `mint` with `amount`.
    pub fn set_token_balance(&self, owner: &Pubkey, mint: &Pubkey, amount: u64) -> Pubkey {
        let address = derive_associated_token_address(owner, mint).unwrap_or_default();
        let data = pack_token_account(&TokenAccountState {
            mint: *mint,
            owner: *owner,
            amount,
            delegate: None,
            state: AccountState::Initialized,
        });
        self.set_account(&address, TOKEN_PROGRAM_ID, data);
        address
    }

    pub fn set_account(&self, address: &Pubkey, owner: Pubkey, data: Vec<u8>) {
        let lamports = rent_exempt_minimum(data.len());
        self.lock().accounts.insert(
            *address,
            AccountData {
                owner,
                lamports,
                data,
            },
        );
    }

    /// Record a transaction directly in history, listed under `involved`.
    pub fn insert_transaction(&self, detail: TransactionDetail, involved: &[Pubkey]) {
        let mut state = self.lock();
        let info = SignatureInfo {
            signature: detail.signature.clone(),
            slot: detail.slot,
            block_time: detail.block_time,
            err: detail.err.clone(),
        };
        state.log.insert(0, (info, involved.to_vec()));
        state.transactions.insert(detail.signature.clone(), detail);
    }

    // -----------------------------------------------------------------------
    // Fault knobs
    // -----------------------------------------------------------------------

    pub fn set_confirmation_mode(&self, mode: ConfirmationMode) {
        self.lock().confirmation = mode;
    }

    /// The next submission is refused with `err` and changes nothing.
    pub fn reject_next_send(&self, err: TransactionError) {
        self.lock().reject_next = Some(err);
    }

    pub fn set_history_available(&self, available: bool) {
        self.lock().history_unavailable = !available;
    }

    /// `get_transaction` fails for this signature.
    pub fn make_unfetchable(&self, signature: &str) {
        self.lock().unfetchable.insert(signature.to_string());
    }

    pub fn advance_block_height(&self, blocks: u64) {
        let mut state = self.lock();
        state.block_height += blocks;
        state.slot += blocks;
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Transactions accepted so far.
    pub fn sent_count(&self) -> usize {
        self.lock().sent
    }

    pub fn lamports(&self, address: &Pubkey) -> u64 {
        self.lock().accounts.get(address).map_or(0, |a| a.lamports)
    }

    pub fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Option<u64> {
        let address = derive_associated_token_address(owner, mint).ok()?;
        let state = self.lock();
        let account = state.accounts.get(&address)?;
        unpack_token_account(&account.data).ok().map(|t| t.amount)
    }

    pub fn mint_state(&self, mint: &Pubkey) -> Option<MintState> {
        let state = self.lock();
        unpack_mint(&state.accounts.get(mint)?.data).ok()
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

type ExecResult = Result<(), InstructionError>;

fn custom(code: u32) -> InstructionError {
    InstructionError::Custom(code)
}

fn other(name: &str) -> InstructionError {
    InstructionError::Other(name.to_string())
}

struct Executor<'a> {
    accounts: &'a mut HashMap<Pubkey, AccountData>,
    signers: &'a [Pubkey],
}

impl Executor<'_> {
    fn require_signer(&self, key: &Pubkey) -> ExecResult {
        if self.signers.contains(key) {
            Ok(())
        } else {
            Err(other("MissingRequiredSignature"))
        }
    }

    fn debit(&mut self, from: &Pubkey, lamports: u64) -> ExecResult {
        let account = self.accounts.get_mut(from).ok_or_else(|| custom(1))?;
        account.lamports = account.lamports.checked_sub(lamports).ok_or_else(|| custom(1))?;
        Ok(())
    }

    fn create(&mut self, payer: &Pubkey, address: &Pubkey, lamports: u64, space: usize, owner: Pubkey) -> ExecResult {
        // System AccountAlreadyInUse.
        if self.accounts.contains_key(address) {
            return Err(custom(0));
        }
        self.debit(payer, lamports)?;
        self.accounts.insert(
            *address,
            AccountData {
                owner,
                lamports,
                data: vec![0u8; space],
            },
        );
        Ok(())
    }

    fn mint(&self, address: &Pubkey) -> Result<MintState, InstructionError> {
        let account = self.accounts.get(address).ok_or_else(|| custom(2))?;
        if account.owner != TOKEN_PROGRAM_ID {
            return Err(custom(2));
        }
        let state = unpack_mint(&account.data).map_err(|_| custom(2))?;
        if !state.is_initialized {
            return Err(other("UninitializedAccount"));
        }
        Ok(state)
    }

    fn token_account(&self, address: &Pubkey) -> Result<TokenAccountState, InstructionError> {
        let account = self
            .accounts
            .get(address)
            .ok_or_else(|| other("InvalidAccountData"))?;
        unpack_token_account(&account.data).map_err(|_| other("InvalidAccountData"))
    }

    fn store(&mut self, address: &Pubkey, data: Vec<u8>) -> ExecResult {
        let account = self
            .accounts
            .get_mut(address)
            .ok_or_else(|| other("InvalidAccountData"))?;
        account.data = data;
        Ok(())
    }

    fn run(&mut self, program: &Pubkey, accounts: &[Pubkey], data: &[u8]) -> ExecResult {
        let account = |i: usize| accounts.get(i).copied().ok_or_else(|| other("NotEnoughAccountKeys"));

        if *program == SYSTEM_PROGRAM_ID {
            let tag = data
                .get(0..4)
                .and_then(|b| b.try_into().ok())
                .map(u32::from_le_bytes)
                .ok_or_else(|| other("InvalidInstructionData"))?;
            let u64_at = |offset: usize| {
                data.get(offset..offset + 8)
                    .and_then(|b| b.try_into().ok())
                    .map(u64::from_le_bytes)
                    .ok_or_else(|| other("InvalidInstructionData"))
            };
            return match tag {
                SYSTEM_IX_CREATE_ACCOUNT => {
                    let (from, new) = (account(0)?, account(1)?);
                    self.require_signer(&from)?;
                    self.require_signer(&new)?;
                    let owner: [u8; 32] = data
                        .get(20..52)
                        .and_then(|b| b.try_into().ok())
                        .ok_or_else(|| other("InvalidInstructionData"))?;
                    self.create(&from, &new, u64_at(4)?, u64_at(12)? as usize, Pubkey::new(owner))
                }
                SYSTEM_IX_TRANSFER => {
                    let (from, to) = (account(0)?, account(1)?);
                    self.require_signer(&from)?;
                    let lamports = u64_at(4)?;
                    self.debit(&from, lamports)?;
                    let dest = self.accounts.entry(to).or_insert_with(|| AccountData {
                        owner: SYSTEM_PROGRAM_ID,
                        lamports: 0,
                        data: Vec::new(),
                    });
                    dest.lamports = dest.lamports.saturating_add(lamports);
                    Ok(())
                }
                _ => Err(other("InvalidInstructionData")),
            };
        }

        if *program == ASSOCIATED_TOKEN_PROGRAM_ID {
            let (payer, ata, wallet, mint) = (account(0)?, account(1)?, account(2)?, account(3)?);
            let idempotent = data.first() == Some(&1);
            if derive_associated_token_address(&wallet, &mint).ok() != Some(ata) {
                return Err(other("InvalidSeeds"));
            }
            if self.accounts.contains_key(&ata) {
                return if idempotent { Ok(()) } else { Err(custom(0)) };
            }
            self.mint(&mint)?;
            self.require_signer(&payer)?;
            self.create(
                &payer,
                &ata,
                rent_exempt_minimum(TOKEN_ACCOUNT_SIZE),
                TOKEN_ACCOUNT_SIZE,
                TOKEN_PROGRAM_ID,
            )?;
            return self.store(
                &ata,
                pack_token_account(&TokenAccountState {
                    mint,
                    owner: wallet,
                    amount: 0,
                    delegate: None,
                    state: AccountState::Initialized,
                }),
            );
        }

        if *program == TOKEN_PROGRAM_ID {
            let ix = decode_token_instruction(data).map_err(|_| other("InvalidInstructionData"))?;
            return match ix {
                TokenInstruction::InitializeMint {
                    decimals,
                    mint_authority,
                    freeze_authority,
                } => {
                    let mint = account(0)?;
                    let existing = self.accounts.get(&mint).ok_or_else(|| other("InvalidAccountData"))?;
                    if existing.owner != TOKEN_PROGRAM_ID || existing.data.len() != MINT_SIZE {
                        return Err(other("InvalidAccountData"));
                    }
                    if existing.data.iter().any(|b| *b != 0) {
                        // AlreadyInUse.
                        return Err(custom(6));
                    }
                    self.store(
                        &mint,
                        pack_mint(&MintState {
                            mint_authority: Some(mint_authority),
                            supply: 0,
                            decimals,
                            is_initialized: true,
                            freeze_authority,
                        }),
                    )
                }
                TokenInstruction::MintTo { amount } => {
                    let (mint_key, dest_key, authority) = (account(0)?, account(1)?, account(2)?);
                    let mut mint = self.mint(&mint_key)?;
                    match mint.mint_authority {
                        Some(a) if a == authority => {}
                        Some(_) => return Err(custom(4)),
                        None => return Err(custom(5)),
                    }
                    self.require_signer(&authority)?;
                    let mut dest = self.token_account(&dest_key)?;
                    if dest.mint != mint_key {
                        return Err(custom(3));
                    }
                    // Overflow.
                    mint.supply = mint.supply.checked_add(amount).ok_or_else(|| custom(14))?;
                    dest.amount = dest.amount.checked_add(amount).ok_or_else(|| custom(14))?;
                    self.store(&mint_key, pack_mint(&mint))?;
                    self.store(&dest_key, pack_token_account(&dest))
                }
                TokenInstruction::Transfer { amount } => {
                    let (src_key, dst_key, owner) = (account(0)?, account(1)?, account(2)?);
                    let mut src = self.token_account(&src_key)?;
                    if src.owner != owner {
                        return Err(custom(4));
                    }
                    self.require_signer(&owner)?;
                    if src.amount < amount {
                        return Err(custom(1));
                    }
                    if src_key == dst_key {
                        return Ok(());
                    }
                    let mut dst = self.token_account(&dst_key)?;
                    if dst.mint != src.mint {
                        return Err(custom(3));
                    }
                    src.amount -= amount;
                    dst.amount = dst.amount.checked_add(amount).ok_or_else(|| custom(14))?;
                    self.store(&src_key, pack_token_account(&src))?;
                    self.store(&dst_key, pack_token_account(&dst))
                }
                _ => Err(other("UnsupportedInstruction")),
            };
        }

        Err(other("UnsupportedProgramId"))
    }
}

fn token_balances(
    accounts: &HashMap<Pubkey, AccountData>,
    keys: &[Pubkey],
) -> Vec<TokenBalanceRecord> {
    keys.iter()
        .enumerate()
        .filter_map(|(index, key)| {
            let account = accounts.get(key)?;
            if account.owner != TOKEN_PROGRAM_ID || account.data.len() != TOKEN_ACCOUNT_SIZE {
                return None;
            }
            let token = unpack_token_account(&account.data).ok()?;
            let decimals = accounts
                .get(&token.mint)
                .and_then(|m| unpack_mint(&m.data).ok())
                .map_or(0, |m| m.decimals);
            Some(TokenBalanceRecord {
                account_index: index,
                mint: token.mint,
                owner: Some(token.owner),
                amount: token.amount,
                decimals,
            })
        })
        .collect()
}

impl State {
    fn execute(&mut self, decoded: &DecodedTransaction) -> Result<String, ClientError> {
        let message = &decoded.message;
        let valid_until = self
            .issued_blockhashes
            .get(&message.recent_blockhash)
            .copied()
            .ok_or(ClientError::Transaction(TransactionError::BlockhashNotFound))?;
        if self.block_height > valid_until {
            return Err(ClientError::Transaction(TransactionError::BlockhashNotFound));
        }

        if let Some(err) = self.reject_next.take() {
            return Err(ClientError::Transaction(err));
        }

        let (Some(payer), Some(first_signature)) =
            (message.account_keys.first().copied(), decoded.signatures.first())
        else {
            return Err(ClientError::Transaction(TransactionError::AccountNotFound));
        };
        let fee = message.base_fee();
        if self.accounts.get(&payer).map_or(0, |a| a.lamports) < fee {
            return Err(ClientError::Transaction(
                TransactionError::InsufficientFundsForFee,
            ));
        }

        // Run against a copy so a failed instruction leaves nothing behind.
        let mut accounts = self.accounts.clone();
        let pre_token_balances = token_balances(&accounts, &message.account_keys);
        if let Some(payer_account) = accounts.get_mut(&payer) {
            payer_account.lamports -= fee;
        }

        let instructions: Vec<RawInstruction> = message
            .compiled_instructions
            .iter()
            .map(|ix| RawInstruction {
                program_id: message.account_keys[ix.program_id_index as usize],
                accounts: ix
                    .account_indices
                    .iter()
                    .map(|i| message.account_keys[*i as usize])
                    .collect(),
                data: ix.data.clone(),
            })
            .collect();

        {
            let mut executor = Executor {
                accounts: &mut accounts,
                signers: message.signers(),
            };
            for (index, ix) in instructions.iter().enumerate() {
                executor
                    .run(&ix.program_id, &ix.accounts, &ix.data)
                    .map_err(|error| {
                        // Preflight simulation refuses the transaction.
                        ClientError::Transaction(TransactionError::InstructionError {
                            index: index as u8,
                            error,
                        })
                    })?;
            }
        }

        let post_token_balances = token_balances(&accounts, &message.account_keys);
        self.accounts = accounts;

        let signature = bs58::encode(first_signature).into_string();
        self.block_height += 1;
        self.slot += 1;
        self.sent += 1;

        let detail = TransactionDetail {
            signature: signature.clone(),
            slot: self.slot,
            block_time: Some(unix_now()),
            fee,
            err: None,
            account_keys: message.account_keys.clone(),
            instructions,
            pre_token_balances,
            post_token_balances,
        };
        let info = SignatureInfo {
            signature: signature.clone(),
            slot: detail.slot,
            block_time: detail.block_time,
            err: None,
        };
        self.log.insert(0, (info, message.account_keys.clone()));
        self.transactions.insert(signature.clone(), detail);

        if let ConfirmationMode::AfterPolls(n) = self.confirmation {
            self.pending_polls.insert(signature.clone(), n);
        }

        Ok(signature)
    }
}

fn token_program_account(account: &AccountData) -> Option<TokenAccountState> {
    if account.owner != TOKEN_PROGRAM_ID || account.data.len() != TOKEN_ACCOUNT_SIZE {
        return None;
    }
    unpack_token_account(&account.data).ok()
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn get_latest_blockhash(&self) -> Result<LatestBlockhash, ClientError> {
        let mut state = self.lock();
        let mut blockhash = [0x42u8; 32];
        let counter = state.issued_blockhashes.len() as u64 + 1;
        blockhash[..8].copy_from_slice(&counter.to_le_bytes());
        let last_valid_block_height = state.block_height + BLOCKHASH_VALIDITY;
        state
            .issued_blockhashes
            .insert(blockhash, last_valid_block_height);
        Ok(LatestBlockhash {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn get_block_height(&self) -> Result<u64, ClientError> {
        Ok(self.lock().block_height)
    }

    async fn get_minimum_balance_for_rent_exemption(
        &self,
        size: usize,
    ) -> Result<u64, ClientError> {
        Ok(rent_exempt_minimum(size))
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, ClientError> {
        Ok(self.lamports(address))
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountData>, ClientError> {
        Ok(self.lock().accounts.get(address).cloned())
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<TokenAccountBalance>, ClientError> {
        let state = self.lock();
        let mut out: Vec<TokenAccountBalance> = state
            .accounts
            .iter()
            .filter_map(|(address, account)| {
                let token = token_program_account(account)?;
                if token.owner != *owner {
                    return None;
                }
                let decimals = state
                    .accounts
                    .get(&token.mint)
                    .and_then(|m| unpack_mint(&m.data).ok())
                    .map_or(0, |m| m.decimals);
                Some(TokenAccountBalance {
                    address: *address,
                    mint: token.mint,
                    owner: token.owner,
                    amount: token.amount,
                    decimals,
                })
            })
            .collect();
        out.sort_by_key(|t| t.address);
        Ok(out)
    }

    async fn send_transaction(&self, wire: &[u8]) -> Result<String, ClientError> {
        let decoded = decode_transaction(wire).map_err(|e| ClientError::Rpc {
            code: -32602,
            message: format!("failed to deserialize transaction: {e}"),
        })?;
        if !decoded.verify() {
            return Err(ClientError::Rpc {
                code: -32003,
                message: "Transaction signature verification failure".into(),
            });
        }

        let signature = self.lock().execute(&decoded)?;
        debug!(%signature, "memory ledger accepted transaction");
        Ok(signature)
    }

    async fn get_signature_status(
        &self,
        signature: &str,
    ) -> Result<Option<SignatureStatus>, ClientError> {
        let mut state = self.lock();
        if !state.transactions.contains_key(signature) {
            return Ok(None);
        }
        match state.confirmation {
            ConfirmationMode::Never => return Ok(None),
            ConfirmationMode::AfterPolls(_) => {
                if let Some(remaining) = state.pending_polls.get_mut(signature) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Ok(None);
                    }
                }
            }
            ConfirmationMode::Immediate => {}
        }
        let err = state.transactions.get(signature).and_then(|t| t.err.clone());
        Ok(Some(SignatureStatus {
            confirmation: Some(Commitment::Finalized),
            err,
        }))
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<SignatureInfo>, ClientError> {
        let state = self.lock();
        if state.history_unavailable {
            return Err(ClientError::Transport("history service unavailable".into()));
        }

        let mut entries = state
            .log
            .iter()
            .filter(|(_, involved)| involved.contains(address))
            .map(|(info, _)| info);

        if let Some(cursor) = before {
            // Skip through the cursor itself.
            if !entries.by_ref().any(|info| info.signature == cursor) {
                return Ok(Vec::new());
            }
        }

        Ok(entries.take(limit).cloned().collect())
    }

    async fn get_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<TransactionDetail>, ClientError> {
        let state = self.lock();
        if state.unfetchable.contains(signature) {
            return Err(ClientError::Rpc {
                code: -32009,
                message: format!("transaction {signature} unavailable"),
            });
        }
        Ok(state.transactions.get(signature).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chain_sol::{
        build_create_account, build_initialize_mint, build_mint_to, build_spl_transfer,
        compile_transaction, Keypair, PartiallySignedTransaction, SolInstruction,
    };

    use super::*;

    async fn send(
        ledger: &MemoryLedger,
        payer: &Keypair,
        extra: &[&Keypair],
        ixs: &[SolInstruction],
    ) -> Result<String, ClientError> {
        let hash = ledger.get_latest_blockhash().await.unwrap();
        let msg = compile_transaction(ixs, &payer.pubkey(), &hash.blockhash).unwrap();
        let mut tx = PartiallySignedTransaction::new(msg).unwrap();
        tx.partial_sign(payer).unwrap();
        for k in extra {
            tx.partial_sign(k).unwrap();
        }
        ledger.send_transaction(&tx.to_wire().unwrap()).await
    }

    #[test]
    fn rent_matches_network_values() {
        assert_eq!(rent_exempt_minimum(MINT_SIZE), 1_461_600);
        assert_eq!(rent_exempt_minimum(TOKEN_ACCOUNT_SIZE), 2_039_280);
    }

    #[tokio::test]
    async fn creates_and_initializes_a_mint() {
        let ledger = MemoryLedger::new();
        let payer = Keypair::generate();
        let mint = Keypair::generate();
        ledger.airdrop(&payer.pubkey(), 1_000_000_000);

        let ixs = vec![
            build_create_account(
                &payer.pubkey(),
                &mint.pubkey(),
                rent_exempt_minimum(MINT_SIZE),
                MINT_SIZE as u64,
                &TOKEN_PROGRAM_ID,
            ),
            build_initialize_mint(&mint.pubkey(), 6, &payer.pubkey(), None).unwrap(),
        ];
        send(&ledger, &payer, &[&mint], &ixs).await.unwrap();

        let state = ledger.mint_state(&mint.pubkey()).unwrap();
        assert_eq!(state.decimals, 6);
        assert_eq!(state.mint_authority, Some(payer.pubkey()));
        assert_eq!(
            ledger.lamports(&payer.pubkey()),
            1_000_000_000 - 1_461_600 - 10_000
        );
    }

    #[tokio::test]
    async fn failed_instruction_rolls_back_everything() {
        let ledger = MemoryLedger::new();
        let owner = Keypair::generate();
        let mint = Pubkey::new([3; 32]);
        ledger.airdrop(&owner.pubkey(), 1_000_000);
        ledger.set_mint(&mint, 0, Some(owner.pubkey()), 10);
        let src = ledger.set_token_balance(&owner.pubkey(), &mint, 10);
        let dst = ledger.set_token_balance(&Pubkey::new([4; 32]), &mint, 0);

        let ixs = vec![
            build_mint_to(&mint, &src, &owner.pubkey(), 5).unwrap(),
            build_spl_transfer(&src, &dst, &owner.pubkey(), 100).unwrap(),
        ];
        let err = send(&ledger, &owner, &[], &ixs).await.unwrap_err();

        assert!(matches!(
            err,
            ClientError::Transaction(TransactionError::InstructionError {
                index: 1,
                error: InstructionError::Custom(1)
            })
        ));
        assert_eq!(ledger.token_balance(&owner.pubkey(), &mint), Some(10));
        assert_eq!(ledger.lamports(&owner.pubkey()), 1_000_000);
        assert_eq!(ledger.sent_count(), 0);
    }

    #[tokio::test]
    async fn mint_to_requires_the_authority() {
        let ledger = MemoryLedger::new();
        let stranger = Keypair::generate();
        let mint = Pubkey::new([3; 32]);
        ledger.airdrop(&stranger.pubkey(), 1_000_000);
        ledger.set_mint(&mint, 0, Some(Pubkey::new([8; 32])), 0);
        let dest = ledger.set_token_balance(&stranger.pubkey(), &mint, 0);

        let ix = build_mint_to(&mint, &dest, &stranger.pubkey(), 5).unwrap();
        let err = send(&ledger, &stranger, &[], &[ix]).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transaction(TransactionError::InstructionError {
                error: InstructionError::Custom(4),
                ..
            })
        ));
    }

    async fn signed_create(ledger: &MemoryLedger, blockhash: [u8; 32]) -> Vec<u8> {
        let payer = Keypair::generate();
        let mint = Keypair::generate();
        ledger.airdrop(&payer.pubkey(), 1_000_000_000);
        let ixs = vec![
            build_create_account(&payer.pubkey(), &mint.pubkey(), 1_461_600, 82, &TOKEN_PROGRAM_ID),
            build_initialize_mint(&mint.pubkey(), 0, &payer.pubkey(), None).unwrap(),
        ];
        let msg = compile_transaction(&ixs, &payer.pubkey(), &blockhash).unwrap();
        let mut tx = PartiallySignedTransaction::new(msg).unwrap();
        tx.partial_sign(&payer).unwrap();
        tx.partial_sign(&mint).unwrap();
        tx.to_wire().unwrap()
    }

    #[tokio::test]
    async fn unknown_blockhash_is_refused() {
        let ledger = MemoryLedger::new();
        let wire = signed_create(&ledger, [0u8; 32]).await;
        let err = ledger.send_transaction(&wire).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transaction(TransactionError::BlockhashNotFound)
        ));
    }

    #[tokio::test]
    async fn expired_blockhash_is_refused() {
        let ledger = MemoryLedger::new();
        let hash = ledger.get_latest_blockhash().await.unwrap();
        let wire = signed_create(&ledger, hash.blockhash).await;
        ledger.advance_block_height(BLOCKHASH_VALIDITY + 1);
        let err = ledger.send_transaction(&wire).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transaction(TransactionError::BlockhashNotFound)
        ));
    }

    #[tokio::test]
    async fn tampered_wire_fails_verification() {
        let ledger = MemoryLedger::new();
        let hash = ledger.get_latest_blockhash().await.unwrap();
        let mut wire = signed_create(&ledger, hash.blockhash).await;
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        let err = ledger.send_transaction(&wire).await.unwrap_err();
        assert!(matches!(err, ClientError::Rpc { code: -32003, .. }));
        assert_eq!(ledger.sent_count(), 0);
    }

    #[tokio::test]
    async fn signatures_page_with_cursor() {
        let ledger = MemoryLedger::new();
        let owner = Pubkey::new([1; 32]);
        for i in 0..5u8 {
            ledger.insert_transaction(
                TransactionDetail {
                    signature: format!("sig-{i}"),
                    slot: u64::from(i),
                    block_time: Some(i64::from(i)),
                    fee: 5_000,
                    err: None,
                    account_keys: vec![owner],
                    instructions: vec![],
                    pre_token_balances: vec![],
                    post_token_balances: vec![],
                },
                &[owner],
            );
        }

        let first = ledger.get_signatures_for_address(&owner, 2, None).await.unwrap();
        let sigs: Vec<_> = first.iter().map(|s| s.signature.as_str()).collect();
        assert_eq!(sigs, vec!["sig-4", "sig-3"]);

        let second = ledger
            .get_signatures_for_address(&owner, 2, Some("sig-3"))
            .await
            .unwrap();
        let sigs: Vec<_> = second.iter().map(|s| s.signature.as_str()).collect();
        assert_eq!(sigs, vec!["sig-2", "sig-1"]);

        let last = ledger
            .get_signatures_for_address(&owner, 2, Some("sig-1"))
            .await
            .unwrap();
        assert_eq!(last.len(), 1);
    }

    #[tokio::test]
    async fn confirmation_after_polls() {
        let ledger = MemoryLedger::new();
        ledger.set_confirmation_mode(ConfirmationMode::AfterPolls(2));
        let payer = Keypair::generate();
        let mint = Keypair::generate();
        ledger.airdrop(&payer.pubkey(), 1_000_000_000);
        let ixs = vec![
            build_create_account(&payer.pubkey(), &mint.pubkey(), 1_461_600, 82, &TOKEN_PROGRAM_ID),
            build_initialize_mint(&mint.pubkey(), 0, &payer.pubkey(), None).unwrap(),
        ];
        let sig = send(&ledger, &payer, &[&mint], &ixs).await.unwrap();

        assert_eq!(ledger.get_signature_status(&sig).await.unwrap(), None);
        assert_eq!(ledger.get_signature_status(&sig).await.unwrap(), None);
        let status = ledger.get_signature_status(&sig).await.unwrap().unwrap();
        assert_eq!(status.confirmation, Some(Commitment::Finalized));
    }
}
