//! SPL Token program support.
//!
//! Instruction builders for the subset the token engine needs (create a mint,
//! issue supply, move balances), associated token account (ATA) derivation,
//! account layout unpacking, and instruction decoding for history views. None
//! of this pulls in the `spl-token` or `solana-sdk` crates.

use sha2::{Digest, Sha256};

use crate::address::Pubkey;
use crate::error::SolError;
use crate::transaction::{SolAccountMeta, SolInstruction, SYSTEM_PROGRAM_ID};

// ---------------------------------------------------------------------------
// Well-known program IDs
// ---------------------------------------------------------------------------

/// SPL Token Program ID: `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: Pubkey = Pubkey::new([
    0x06, 0xdd, 0xf6, 0xe1, 0xd7, 0x65, 0xa1, 0x93, 0xd9, 0xcb, 0xe1, 0x46, 0xce, 0xeb, 0x79,
    0xac, 0x1c, 0xb4, 0x85, 0xed, 0x5f, 0x5b, 0x37, 0x91, 0x3a, 0x8c, 0xf5, 0x85, 0x7e, 0xff,
    0x00, 0xa9,
]);

/// Associated Token Account Program ID: `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = Pubkey::new([
    0x8c, 0x97, 0x25, 0x8f, 0x4e, 0x24, 0x89, 0xf1, 0xbb, 0x3d, 0x10, 0x29, 0x14, 0x8e, 0x0d,
    0x83, 0x0b, 0x5a, 0x13, 0x99, 0xda, 0xff, 0x10, 0x84, 0x04, 0x8e, 0x7b, 0xd8, 0xdb, 0xe9,
    0xf8, 0x59,
]);

/// Rent sysvar: `SysvarRent111111111111111111111111111111111`
pub const SYSVAR_RENT_ID: Pubkey = Pubkey::new([
    0x06, 0xa7, 0xd5, 0x17, 0x19, 0x2c, 0x5c, 0x51, 0x21, 0x8c, 0xc9, 0x4c, 0x3d, 0x4a, 0xf1,
    0x7f, 0x58, 0xda, 0xee, 0x08, 0x9b, 0xa1, 0xfd, 0x44, 0xe3, 0xdb, 0xd9, 0x8a, 0x00, 0x00,
    0x00, 0x00,
]);

/// Size of a packed mint account.
pub const MINT_SIZE: usize = 82;

/// Size of a packed token account.
pub const TOKEN_ACCOUNT_SIZE: usize = 165;

/// Largest decimals value the engine accepts for a mint.
pub const MAX_DECIMALS: u8 = 18;

/// The string appended to PDA derivation: "ProgramDerivedAddress".
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

// Instruction tags of the token program.
const IX_INITIALIZE_MINT: u8 = 0;
const IX_INITIALIZE_ACCOUNT: u8 = 1;
const IX_TRANSFER: u8 = 3;
const IX_MINT_TO: u8 = 7;
const IX_BURN: u8 = 8;
const IX_TRANSFER_CHECKED: u8 = 12;
const IX_MINT_TO_CHECKED: u8 = 14;
const IX_BURN_CHECKED: u8 = 15;
const IX_INITIALIZE_MINT2: u8 = 20;

/// Associated token program `CreateIdempotent` tag.
const ATA_IX_CREATE_IDEMPOTENT: u8 = 1;

// ---------------------------------------------------------------------------
// Instruction builders
// ---------------------------------------------------------------------------

/// Build an `InitializeMint` instruction.
///
/// # Wire format
///
/// `[0, decimals, mint_authority(32), freeze_tag, freeze_authority(32)?]`,
/// 35 bytes without a freeze authority, 67 with one.
pub fn build_initialize_mint(
    mint: &Pubkey,
    decimals: u8,
    mint_authority: &Pubkey,
    freeze_authority: Option<&Pubkey>,
) -> Result<SolInstruction, SolError> {
    if decimals > MAX_DECIMALS {
        return Err(SolError::TransactionBuildError(format!(
            "decimals must be <= {MAX_DECIMALS}, got {decimals}"
        )));
    }

    let mut data = Vec::with_capacity(67);
    data.push(IX_INITIALIZE_MINT);
    data.push(decimals);
    data.extend_from_slice(mint_authority.as_bytes());
    match freeze_authority {
        Some(freeze) => {
            data.push(1);
            data.extend_from_slice(freeze.as_bytes());
        }
        None => data.push(0),
    }

    Ok(SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*mint, false),
            SolAccountMeta::readonly(SYSVAR_RENT_ID, false),
        ],
        data,
    })
}

/// Build a `MintTo` instruction issuing `amount` base units to `destination`.
///
/// Accounts: mint (writable), destination token account (writable),
/// mint authority (signer). Data: `[7] + u64 LE amount`.
pub fn build_mint_to(
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
) -> Result<SolInstruction, SolError> {
    if amount == 0 {
        return Err(SolError::TransactionBuildError(
            "mint amount must be > 0".into(),
        ));
    }

    Ok(SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*mint, false),
            SolAccountMeta::writable(*destination, false),
            SolAccountMeta::readonly(*authority, true),
        ],
        data: amount_data(IX_MINT_TO, amount),
    })
}

/// Build an SPL Token `Transfer` instruction.
///
/// `amount` is in base units (for a token with 6 decimals, `1_000_000`
/// moves one whole token). Data: `[3] + u64 LE amount`, 9 bytes.
pub fn build_spl_transfer(
    from_token_account: &Pubkey,
    to_token_account: &Pubkey,
    owner: &Pubkey,
    amount: u64,
) -> Result<SolInstruction, SolError> {
    if amount == 0 {
        return Err(SolError::TransactionBuildError(
            "SPL transfer amount must be > 0".into(),
        ));
    }

    Ok(SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*from_token_account, false),
            SolAccountMeta::writable(*to_token_account, false),
            SolAccountMeta::readonly(*owner, true),
        ],
        data: amount_data(IX_TRANSFER, amount),
    })
}

/// Build an associated token program `CreateIdempotent` instruction.
///
/// Succeeds on chain even when the account already exists, so concurrent
/// senders racing to create the same recipient account do not fail.
/// Returns the instruction together with the derived account address.
pub fn build_create_associated_token_account_idempotent(
    payer: &Pubkey,
    wallet: &Pubkey,
    mint: &Pubkey,
) -> Result<(SolInstruction, Pubkey), SolError> {
    let ata = derive_associated_token_address(wallet, mint)?;

    let ix = SolInstruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*payer, true),
            SolAccountMeta::writable(ata, false),
            SolAccountMeta::readonly(*wallet, false),
            SolAccountMeta::readonly(*mint, false),
            SolAccountMeta::readonly(SYSTEM_PROGRAM_ID, false),
            SolAccountMeta::readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![ATA_IX_CREATE_IDEMPOTENT],
    };

    Ok((ix, ata))
}

fn amount_data(tag: u8, amount: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(9);
    data.push(tag);
    data.extend_from_slice(&amount.to_le_bytes());
    data
}

// ---------------------------------------------------------------------------
// Instruction decoding
// ---------------------------------------------------------------------------

/// A decoded token program instruction.
///
/// Only the variants that matter for balances and history carry fields; all
/// other instructions decode to [`TokenInstruction::Other`] with their tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenInstruction {
    InitializeMint {
        decimals: u8,
        mint_authority: Pubkey,
        freeze_authority: Option<Pubkey>,
    },
    InitializeAccount,
    Transfer {
        amount: u64,
    },
    MintTo {
        amount: u64,
    },
    Burn {
        amount: u64,
    },
    TransferChecked {
        amount: u64,
        decimals: u8,
    },
    MintToChecked {
        amount: u64,
        decimals: u8,
    },
    BurnChecked {
        amount: u64,
        decimals: u8,
    },
    Other(u8),
}

/// Decode the data payload of a token program instruction.
pub fn decode_token_instruction(data: &[u8]) -> Result<TokenInstruction, SolError> {
    let (&tag, rest) = data
        .split_first()
        .ok_or_else(|| SolError::InvalidInstructionData("empty instruction data".into()))?;

    let ix = match tag {
        IX_INITIALIZE_MINT | IX_INITIALIZE_MINT2 => {
            let decimals = *rest
                .first()
                .ok_or_else(|| truncated("InitializeMint"))?;
            let mint_authority = read_pubkey(rest, 1).ok_or_else(|| truncated("InitializeMint"))?;
            let freeze_authority = match rest.get(33) {
                Some(1) => Some(read_pubkey(rest, 34).ok_or_else(|| truncated("InitializeMint"))?),
                _ => None,
            };
            TokenInstruction::InitializeMint {
                decimals,
                mint_authority,
                freeze_authority,
            }
        }
        IX_INITIALIZE_ACCOUNT => TokenInstruction::InitializeAccount,
        IX_TRANSFER => TokenInstruction::Transfer {
            amount: read_u64(rest, 0).ok_or_else(|| truncated("Transfer"))?,
        },
        IX_MINT_TO => TokenInstruction::MintTo {
            amount: read_u64(rest, 0).ok_or_else(|| truncated("MintTo"))?,
        },
        IX_BURN => TokenInstruction::Burn {
            amount: read_u64(rest, 0).ok_or_else(|| truncated("Burn"))?,
        },
        IX_TRANSFER_CHECKED => TokenInstruction::TransferChecked {
            amount: read_u64(rest, 0).ok_or_else(|| truncated("TransferChecked"))?,
            decimals: *rest.get(8).ok_or_else(|| truncated("TransferChecked"))?,
        },
        IX_MINT_TO_CHECKED => TokenInstruction::MintToChecked {
            amount: read_u64(rest, 0).ok_or_else(|| truncated("MintToChecked"))?,
            decimals: *rest.get(8).ok_or_else(|| truncated("MintToChecked"))?,
        },
        IX_BURN_CHECKED => TokenInstruction::BurnChecked {
            amount: read_u64(rest, 0).ok_or_else(|| truncated("BurnChecked"))?,
            decimals: *rest.get(8).ok_or_else(|| truncated("BurnChecked"))?,
        },
        other => TokenInstruction::Other(other),
    };

    Ok(ix)
}

fn truncated(name: &str) -> SolError {
    SolError::InvalidInstructionData(format!("{name} data truncated"))
}

// ---------------------------------------------------------------------------
// Account layouts
// ---------------------------------------------------------------------------

/// State of an unpacked mint account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintState {
    pub mint_authority: Option<Pubkey>,
    pub supply: u64,
    pub decimals: u8,
    pub is_initialized: bool,
    pub freeze_authority: Option<Pubkey>,
}

/// Token account state byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Uninitialized,
    Initialized,
    Frozen,
}

/// State of an unpacked token account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccountState {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    pub delegate: Option<Pubkey>,
    pub state: AccountState,
}

/// Unpack an 82-byte mint account.
///
/// ```text
/// 0..36   mint_authority   COption<Pubkey>
/// 36..44  supply           u64
/// 44      decimals         u8
/// 45      is_initialized   bool
/// 46..82  freeze_authority COption<Pubkey>
/// ```
pub fn unpack_mint(data: &[u8]) -> Result<MintState, SolError> {
    if data.len() != MINT_SIZE {
        return Err(SolError::InvalidAccountData(format!(
            "expected {MINT_SIZE} bytes for a mint, got {}",
            data.len()
        )));
    }

    let is_initialized = match data[45] {
        0 => false,
        1 => true,
        other => {
            return Err(SolError::InvalidAccountData(format!(
                "invalid is_initialized flag {other}"
            )))
        }
    };

    Ok(MintState {
        mint_authority: read_coption_pubkey(data, 0)?,
        supply: read_u64(data, 36).ok_or_else(|| short_account("supply"))?,
        decimals: data[44],
        is_initialized,
        freeze_authority: read_coption_pubkey(data, 46)?,
    })
}

/// Unpack a 165-byte token account.
///
/// ```text
/// 0..32    mint
/// 32..64   owner
/// 64..72   amount            u64
/// 72..108  delegate          COption<Pubkey>
/// 108      state             u8
/// 109..165 is_native, delegated_amount, close_authority (ignored)
/// ```
pub fn unpack_token_account(data: &[u8]) -> Result<TokenAccountState, SolError> {
    if data.len() != TOKEN_ACCOUNT_SIZE {
        return Err(SolError::InvalidAccountData(format!(
            "expected {TOKEN_ACCOUNT_SIZE} bytes for a token account, got {}",
            data.len()
        )));
    }

    let state = match data[108] {
        0 => AccountState::Uninitialized,
        1 => AccountState::Initialized,
        2 => AccountState::Frozen,
        other => {
            return Err(SolError::InvalidAccountData(format!(
                "invalid account state {other}"
            )))
        }
    };

    Ok(TokenAccountState {
        mint: read_pubkey(data, 0).ok_or_else(|| short_account("mint"))?,
        owner: read_pubkey(data, 32).ok_or_else(|| short_account("owner"))?,
        amount: read_u64(data, 64).ok_or_else(|| short_account("amount"))?,
        delegate: read_coption_pubkey(data, 72)?,
        state,
    })
}

/// Pack a mint account. The inverse of [`unpack_mint`]; used to seed test
/// ledgers and local validators.
pub fn pack_mint(state: &MintState) -> Vec<u8> {
    let mut data = vec![0u8; MINT_SIZE];
    write_coption_pubkey(&mut data[0..36], state.mint_authority.as_ref());
    data[36..44].copy_from_slice(&state.supply.to_le_bytes());
    data[44] = state.decimals;
    data[45] = u8::from(state.is_initialized);
    write_coption_pubkey(&mut data[46..82], state.freeze_authority.as_ref());
    data
}

/// Pack a token account. The inverse of [`unpack_token_account`] for the
/// fields it keeps.
pub fn pack_token_account(state: &TokenAccountState) -> Vec<u8> {
    let mut data = vec![0u8; TOKEN_ACCOUNT_SIZE];
    data[0..32].copy_from_slice(state.mint.as_bytes());
    data[32..64].copy_from_slice(state.owner.as_bytes());
    data[64..72].copy_from_slice(&state.amount.to_le_bytes());
    write_coption_pubkey(&mut data[72..108], state.delegate.as_ref());
    data[108] = match state.state {
        AccountState::Uninitialized => 0,
        AccountState::Initialized => 1,
        AccountState::Frozen => 2,
    };
    data
}

fn short_account(field: &str) -> SolError {
    SolError::InvalidAccountData(format!("account data too short for {field}"))
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

fn read_pubkey(data: &[u8], offset: usize) -> Option<Pubkey> {
    let bytes: [u8; 32] = data.get(offset..offset + 32)?.try_into().ok()?;
    Some(Pubkey::new(bytes))
}

/// COption in account layouts: u32 LE tag (0 = None, 1 = Some) + 32 bytes.
fn read_coption_pubkey(data: &[u8], offset: usize) -> Result<Option<Pubkey>, SolError> {
    let tag_bytes: [u8; 4] = data
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| short_account("option tag"))?;

    match u32::from_le_bytes(tag_bytes) {
        0 => Ok(None),
        1 => read_pubkey(data, offset + 4)
            .map(Some)
            .ok_or_else(|| short_account("option value")),
        other => Err(SolError::InvalidAccountData(format!(
            "invalid option tag {other}"
        ))),
    }
}

fn write_coption_pubkey(out: &mut [u8], key: Option<&Pubkey>) {
    if let Some(key) = key {
        out[0..4].copy_from_slice(&1u32.to_le_bytes());
        out[4..36].copy_from_slice(key.as_bytes());
    }
}

// ---------------------------------------------------------------------------
// Associated Token Account (PDA) derivation
// ---------------------------------------------------------------------------

/// Derive the associated token account address for a wallet + mint pair.
///
/// The ATA is a Program Derived Address (PDA) with seeds
/// `[wallet_address, token_program_id, mint_address]` under the Associated
/// Token Account program. The bump search runs from 255 down to 0 and
/// takes the first result that is NOT on the Ed25519 curve.
pub fn derive_associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Result<Pubkey, SolError> {
    find_program_address(
        &[wallet.as_bytes(), TOKEN_PROGRAM_ID.as_bytes(), mint.as_bytes()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _bump)| address)
}

fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<(Pubkey, u8), SolError> {
    for bump in (0u8..=255).rev() {
        if let Some(address) = try_create_program_address(seeds, &[bump], program_id) {
            return Ok((address, bump));
        }
    }

    Err(SolError::InvalidAddress(
        "could not find valid PDA bump seed".into(),
    ))
}

/// `SHA-256(seeds.. || bump || program_id || "ProgramDerivedAddress")`,
/// rejected when the digest lands on the curve.
fn try_create_program_address(
    seeds: &[&[u8]],
    bump_seed: &[u8],
    program_id: &Pubkey,
) -> Option<Pubkey> {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(bump_seed);
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);

    let hash: [u8; 32] = hasher.finalize().into();
    if is_on_curve(&hash) {
        return None;
    }

    Some(Pubkey::new(hash))
}

fn is_on_curve(bytes: &[u8; 32]) -> bool {
    curve25519_dalek::edwards::CompressedEdwardsY(*bytes)
        .decompress()
        .is_some()
}
