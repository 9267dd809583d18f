//! Solana primitives for the token engine.
//!
//! This crate handles addresses, keypairs, the compact binary wire format,
//! and the SPL Token / Associated Token Account instructions, all without
//! pulling in `solana-sdk` (which drags in 200+ transitive dependencies).
//!
//! Instead we implement Solana's message and transaction layout by hand,
//! using `ed25519-dalek` for Ed25519 signing and `bs58` for Base58 encoding.

pub mod address;
pub mod error;
pub mod keypair;
pub mod spl_token;
pub mod transaction;

// Re-export key public types for ergonomic imports.
pub use address::{address_to_bytes, bytes_to_address, Pubkey};
pub use error::SolError;
pub use keypair::{verify_signature, Keypair};
pub use spl_token::{
    build_create_associated_token_account_idempotent, build_initialize_mint, build_mint_to,
    build_spl_transfer, decode_token_instruction, derive_associated_token_address, pack_mint,
    pack_token_account, unpack_mint, unpack_token_account, AccountState, MintState,
    TokenAccountState, TokenInstruction, ASSOCIATED_TOKEN_PROGRAM_ID, MAX_DECIMALS, MINT_SIZE,
    SYSVAR_RENT_ID, TOKEN_ACCOUNT_SIZE, TOKEN_PROGRAM_ID,
};
pub use transaction::{
    build_create_account, compile_transaction, decode_compact_u16, decode_transaction,
    encode_compact_u16, serialize_message, CompiledInstruction, DecodedTransaction,
    PartiallySignedTransaction, SolAccountMeta, SolInstruction, SolTransaction,
    LAMPORTS_PER_SIGNATURE, SYSTEM_PROGRAM_ID,
};
