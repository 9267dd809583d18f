//! Solana legacy transaction wire format and multi-party signing.
//!
//! Transactions are built by hand, no `solana-sdk`. The layout:
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        (see below)
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```
//!
//! Signing is split so that several parties can contribute: locally held
//! keys (for example a freshly generated mint) sign through
//! [`PartiallySignedTransaction::partial_sign`], while an external wallet
//! returns a detached signature that is attached with
//! [`PartiallySignedTransaction::add_signature`].

use crate::address::Pubkey;
use crate::error::SolError;
use crate::keypair::{verify_signature, Keypair};

// ---------------------------------------------------------------------------
// Solana System Program
// ---------------------------------------------------------------------------

/// The Solana System Program: 32 zero bytes, `11111111111111111111111111111111`.
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::new([0u8; 32]);

/// System Program `CreateAccount` instruction index (little-endian u32).
const SYSTEM_CREATE_ACCOUNT_IX_INDEX: u32 = 0;

/// Base fee charged per required signature.
pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in Solana's compact-u16 format.
///
/// - Values 0..0x7f       -> 1 byte
/// - Values 0x80..0x3fff  -> 2 bytes
/// - Values 0x4000..      -> 3 bytes
pub fn encode_compact_u16(val: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(3);
    let mut val = val as u32;

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

/// Decode a compact-u16 from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_compact_u16(bytes: &[u8]) -> Result<(u16, usize), SolError> {
    let mut val: u32 = 0;
    for (i, &byte) in bytes.iter().take(3).enumerate() {
        val |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            let out = u16::try_from(val).map_err(|_| {
                SolError::SerializationError(format!("compact-u16 overflow: {val}"))
            })?;
            return Ok((out, i + 1));
        }
    }
    Err(SolError::SerializationError(
        "truncated or oversized compact-u16".into(),
    ))
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A single account reference in a Solana instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolAccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl SolAccountMeta {
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// A Solana instruction (before it is compiled into a transaction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolInstruction {
    pub program_id: Pubkey,
    pub accounts: Vec<SolAccountMeta>,
    pub data: Vec<u8>,
}

/// A compiled, unsigned transaction message.
#[derive(Debug, Clone)]
pub struct SolTransaction {
    /// All account keys referenced by this transaction, in canonical order:
    ///   1. writable signers (fee payer first)
    ///   2. read-only signers
    ///   3. writable non-signers
    ///   4. read-only non-signers
    pub account_keys: Vec<Pubkey>,

    /// Number of required signatures (first N accounts are signers).
    pub num_required_signatures: u8,
    /// How many of the signing accounts are read-only.
    pub num_readonly_signed: u8,
    /// How many of the non-signing accounts are read-only.
    pub num_readonly_unsigned: u8,

    pub recent_blockhash: [u8; 32],

    /// Compiled instructions (account references replaced with indices).
    pub compiled_instructions: Vec<CompiledInstruction>,
}

impl SolTransaction {
    /// The accounts that must sign, in signature-slot order.
    pub fn signers(&self) -> &[Pubkey] {
        &self.account_keys[..self.num_required_signatures as usize]
    }

    /// Base network fee for this message.
    pub fn base_fee(&self) -> u64 {
        LAMPORTS_PER_SIGNATURE * u64::from(self.num_required_signatures)
    }
}

/// A compiled instruction where account references are replaced by u8 indices
/// into the transaction's `account_keys` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// System instructions
// ---------------------------------------------------------------------------

/// Build a System Program `CreateAccount` instruction.
///
/// Both the funding account and the new account must sign.
///
/// # Wire format
///
/// u32 LE index (0) + u64 LE lamports + u64 LE space + 32-byte owner = 52 bytes.
pub fn build_create_account(
    from: &Pubkey,
    new_account: &Pubkey,
    lamports: u64,
    space: u64,
    owner: &Pubkey,
) -> SolInstruction {
    let mut data = Vec::with_capacity(52);
    data.extend_from_slice(&SYSTEM_CREATE_ACCOUNT_IX_INDEX.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    data.extend_from_slice(&space.to_le_bytes());
    data.extend_from_slice(owner.as_bytes());

    SolInstruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![
            SolAccountMeta::writable(*from, true),
            SolAccountMeta::writable(*new_account, true),
        ],
        data,
    }
}

// ---------------------------------------------------------------------------
// Transaction compilation
// ---------------------------------------------------------------------------

/// Compile instructions into a message with a single fee payer.
///
/// The fee payer is always the first signer and is placed at index 0.
pub fn compile_transaction(
    instructions: &[SolInstruction],
    fee_payer: &Pubkey,
    recent_blockhash: &[u8; 32],
) -> Result<SolTransaction, SolError> {
    if instructions.is_empty() {
        return Err(SolError::TransactionBuildError(
            "transaction has no instructions".into(),
        ));
    }

    struct AccountEntry {
        pubkey: Pubkey,
        is_signer: bool,
        is_writable: bool,
    }

    // Instruction account lists are tiny, a linear scan beats hashing.
    let mut entries: Vec<AccountEntry> = Vec::new();
    let mut upsert = |pubkey: Pubkey, signer: bool, writable: bool| {
        if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
            entry.is_signer |= signer;
            entry.is_writable |= writable;
        } else {
            entries.push(AccountEntry {
                pubkey,
                is_signer: signer,
                is_writable: writable,
            });
        }
    };

    upsert(*fee_payer, true, true);
    for ix in instructions {
        for meta in &ix.accounts {
            upsert(meta.pubkey, meta.is_signer, meta.is_writable);
        }
        upsert(ix.program_id, false, false);
    }

    // Stable sort keeps insertion order inside each class, so the fee payer
    // (inserted first as a writable signer) stays at index 0.
    entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
        (true, true) => 0u8,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    if entries.len() > u8::MAX as usize {
        return Err(SolError::TransactionBuildError(format!(
            "too many accounts: {}",
            entries.len()
        )));
    }

    let num_signers = entries.iter().filter(|e| e.is_signer).count() as u8;
    let num_readonly_signed = entries
        .iter()
        .filter(|e| e.is_signer && !e.is_writable)
        .count() as u8;
    let num_readonly_unsigned = entries
        .iter()
        .filter(|e| !e.is_signer && !e.is_writable)
        .count() as u8;

    let account_keys: Vec<Pubkey> = entries.iter().map(|e| e.pubkey).collect();
    let index_of = |key: &Pubkey| -> Result<u8, SolError> {
        account_keys
            .iter()
            .position(|k| k == key)
            .map(|i| i as u8)
            .ok_or_else(|| {
                SolError::TransactionBuildError(format!("account {key} not in account keys"))
            })
    };

    let mut compiled = Vec::with_capacity(instructions.len());
    for ix in instructions {
        let program_id_index = index_of(&ix.program_id)?;
        let account_indices = ix
            .accounts
            .iter()
            .map(|meta| index_of(&meta.pubkey))
            .collect::<Result<Vec<_>, _>>()?;

        compiled.push(CompiledInstruction {
            program_id_index,
            account_indices,
            data: ix.data.clone(),
        });
    }

    Ok(SolTransaction {
        account_keys,
        num_required_signatures: num_signers,
        num_readonly_signed,
        num_readonly_unsigned,
        recent_blockhash: *recent_blockhash,
        compiled_instructions: compiled,
    })
}

/// Serialize the transaction message (the bytes that get signed).
pub fn serialize_message(tx: &SolTransaction) -> Result<Vec<u8>, SolError> {
    let mut buf = Vec::with_capacity(256);

    buf.push(tx.num_required_signatures);
    buf.push(tx.num_readonly_signed);
    buf.push(tx.num_readonly_unsigned);

    buf.extend_from_slice(&encode_compact_u16(compact_len(tx.account_keys.len())?));
    for key in &tx.account_keys {
        buf.extend_from_slice(key.as_bytes());
    }

    buf.extend_from_slice(&tx.recent_blockhash);

    buf.extend_from_slice(&encode_compact_u16(compact_len(
        tx.compiled_instructions.len(),
    )?));
    for ix in &tx.compiled_instructions {
        buf.push(ix.program_id_index);

        buf.extend_from_slice(&encode_compact_u16(compact_len(ix.account_indices.len())?));
        buf.extend_from_slice(&ix.account_indices);

        buf.extend_from_slice(&encode_compact_u16(compact_len(ix.data.len())?));
        buf.extend_from_slice(&ix.data);
    }

    Ok(buf)
}

fn compact_len(len: usize) -> Result<u16, SolError> {
    u16::try_from(len)
        .map_err(|_| SolError::SerializationError(format!("length {len} exceeds compact-u16")))
}

// ---------------------------------------------------------------------------
// Multi-party signing
// ---------------------------------------------------------------------------

/// A compiled message collecting signatures from several parties.
#[derive(Debug, Clone)]
pub struct PartiallySignedTransaction {
    message: SolTransaction,
    message_bytes: Vec<u8>,
    signatures: Vec<Option<[u8; 64]>>,
}

impl PartiallySignedTransaction {
    pub fn new(message: SolTransaction) -> Result<Self, SolError> {
        let message_bytes = serialize_message(&message)?;
        let signatures = vec![None; message.num_required_signatures as usize];
        Ok(Self {
            message,
            message_bytes,
            signatures,
        })
    }

    pub fn message(&self) -> &SolTransaction {
        &self.message
    }

    /// The exact bytes every signer must sign.
    pub fn message_bytes(&self) -> &[u8] {
        &self.message_bytes
    }

    /// Sign with a locally held key.
    pub fn partial_sign(&mut self, keypair: &Keypair) -> Result<(), SolError> {
        let signature = keypair.sign(&self.message_bytes);
        self.add_signature(&keypair.pubkey(), signature)
    }

    /// Attach a detached signature produced elsewhere (e.g. a wallet).
    ///
    /// The signature is verified against the message before it is accepted.
    pub fn add_signature(&mut self, signer: &Pubkey, signature: [u8; 64]) -> Result<(), SolError> {
        let slot = self
            .message
            .signers()
            .iter()
            .position(|k| k == signer)
            .ok_or_else(|| {
                SolError::SigningError(format!("{signer} is not a required signer"))
            })?;

        if !verify_signature(signer, &self.message_bytes, &signature) {
            return Err(SolError::SigningError(format!(
                "signature from {signer} does not verify"
            )));
        }

        self.signatures[slot] = Some(signature);
        Ok(())
    }

    /// Required signers that have not signed yet.
    pub fn missing_signers(&self) -> Vec<Pubkey> {
        self.message
            .signers()
            .iter()
            .zip(&self.signatures)
            .filter(|(_, sig)| sig.is_none())
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn is_fully_signed(&self) -> bool {
        self.signatures.iter().all(Option::is_some)
    }

    /// The transaction id: Base58 of the fee payer's signature.
    pub fn signature(&self) -> Option<String> {
        self.signatures
            .first()
            .copied()
            .flatten()
            .map(|sig| bs58::encode(sig).into_string())
    }

    /// Serialize into wire format. Every required signer must have signed.
    pub fn to_wire(&self) -> Result<Vec<u8>, SolError> {
        let missing = self.missing_signers();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
            return Err(SolError::SigningError(format!(
                "missing signatures from {}",
                names.join(", ")
            )));
        }

        let mut wire = Vec::with_capacity(1 + 64 * self.signatures.len() + self.message_bytes.len());
        wire.extend_from_slice(&encode_compact_u16(compact_len(self.signatures.len())?));
        for sig in self.signatures.iter().flatten() {
            wire.extend_from_slice(sig);
        }
        wire.extend_from_slice(&self.message_bytes);
        Ok(wire)
    }
}

// ---------------------------------------------------------------------------
// Wire decoding
// ---------------------------------------------------------------------------

/// A transaction parsed back out of wire format.
#[derive(Debug, Clone)]
pub struct DecodedTransaction {
    pub signatures: Vec<[u8; 64]>,
    pub message: SolTransaction,
    pub message_bytes: Vec<u8>,
}

impl DecodedTransaction {
    /// Every signature verifies against the message for its signer slot.
    pub fn verify(&self) -> bool {
        self.signatures.len() == self.message.num_required_signatures as usize
            && self
                .message
                .signers()
                .iter()
                .zip(&self.signatures)
                .all(|(key, sig)| verify_signature(key, &self.message_bytes, sig))
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], SolError> {
        let end = self.pos + n;
        let out = self.bytes.get(self.pos..end).ok_or_else(|| {
            SolError::SerializationError(format!("unexpected end of data at byte {}", self.pos))
        })?;
        self.pos = end;
        Ok(out)
    }

    fn byte(&mut self) -> Result<u8, SolError> {
        Ok(self.take(1)?[0])
    }

    fn compact(&mut self) -> Result<usize, SolError> {
        let rest = self.bytes.get(self.pos..).unwrap_or_default();
        let (val, used) = decode_compact_u16(rest)?;
        self.pos += used;
        Ok(val as usize)
    }
}

/// Parse a legacy transaction from wire format.
pub fn decode_transaction(wire: &[u8]) -> Result<DecodedTransaction, SolError> {
    let mut r = Reader { bytes: wire, pos: 0 };

    let num_sigs = r.compact()?;
    let mut signatures = Vec::with_capacity(num_sigs);
    for _ in 0..num_sigs {
        let mut sig = [0u8; 64];
        sig.copy_from_slice(r.take(64)?);
        signatures.push(sig);
    }

    let message_start = r.pos;
    let num_required_signatures = r.byte()?;
    let num_readonly_signed = r.byte()?;
    let num_readonly_unsigned = r.byte()?;

    let num_keys = r.compact()?;
    let mut account_keys = Vec::with_capacity(num_keys);
    for _ in 0..num_keys {
        let mut key = [0u8; 32];
        key.copy_from_slice(r.take(32)?);
        account_keys.push(Pubkey::new(key));
    }

    if (num_required_signatures as usize) > account_keys.len() {
        return Err(SolError::SerializationError(
            "more signers than account keys".into(),
        ));
    }

    let mut recent_blockhash = [0u8; 32];
    recent_blockhash.copy_from_slice(r.take(32)?);

    let num_ix = r.compact()?;
    let mut compiled_instructions = Vec::with_capacity(num_ix);
    for _ in 0..num_ix {
        let program_id_index = r.byte()?;
        let n_accounts = r.compact()?;
        let account_indices = r.take(n_accounts)?.to_vec();
        let data_len = r.compact()?;
        let data = r.take(data_len)?.to_vec();

        let out_of_range = std::iter::once(&program_id_index)
            .chain(&account_indices)
            .any(|&i| i as usize >= account_keys.len());
        if out_of_range {
            return Err(SolError::SerializationError(
                "instruction references unknown account".into(),
            ));
        }

        compiled_instructions.push(CompiledInstruction {
            program_id_index,
            account_indices,
            data,
        });
    }

    if r.pos != wire.len() {
        return Err(SolError::SerializationError(format!(
            "{} trailing bytes",
            wire.len() - r.pos
        )));
    }

    Ok(DecodedTransaction {
        signatures,
        message: SolTransaction {
            account_keys,
            num_required_signatures,
            num_readonly_signed,
            num_readonly_unsigned,
            recent_blockhash,
            compiled_instructions,
        },
        message_bytes: wire[message_start..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCKHASH: [u8; 32] = [0xABu8; 32];

    fn key(b: u8) -> Pubkey {
        Pubkey::new([b; 32])
    }

    // -- Compact-u16 ---------------------------------------------------------

    #[test]
    fn compact_u16_boundaries() {
        assert_eq!(encode_compact_u16(0), vec![0x00]);
        assert_eq!(encode_compact_u16(0x7f), vec![0x7f]);
        assert_eq!(encode_compact_u16(0x80), vec![0x80, 0x01]);
        assert_eq!(encode_compact_u16(0x3fff), vec![0xff, 0x7f]);
        assert_eq!(encode_compact_u16(0x4000), vec![0x80, 0x80, 0x01]);
        assert_eq!(encode_compact_u16(0xffff), vec![0xff, 0xff, 0x03]);
    }

    #[test]
    fn compact_u16_decodes_what_it_encodes() {
        for val in [0u16, 1, 0x7f, 0x80, 0x3fff, 0x4000, 0xffff] {
            let enc = encode_compact_u16(val);
            assert_eq!(decode_compact_u16(&enc).unwrap(), (val, enc.len()));
        }
    }

    #[test]
    fn compact_u16_rejects_truncated_input() {
        assert!(decode_compact_u16(&[]).is_err());
        assert!(decode_compact_u16(&[0x80]).is_err());
        assert!(decode_compact_u16(&[0xff, 0xff, 0xff]).is_err());
    }

    // -- CreateAccount -------------------------------------------------------

    #[test]
    fn create_account_layout() {
        let owner = key(9);
        let ix = build_create_account(&key(1), &key(2), 1_461_600, 82, &owner);

        assert_eq!(ix.program_id, SYSTEM_PROGRAM_ID);
        assert_eq!(ix.data.len(), 52);
        assert_eq!(&ix.data[0..4], &0u32.to_le_bytes());
        assert_eq!(&ix.data[4..12], &1_461_600u64.to_le_bytes());
        assert_eq!(&ix.data[12..20], &82u64.to_le_bytes());
        assert_eq!(&ix.data[20..52], owner.as_bytes());

        assert!(ix.accounts.iter().all(|m| m.is_signer && m.is_writable));
    }

    // -- Compilation ---------------------------------------------------------

    #[test]
    fn fee_payer_is_first_and_signers_lead() {
        let payer = key(1);
        let mint = key(2);
        let program = key(3);
        let ixs = vec![
            build_create_account(&payer, &mint, 10, 82, &program),
            SolInstruction {
                program_id: program,
                accounts: vec![
                    SolAccountMeta::writable(mint, false),
                    SolAccountMeta::readonly(key(4), false),
                ],
                data: vec![0],
            },
        ];

        let tx = compile_transaction(&ixs, &payer, &BLOCKHASH).unwrap();

        assert_eq!(tx.account_keys[0], payer);
        assert_eq!(tx.num_required_signatures, 2);
        assert_eq!(tx.signers(), &[payer, mint]);
        // system program, program, key(4) are read-only non-signers.
        assert_eq!(tx.num_readonly_unsigned, 3);
        assert_eq!(tx.num_readonly_signed, 0);
        assert_eq!(tx.base_fee(), 10_000);
    }

    #[test]
    fn fee_payer_stays_first_when_listed_later() {
        let payer = key(5);
        let other = key(1);
        let ix = build_create_account(&other, &key(2), 1, 0, &key(3));

        let tx = compile_transaction(&[ix], &payer, &BLOCKHASH).unwrap();
        assert_eq!(tx.account_keys[0], payer);
        assert_eq!(tx.num_required_signatures, 3);
    }

    #[test]
    fn compile_rejects_empty_instruction_list() {
        assert!(compile_transaction(&[], &key(1), &BLOCKHASH).is_err());
    }

    #[test]
    fn compiled_indices_point_at_account_keys() {
        let payer = key(1);
        let ix = build_create_account(&payer, &key(2), 5, 0, &key(3));
        let tx = compile_transaction(&[ix.clone()], &payer, &BLOCKHASH).unwrap();

        let compiled = &tx.compiled_instructions[0];
        assert_eq!(tx.account_keys[compiled.program_id_index as usize], ix.program_id);
        for (meta, idx) in ix.accounts.iter().zip(&compiled.account_indices) {
            assert_eq!(tx.account_keys[*idx as usize], meta.pubkey);
        }
    }

    #[test]
    fn message_header_and_blockhash_position() {
        let payer = key(1);
        let ix = build_create_account(&payer, &key(2), 5, 0, &key(3));
        let tx = compile_transaction(&[ix], &payer, &BLOCKHASH).unwrap();
        let bytes = serialize_message(&tx).unwrap();

        assert_eq!(bytes[0], tx.num_required_signatures);
        assert_eq!(bytes[1], tx.num_readonly_signed);
        assert_eq!(bytes[2], tx.num_readonly_unsigned);
        assert_eq!(bytes[3] as usize, tx.account_keys.len());

        let hash_start = 4 + 32 * tx.account_keys.len();
        assert_eq!(&bytes[hash_start..hash_start + 32], &BLOCKHASH);
    }

    // -- Partial signing -----------------------------------------------------

    fn two_signer_tx(payer: &Keypair, mint: &Keypair) -> PartiallySignedTransaction {
        let ix = build_create_account(&payer.pubkey(), &mint.pubkey(), 1, 82, &key(7));
        let tx = compile_transaction(&[ix], &payer.pubkey(), &BLOCKHASH).unwrap();
        PartiallySignedTransaction::new(tx).unwrap()
    }

    #[test]
    fn wire_requires_all_signatures() {
        let payer = Keypair::generate();
        let mint = Keypair::generate();
        let mut tx = two_signer_tx(&payer, &mint);

        tx.partial_sign(&mint).unwrap();
        assert!(!tx.is_fully_signed());
        assert_eq!(tx.missing_signers(), vec![payer.pubkey()]);
        assert!(tx.to_wire().is_err());
        assert!(tx.signature().is_none());

        let sig = payer.sign(tx.message_bytes());
        tx.add_signature(&payer.pubkey(), sig).unwrap();
        assert!(tx.is_fully_signed());

        let wire = tx.to_wire().unwrap();
        assert_eq!(wire[0], 2);
        assert_eq!(&wire[1..65], &sig);
        assert_eq!(&wire[129..], tx.message_bytes());
        assert_eq!(tx.signature().unwrap(), bs58::encode(sig).into_string());
    }

    #[test]
    fn add_signature_rejects_non_signer() {
        let payer = Keypair::generate();
        let mint = Keypair::generate();
        let stranger = Keypair::generate();
        let mut tx = two_signer_tx(&payer, &mint);

        let err = tx.partial_sign(&stranger).unwrap_err();
        assert!(err.to_string().contains("not a required signer"));
    }

    #[test]
    fn add_signature_rejects_bad_signature() {
        let payer = Keypair::generate();
        let mint = Keypair::generate();
        let mut tx = two_signer_tx(&payer, &mint);

        let forged = payer.sign(b"some other message");
        assert!(tx.add_signature(&payer.pubkey(), forged).is_err());
    }

    // -- Wire decoding -------------------------------------------------------

    #[test]
    fn decode_recovers_signed_transaction() {
        let payer = Keypair::generate();
        let mint = Keypair::generate();
        let mut tx = two_signer_tx(&payer, &mint);
        tx.partial_sign(&payer).unwrap();
        tx.partial_sign(&mint).unwrap();

        let decoded = decode_transaction(&tx.to_wire().unwrap()).unwrap();
        assert!(decoded.verify());
        assert_eq!(decoded.message.account_keys, tx.message().account_keys);
        assert_eq!(
            decoded.message.compiled_instructions,
            tx.message().compiled_instructions
        );
        assert_eq!(decoded.message_bytes, tx.message_bytes());
    }

    #[test]
    fn decode_rejects_truncated_and_trailing_bytes() {
        let payer = Keypair::generate();
        let mint = Keypair::generate();
        let mut tx = two_signer_tx(&payer, &mint);
        tx.partial_sign(&payer).unwrap();
        tx.partial_sign(&mint).unwrap();
        let wire = tx.to_wire().unwrap();

        assert!(decode_transaction(&wire[..wire.len() - 1]).is_err());
        let mut padded = wire.clone();
        padded.push(0);
        assert!(decode_transaction(&padded).is_err());
    }
}
