//! JSON-RPC 2.0 implementation of [`LedgerClient`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chain_sol::{Pubkey, TOKEN_PROGRAM_ID};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::EngineConfig;
use crate::network::{
    AccountData, ClientError, Commitment, InstructionError, LatestBlockhash, LedgerClient,
    RawInstruction, SignatureInfo, SignatureStatus, TokenAccountBalance, TokenBalanceRecord,
    TransactionDetail, TransactionError,
};

pub struct RpcClient {
    http: Client,
    url: String,
    commitment: Commitment,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Results wrapped in `{ context, value }`.
#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

impl RpcClient {
    pub fn new(
        url: impl Into<String>,
        commitment: Commitment,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
            commitment,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ClientError> {
        Self::new(
            config.rpc_endpoint(),
            config.commitment,
            config.request_timeout(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "rpc request");

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::Transport(format!("HTTP {status}: {text}")));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("{method}: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(rpc_error(error));
        }
        serde_json::from_value(parsed.result)
            .map_err(|e| ClientError::InvalidResponse(format!("{method}: {e}")))
    }

    fn commitment_config(&self) -> Value {
        json!({ "commitment": self.commitment.as_str() })
    }

    /// History methods do not accept `processed`.
    fn history_commitment(&self) -> &'static str {
        match self.commitment {
            Commitment::Processed => Commitment::Confirmed.as_str(),
            other => other.as_str(),
        }
    }
}

/// A node error carrying a transaction failure (preflight) becomes
/// [`ClientError::Transaction`].
fn rpc_error(error: RpcErrorObject) -> ClientError {
    if let Some(err) = error.data.as_ref().and_then(|d| d.get("err")) {
        if !err.is_null() {
            return ClientError::Transaction(parse_transaction_error(err));
        }
    }
    ClientError::Rpc {
        code: error.code,
        message: error.message,
    }
}

/// Decode the ledger's JSON transaction error.
///
/// Unit variants arrive as strings, the rest as single-key objects such as
/// `{"InstructionError": [1, {"Custom": 4}]}`.
pub fn parse_transaction_error(value: &Value) -> TransactionError {
    if let Some(name) = value.as_str() {
        return match name {
            "InsufficientFundsForFee" => TransactionError::InsufficientFundsForFee,
            "BlockhashNotFound" => TransactionError::BlockhashNotFound,
            "AccountNotFound" => TransactionError::AccountNotFound,
            other => TransactionError::Other(other.to_string()),
        };
    }

    if let Some([index, inner]) = value
        .get("InstructionError")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
    {
        let index = index.as_u64().and_then(|i| u8::try_from(i).ok()).unwrap_or(u8::MAX);
        let error = match inner.get("Custom").and_then(Value::as_u64) {
            Some(code) => InstructionError::Custom(code as u32),
            None => InstructionError::Other(match inner.as_str() {
                Some(s) => s.to_string(),
                None => inner.to_string(),
            }),
        };
        return TransactionError::InstructionError { index, error };
    }

    if let Some(account_index) = value
        .get("InsufficientFundsForRent")
        .and_then(|v| v.get("account_index"))
        .and_then(Value::as_u64)
    {
        return TransactionError::InsufficientFundsForRent {
            account_index: account_index as u8,
        };
    }

    TransactionError::Other(value.to_string())
}

fn optional_error(value: &Value) -> Option<TransactionError> {
    if value.is_null() {
        None
    } else {
        Some(parse_transaction_error(value))
    }
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockhashValue {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Deserialize)]
struct AccountValue {
    owner: Pubkey,
    lamports: u64,
    /// `[payload, encoding]`.
    data: (String, String),
}

#[derive(Deserialize)]
struct KeyedTokenAccount {
    pubkey: Pubkey,
    account: ParsedAccount,
}

#[derive(Deserialize)]
struct ParsedAccount {
    data: ParsedData,
}

#[derive(Deserialize)]
struct ParsedData {
    parsed: ParsedTokenAccount,
}

#[derive(Deserialize)]
struct ParsedTokenAccount {
    info: ParsedTokenInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedTokenInfo {
    mint: Pubkey,
    owner: Pubkey,
    token_amount: UiTokenAmount,
}

#[derive(Deserialize)]
struct UiTokenAmount {
    amount: String,
    decimals: u8,
}

impl UiTokenAmount {
    fn raw(&self) -> Result<u64, ClientError> {
        self.amount
            .parse()
            .map_err(|_| ClientError::InvalidResponse(format!("token amount {:?}", self.amount)))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusValue {
    confirmation_status: Option<Commitment>,
    #[serde(default)]
    err: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureValue {
    signature: String,
    slot: u64,
    block_time: Option<i64>,
    #[serde(default)]
    err: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionValue {
    slot: u64,
    block_time: Option<i64>,
    meta: Option<MetaValue>,
    transaction: EncodedTransaction,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaValue {
    fee: u64,
    #[serde(default)]
    err: Value,
    #[serde(default)]
    pre_token_balances: Vec<TokenBalanceValue>,
    #[serde(default)]
    post_token_balances: Vec<TokenBalanceValue>,
    #[serde(default)]
    loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Deserialize, Default)]
struct LoadedAddresses {
    #[serde(default)]
    writable: Vec<Pubkey>,
    #[serde(default)]
    readonly: Vec<Pubkey>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalanceValue {
    account_index: usize,
    mint: Pubkey,
    owner: Option<Pubkey>,
    ui_token_amount: UiTokenAmount,
}

#[derive(Deserialize)]
struct EncodedTransaction {
    message: EncodedMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedMessage {
    account_keys: Vec<Pubkey>,
    instructions: Vec<EncodedInstruction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedInstruction {
    program_id_index: usize,
    accounts: Vec<usize>,
    /// Base58.
    data: String,
}

fn token_balances(values: Vec<TokenBalanceValue>) -> Result<Vec<TokenBalanceRecord>, ClientError> {
    values
        .into_iter()
        .map(|b| {
            Ok(TokenBalanceRecord {
                account_index: b.account_index,
                mint: b.mint,
                owner: b.owner,
                amount: b.ui_token_amount.raw()?,
                decimals: b.ui_token_amount.decimals,
            })
        })
        .collect()
}

/// Convert a `getTransaction` result (`json` encoding) into a detail.
/// `null` means the ledger does not know the signature.
pub fn parse_transaction_detail(
    signature: &str,
    value: Value,
) -> Result<Option<TransactionDetail>, ClientError> {
    if value.is_null() {
        return Ok(None);
    }
    let tx: TransactionValue = serde_json::from_value(value)
        .map_err(|e| ClientError::InvalidResponse(format!("getTransaction: {e}")))?;
    let meta = tx
        .meta
        .ok_or_else(|| ClientError::InvalidResponse("getTransaction: missing meta".into()))?;

    // Versioned transactions index into static keys followed by loaded ones.
    let mut account_keys = tx.transaction.message.account_keys;
    if let Some(loaded) = meta.loaded_addresses {
        account_keys.extend(loaded.writable);
        account_keys.extend(loaded.readonly);
    }

    let key_at = |index: usize| {
        account_keys.get(index).copied().ok_or_else(|| {
            ClientError::InvalidResponse(format!("account index {index} out of range"))
        })
    };

    let instructions = tx
        .transaction
        .message
        .instructions
        .iter()
        .map(|ix| {
            Ok(RawInstruction {
                program_id: key_at(ix.program_id_index)?,
                accounts: ix.accounts.iter().map(|i| key_at(*i)).collect::<Result<_, _>>()?,
                data: bs58::decode(&ix.data)
                    .into_vec()
                    .map_err(|e| ClientError::InvalidResponse(format!("instruction data: {e}")))?,
            })
        })
        .collect::<Result<Vec<_>, ClientError>>()?;

    Ok(Some(TransactionDetail {
        signature: signature.to_string(),
        slot: tx.slot,
        block_time: tx.block_time,
        fee: meta.fee,
        err: optional_error(&meta.err),
        account_keys,
        instructions,
        pre_token_balances: token_balances(meta.pre_token_balances)?,
        post_token_balances: token_balances(meta.post_token_balances)?,
    }))
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn get_latest_blockhash(&self) -> Result<LatestBlockhash, ClientError> {
        let result: WithContext<BlockhashValue> = self
            .call("getLatestBlockhash", json!([self.commitment_config()]))
            .await?;
        let bytes = bs58::decode(&result.value.blockhash)
            .into_vec()
            .map_err(|e| ClientError::InvalidResponse(format!("blockhash: {e}")))?;
        let blockhash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ClientError::InvalidResponse("blockhash is not 32 bytes".into()))?;
        Ok(LatestBlockhash {
            blockhash,
            last_valid_block_height: result.value.last_valid_block_height,
        })
    }

    async fn get_block_height(&self) -> Result<u64, ClientError> {
        self.call("getBlockHeight", json!([self.commitment_config()]))
            .await
    }

    async fn get_minimum_balance_for_rent_exemption(
        &self,
        size: usize,
    ) -> Result<u64, ClientError> {
        self.call("getMinimumBalanceForRentExemption", json!([size]))
            .await
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, ClientError> {
        let result: WithContext<u64> = self
            .call(
                "getBalance",
                json!([address.to_string(), self.commitment_config()]),
            )
            .await?;
        Ok(result.value)
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountData>, ClientError> {
        let result: WithContext<Option<AccountValue>> = self
            .call(
                "getAccountInfo",
                json!([
                    address.to_string(),
                    { "encoding": "base64", "commitment": self.commitment.as_str() }
                ]),
            )
            .await?;

        result
            .value
            .map(|account| {
                let data = STANDARD
                    .decode(&account.data.0)
                    .map_err(|e| ClientError::InvalidResponse(format!("account data: {e}")))?;
                Ok(AccountData {
                    owner: account.owner,
                    lamports: account.lamports,
                    data,
                })
            })
            .transpose()
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<TokenAccountBalance>, ClientError> {
        let result: WithContext<Vec<KeyedTokenAccount>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner.to_string(),
                    { "programId": TOKEN_PROGRAM_ID.to_string() },
                    { "encoding": "jsonParsed", "commitment": self.commitment.as_str() }
                ]),
            )
            .await?;

        result
            .value
            .into_iter()
            .map(|keyed| {
                let info = keyed.account.data.parsed.info;
                Ok(TokenAccountBalance {
                    address: keyed.pubkey,
                    mint: info.mint,
                    owner: info.owner,
                    amount: info.token_amount.raw()?,
                    decimals: info.token_amount.decimals,
                })
            })
            .collect()
    }

    async fn send_transaction(&self, wire: &[u8]) -> Result<String, ClientError> {
        self.call(
            "sendTransaction",
            json!([
                STANDARD.encode(wire),
                { "encoding": "base64", "preflightCommitment": self.commitment.as_str() }
            ]),
        )
        .await
    }

    async fn get_signature_status(
        &self,
        signature: &str,
    ) -> Result<Option<SignatureStatus>, ClientError> {
        let result: WithContext<Vec<Option<StatusValue>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;

        Ok(result.value.into_iter().next().flatten().map(|status| SignatureStatus {
            confirmation: status.confirmation_status,
            err: optional_error(&status.err),
        }))
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<SignatureInfo>, ClientError> {
        let mut config = json!({ "limit": limit, "commitment": self.history_commitment() });
        if let Some(before) = before {
            config["before"] = json!(before);
        }
        let result: Vec<SignatureValue> = self
            .call(
                "getSignaturesForAddress",
                json!([address.to_string(), config]),
            )
            .await?;

        Ok(result
            .into_iter()
            .map(|s| SignatureInfo {
                err: optional_error(&s.err),
                signature: s.signature,
                slot: s.slot,
                block_time: s.block_time,
            })
            .collect())
    }

    async fn get_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<TransactionDetail>, ClientError> {
        let result: Value = self
            .call(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "json",
                        "maxSupportedTransactionVersion": 0,
                        "commitment": self.history_commitment(),
                    }
                ]),
            )
            .await?;
        parse_transaction_detail(signature, result)
    }
}
