//! XRPL JSON-RPC client
//!
//! Only the handful of methods the relayer needs are wrapped. Responses are
//! decoded into typed structs; anything the relayer does not inspect is
//! left out.

use std::time::Duration;

use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::memo::MemoWrapper;
use super::transaction::{Amount, Signer, SignerEntry};
use crate::serde_utils::deserialize_string_or_u64;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Ledger entry type name of ticket objects in transaction metadata
pub const TICKET_LEDGER_ENTRY: &str = "Ticket";

/// Operations the relayer performs against an XRPL node
#[async_trait]
pub trait XrplApi: Send + Sync {
    async fn account_info(&self, account: &str) -> Result<AccountInfo>;

    /// All `signer_list` objects owned by the account
    async fn signer_lists(&self, account: &str) -> Result<Vec<SignerList>>;

    async fn account_tx(
        &self,
        account: &str,
        ledger_index_min: i64,
        ledger_index_max: i64,
        marker: Option<Value>,
    ) -> Result<AccountTxPage>;

    async fn submit(&self, tx_blob: &str) -> Result<SubmitResult>;

    async fn server_state(&self) -> Result<ServerState>;

    /// Drop pooled connections so the next request starts fresh
    async fn reconnect(&self) -> Result<()>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    #[serde(rename = "Account")]
    pub account: String,
    #[serde(rename = "Sequence")]
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignerEntryWrapper {
    #[serde(rename = "SignerEntry")]
    pub signer_entry: SignerEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignerList {
    pub signer_quorum: u32,
    #[serde(default)]
    pub signer_entries: Vec<SignerEntryWrapper>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerWrapper {
    #[serde(rename = "Signer")]
    pub signer: Signer,
}

/// Common fields of a transaction as returned by `account_tx` (API v2 `tx_json`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TxJson {
    pub account: String,
    pub transaction_type: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub sequence: u32,
    #[serde(default)]
    pub ticket_sequence: Option<u32>,
    #[serde(default)]
    pub signers: Vec<SignerWrapper>,
    #[serde(default)]
    pub memos: Vec<MemoWrapper>,
}

impl TxJson {
    /// Ticket used by the transaction, if any
    pub fn ticket(&self) -> Option<u32> {
        self.ticket_sequence.filter(|t| *t != 0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedNode {
    #[serde(rename = "LedgerEntryType")]
    pub ledger_entry_type: String,
    #[serde(rename = "NewFields", default)]
    pub new_fields: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub enum AffectedNode {
    CreatedNode(CreatedNode),
    ModifiedNode(Value),
    DeletedNode(Value),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionMeta {
    #[serde(rename = "TransactionResult")]
    pub transaction_result: String,
    #[serde(rename = "AffectedNodes", default)]
    pub affected_nodes: Vec<AffectedNode>,
    #[serde(default, alias = "DeliveredAmount")]
    pub delivered_amount: Option<Amount>,
}

impl TransactionMeta {
    /// Ticket sequences of the tickets this transaction created
    pub fn created_tickets(&self) -> Vec<u32> {
        self.affected_nodes
            .iter()
            .filter_map(|node| match node {
                AffectedNode::CreatedNode(created)
                    if created.ledger_entry_type == TICKET_LEDGER_ENTRY =>
                {
                    created
                        .new_fields
                        .get("TicketSequence")
                        .and_then(Value::as_u64)
                        .and_then(|t| u32::try_from(t).ok())
                }
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountTxEntry {
    #[serde(default)]
    pub hash: String,
    #[serde(default, deserialize_with = "deserialize_string_or_u64")]
    pub ledger_index: u64,
    pub tx_json: TxJson,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
    #[serde(default)]
    pub validated: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountTxPage {
    #[serde(default)]
    pub transactions: Vec<AccountTxEntry>,
    #[serde(default)]
    pub marker: Option<Value>,
    #[serde(default)]
    pub validated: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitResult {
    pub engine_result: String,
    #[serde(default)]
    pub engine_result_message: String,
    #[serde(default)]
    pub accepted: Option<bool>,
    #[serde(default)]
    pub tx_json: Value,
}

/// Fee inputs of `server_state` (all in drops or fee levels)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerState {
    pub base_fee: u64,
    pub load_factor: u64,
    pub load_base: u64,
}

#[derive(Debug, Deserialize)]
struct ServerStateResult {
    state: ServerStateInner,
}

#[derive(Debug, Deserialize)]
struct ServerStateInner {
    #[serde(default)]
    load_base: u64,
    #[serde(default)]
    load_factor: u64,
    validated_ledger: Option<ValidatedLedger>,
}

#[derive(Debug, Deserialize)]
struct ValidatedLedger {
    base_fee: u64,
}

#[derive(Debug, Deserialize)]
struct AccountInfoResult {
    account_data: AccountInfo,
}

#[derive(Debug, Deserialize)]
struct AccountObjectsResult {
    #[serde(default)]
    account_objects: Vec<SignerList>,
}

/// JSON-RPC client for rippled / clio
pub struct XrplRpcClient {
    url: String,
    client: RwLock<Client>,
}

impl XrplRpcClient {
    pub fn new(url: &str) -> Result<Self> {
        info!(url = %url, "XRPL RPC client initialized");
        Ok(Self {
            url: url.to_string(),
            client: RwLock::new(build_http_client()?),
        })
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let client = self.client.read().await.clone();
        let body = json!({ "method": method, "params": [params] });

        debug!(method = method, "XRPL request");
        let response = client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .wrap_err_with(|| format!("XRPL {} request failed", method))?;

        if !response.status().is_success() {
            return Err(eyre!(
                "XRPL {} request failed: {} - {}",
                method,
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let envelope: Value = response
            .json()
            .await
            .wrap_err_with(|| format!("Failed to decode XRPL {} response", method))?;
        let result = envelope
            .get("result")
            .cloned()
            .ok_or_else(|| eyre!("Missing 'result' in XRPL {} response", method))?;
        check_rpc_error(method, &result)?;

        serde_json::from_value(result)
            .wrap_err_with(|| format!("Unexpected XRPL {} response shape", method))
    }
}

fn build_http_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .wrap_err("Failed to create HTTP client")
}

fn check_rpc_error(method: &str, result: &Value) -> Result<()> {
    if result.get("status").and_then(Value::as_str) == Some("error") {
        let error = result
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let message = result
            .get("error_message")
            .and_then(Value::as_str)
            .unwrap_or("");
        return Err(eyre!("XRPL {} error: {} {}", method, error, message));
    }
    Ok(())
}

#[async_trait]
impl XrplApi for XrplRpcClient {
    async fn account_info(&self, account: &str) -> Result<AccountInfo> {
        let result: AccountInfoResult = self
            .request(
                "account_info",
                json!({ "account": account, "ledger_index": "current" }),
            )
            .await?;
        Ok(result.account_data)
    }

    async fn signer_lists(&self, account: &str) -> Result<Vec<SignerList>> {
        let result: AccountObjectsResult = self
            .request(
                "account_objects",
                json!({
                    "account": account,
                    "type": "signer_list",
                    "ledger_index": "validated",
                }),
            )
            .await?;
        Ok(result.account_objects)
    }

    async fn account_tx(
        &self,
        account: &str,
        ledger_index_min: i64,
        ledger_index_max: i64,
        marker: Option<Value>,
    ) -> Result<AccountTxPage> {
        let mut params = json!({
            "account": account,
            "ledger_index_min": ledger_index_min,
            "ledger_index_max": ledger_index_max,
            "api_version": 2,
        });
        if let Some(marker) = marker {
            params["marker"] = marker;
        }
        self.request("account_tx", params).await
    }

    async fn submit(&self, tx_blob: &str) -> Result<SubmitResult> {
        self.request("submit", json!({ "tx_blob": tx_blob })).await
    }

    async fn server_state(&self) -> Result<ServerState> {
        let result: ServerStateResult = self.request("server_state", json!({})).await?;
        let base_fee = result
            .state
            .validated_ledger
            .map(|ledger| ledger.base_fee)
            .ok_or_else(|| eyre!("server_state has no validated ledger"))?;
        Ok(ServerState {
            base_fee,
            load_factor: result.state.load_factor,
            load_base: result.state.load_base,
        })
    }

    async fn reconnect(&self) -> Result<()> {
        let fresh = build_http_client()?;
        *self.client.write().await = fresh;
        info!(url = %self.url, "XRPL client reconnected");
        Ok(())
    }
}
