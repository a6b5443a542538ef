//! Bridge contract client
//!
//! Signs CosmWasm execute messages with cosmrs and talks to the chain through
//! the LCD REST API: smart queries, `simulate` for gas estimation and
//! `BROADCAST_MODE_SYNC` broadcasts. The account sequence is cached between
//! transactions and refreshed after a sequence mismatch.

use std::time::Duration;

use async_trait::async_trait;
use bip39::Mnemonic;
use cosmrs::{
    bip32::DerivationPath,
    crypto::secp256k1::SigningKey,
    tx::{self, Fee, Msg, SignDoc, SignerInfo},
    AccountId, Coin as CosmosCoin,
};
use cosmwasm_std::{Coin, Uint128};
use eyre::{eyre, Result, WrapErr};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ContractConfig;
use crate::contracts::{
    AvailableTicketsResponse, BridgeState, BridgeStateResponse, Config, Evidence, ExecuteMsg,
    FeesCollectedResponse, Operation, PendingOperationsResponse, QueryMsg, Relayer,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for `pending_operations`
pub const PENDING_OPERATIONS_PAGE: u32 = 50;

/// Broadcast attempts when the cached sequence turns out stale
const MAX_SEQUENCE_RETRIES: u32 = 3;

/// SDK error code for an account sequence mismatch
const CODE_SEQUENCE_MISMATCH: u32 = 32;

/// Typed failures of contract executions that callers branch on
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The chain or contract refused the message; resending it cannot succeed
    #[error("transaction rejected (code {code}): {log}")]
    Rejected { code: u32, log: String },

    #[error("account sequence mismatch: {0}")]
    SequenceMismatch(String),
}

/// Whether an error chain ends in a business rejection from the contract
pub fn is_rejection(error: &eyre::Report) -> bool {
    matches!(
        error.downcast_ref::<ExecuteError>(),
        Some(ExecuteError::Rejected { .. })
    )
}

/// Everything the relayer reads from or sends to the bridge contract
#[async_trait]
pub trait BridgeContract: Send + Sync {
    /// Contract-chain address of this relayer
    fn relayer_address(&self) -> &str;

    async fn config(&self) -> Result<Config>;

    /// One page of pending operations
    async fn pending_operations(
        &self,
        start_after_key: Option<u64>,
        limit: Option<u32>,
    ) -> Result<PendingOperationsResponse>;

    async fn available_tickets(&self) -> Result<Vec<u32>>;

    async fn fees_collected(&self, relayer_address: &str) -> Result<Vec<Coin>>;

    async fn bridge_state(&self) -> Result<BridgeState>;

    async fn save_signature(
        &self,
        operation_id: u32,
        operation_version: u64,
        signature: &str,
    ) -> Result<String>;

    async fn save_evidence(&self, evidence: &Evidence) -> Result<String>;

    async fn claim_relayer_fees(&self, amounts: Vec<Coin>) -> Result<String>;

    async fn recover_tickets(
        &self,
        account_sequence: u32,
        number_of_tickets: Option<u32>,
    ) -> Result<String>;

    async fn halt_bridge(&self) -> Result<String>;

    async fn resume_bridge(&self) -> Result<String>;

    async fn update_xrpl_base_fee(&self, xrpl_base_fee: u64) -> Result<String>;

    /// Every pending operation, following `last_key` paging
    async fn all_pending_operations(&self) -> Result<Vec<Operation>> {
        let mut operations = Vec::new();
        let mut start_after_key = None;

        loop {
            let page = self
                .pending_operations(start_after_key, Some(PENDING_OPERATIONS_PAGE))
                .await?;
            let fetched = page.operations.len();
            operations.extend(page.operations);

            match page.last_key {
                Some(key) if fetched > 0 && Some(key) != start_after_key => {
                    start_after_key = Some(key)
                }
                _ => break,
            }
            if fetched < PENDING_OPERATIONS_PAGE as usize {
                break;
            }
        }

        Ok(operations)
    }
}

/// Account number and sequence from the LCD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountInfo {
    pub account_number: u64,
    pub sequence: u64,
}

/// LCD client signing as the relayer account
pub struct ContractClient {
    lcd_url: String,
    chain_id: String,
    contract_address: String,
    signing_key: SigningKey,
    /// Relayer account address
    pub address: AccountId,
    address_string: String,
    gas_price: f64,
    fee_denom: String,
    gas_adjustment: f64,
    client: Client,
    /// Cached account state, cleared on sequence mismatch
    account: Mutex<Option<AccountInfo>>,
}

impl ContractClient {
    pub fn new(config: &ContractConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("Failed to create HTTP client")?;

        let mnemonic =
            Mnemonic::parse(&config.mnemonic).map_err(|e| eyre!("Invalid mnemonic: {}", e))?;
        let seed = mnemonic.to_seed("");
        let path: DerivationPath = config
            .hd_path
            .parse()
            .map_err(|e| eyre!("Invalid derivation path {}: {:?}", config.hd_path, e))?;

        let signing_key = SigningKey::derive_from_path(seed, &path)
            .map_err(|e| eyre!("Failed to derive signing key: {}", e))?;
        let address = signing_key
            .public_key()
            .account_id(&config.address_prefix)
            .map_err(|e| eyre!("Failed to get account ID: {}", e))?;

        info!(
            address = %address,
            chain_id = %config.chain_id,
            contract = %config.contract_address,
            "Contract client initialized"
        );

        Ok(Self {
            lcd_url: config.lcd_url.trim_end_matches('/').to_string(),
            chain_id: config.chain_id.clone(),
            contract_address: config.contract_address.clone(),
            signing_key,
            address_string: address.to_string(),
            address,
            gas_price: config.gas_price,
            fee_denom: config.fee_denom.clone(),
            gas_adjustment: config.gas_adjustment,
            client,
            account: Mutex::new(None),
        })
    }

    /// Query account number and sequence
    pub async fn get_account_info(&self) -> Result<AccountInfo> {
        let url = format!(
            "{}/cosmos/auth/v1beta1/accounts/{}",
            self.lcd_url, self.address
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err("Failed to query account info")?;

        if !response.status().is_success() {
            return Err(eyre!(
                "Account query failed: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let data: Value = response.json().await?;
        let account = data
            .get("account")
            .ok_or_else(|| eyre!("Missing 'account' field in response"))?;

        Ok(AccountInfo {
            sequence: account_field(account, "sequence"),
            account_number: account_field(account, "account_number"),
        })
    }

    /// Query the bridge contract
    pub async fn query<T: DeserializeOwned>(&self, query_msg: &QueryMsg) -> Result<T> {
        let query_json = serde_json::to_string(query_msg)?;
        let query_b64 =
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, query_json);

        let url = format!(
            "{}/cosmwasm/wasm/v1/contract/{}/smart/{}",
            self.lcd_url, self.contract_address, query_b64
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err("Failed to query contract")?;

        if !response.status().is_success() {
            return Err(eyre!(
                "Query failed: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let data: Value = response.json().await?;
        let query_data = data
            .get("data")
            .ok_or_else(|| eyre!("Missing 'data' field in response"))?;

        serde_json::from_value(query_data.clone())
            .map_err(|e| eyre!("Failed to parse query response: {}", e))
    }

    /// Sign and broadcast an execute message, refreshing the sequence on mismatch
    pub async fn execute(&self, msg: &ExecuteMsg, funds: &[Coin]) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..MAX_SEQUENCE_RETRIES {
            match self.execute_once(msg, funds).await {
                Ok(txhash) => return Ok(txhash),
                Err(e)
                    if matches!(
                        e.downcast_ref::<ExecuteError>(),
                        Some(ExecuteError::SequenceMismatch(_))
                    ) =>
                {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = MAX_SEQUENCE_RETRIES,
                        error = %e,
                        "Sequence mismatch detected, refreshing account info and retrying"
                    );
                    *self.account.lock().await = None;
                    tokio::time::sleep(Duration::from_millis(500 * (1 << attempt))).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            eyre!("execute failed after {} retries", MAX_SEQUENCE_RETRIES)
        }))
    }

    async fn execute_once(&self, msg: &ExecuteMsg, funds: &[Coin]) -> Result<String> {
        // held across simulate and broadcast so concurrent executes cannot reuse a sequence
        let mut cached = self.account.lock().await;
        let account = match *cached {
            Some(account) => account,
            None => self.get_account_info().await?,
        };

        let body = self.build_body(msg, funds)?;

        let simulation_tx = self.sign(&body, account, 0, 0)?;
        let gas_used = self.simulate(&simulation_tx).await?;
        let gas_limit = ((gas_used as f64) * self.gas_adjustment).ceil() as u64;
        let fee_amount = ((gas_limit as f64) * self.gas_price).ceil() as u128;

        debug!(
            sequence = account.sequence,
            gas_used,
            gas_limit,
            fee_amount,
            "Signing contract execution"
        );

        let tx_bytes = self.sign(&body, account, gas_limit, fee_amount)?;
        let txhash = self.broadcast(&tx_bytes).await?;

        *cached = Some(AccountInfo {
            sequence: account.sequence + 1,
            ..account
        });
        Ok(txhash)
    }

    fn build_body(&self, msg: &ExecuteMsg, funds: &[Coin]) -> Result<tx::Body> {
        let coins = funds
            .iter()
            .map(|coin| {
                Ok(CosmosCoin {
                    denom: coin
                        .denom
                        .parse()
                        .map_err(|e| eyre!("Invalid denom {}: {}", coin.denom, e))?,
                    amount: coin.amount.u128(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let execute_msg = cosmrs::cosmwasm::MsgExecuteContract {
            sender: self.address.clone(),
            contract: self
                .contract_address
                .parse()
                .map_err(|e| eyre!("Invalid contract address: {:?}", e))?,
            msg: encode_execute_msg(msg)?,
            funds: coins,
        };

        Ok(tx::Body::new(
            vec![execute_msg
                .to_any()
                .map_err(|e| eyre!("Failed to convert message: {}", e))?],
            "",
            0u32,
        ))
    }

    fn sign(
        &self,
        body: &tx::Body,
        account: AccountInfo,
        gas_limit: u64,
        fee_amount: u128,
    ) -> Result<Vec<u8>> {
        let signer_info =
            SignerInfo::single_direct(Some(self.signing_key.public_key()), account.sequence);
        let fee = Fee::from_amount_and_gas(
            CosmosCoin {
                denom: self
                    .fee_denom
                    .parse()
                    .map_err(|e| eyre!("Invalid fee denom {}: {}", self.fee_denom, e))?,
                amount: fee_amount,
            },
            gas_limit,
        );
        let auth_info = signer_info.auth_info(fee);

        let chain_id = self
            .chain_id
            .parse()
            .map_err(|_| eyre!("Invalid chain ID {}", self.chain_id))?;
        let sign_doc = SignDoc::new(body, &auth_info, &chain_id, account.account_number)
            .map_err(|e| eyre!("Failed to create sign doc: {}", e))?;

        sign_doc
            .sign(&self.signing_key)
            .map_err(|e| eyre!("Failed to sign transaction: {}", e))?
            .to_bytes()
            .map_err(|e| eyre!("Failed to serialize transaction: {}", e))
    }

    /// Gas used by a dry run; contract errors surface here as rejections
    async fn simulate(&self, tx_bytes: &[u8]) -> Result<u64> {
        let url = format!("{}/cosmos/tx/v1beta1/simulate", self.lcd_url);
        let tx_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, tx_bytes);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "tx_bytes": tx_b64 }))
            .send()
            .await
            .wrap_err("Failed to simulate transaction")?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .wrap_err("Failed to decode simulate response")?;

        if !status.is_success() {
            let code = body.get("code").and_then(Value::as_u64).unwrap_or(0) as u32;
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            if status.is_server_error() || code == 0 {
                return Err(eyre!("Simulation failed: {} - {}", status, message));
            }
            return Err(chain_error(code, message).into());
        }

        body.get("gas_info")
            .and_then(|g| g.get("gas_used"))
            .and_then(|v| match v {
                Value::String(s) => s.parse().ok(),
                other => other.as_u64(),
            })
            .ok_or_else(|| eyre!("Missing gas_info.gas_used in simulate response"))
    }

    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<String> {
        let url = format!("{}/cosmos/tx/v1beta1/txs", self.lcd_url);
        let tx_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, tx_bytes);

        debug!(url = %url, "Broadcasting transaction");
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "tx_bytes": tx_b64,
                "mode": "BROADCAST_MODE_SYNC"
            }))
            .send()
            .await
            .wrap_err("Failed to broadcast transaction")?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .wrap_err("Failed to decode broadcast response")?;

        let tx_response = body
            .get("tx_response")
            .ok_or_else(|| eyre!("Broadcast failed ({}): {}", status, body))?;

        let code = tx_response.get("code").and_then(Value::as_u64).unwrap_or(0) as u32;
        if code != 0 {
            let raw_log = tx_response
                .get("raw_log")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string();
            return Err(chain_error(code, raw_log).into());
        }

        let txhash = tx_response
            .get("txhash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        info!(txhash = %txhash, "Transaction broadcast successful");
        Ok(txhash)
    }

    async fn execute_msg(&self, msg: ExecuteMsg) -> Result<String> {
        self.execute(&msg, &[]).await
    }
}

fn chain_error(code: u32, log: String) -> ExecuteError {
    if code == CODE_SEQUENCE_MISMATCH
        || log.contains("account sequence mismatch")
        || log.contains("incorrect account sequence")
    {
        ExecuteError::SequenceMismatch(log)
    } else {
        ExecuteError::Rejected { code, log }
    }
}

/// Numeric account field, also looking inside `base_account` (vesting accounts)
fn account_field(account: &Value, field: &str) -> u64 {
    account
        .get(field)
        .or_else(|| account.get("base_account").and_then(|b| b.get(field)))
        .and_then(|v| match v {
            Value::String(s) => s.parse().ok(),
            other => other.as_u64(),
        })
        .unwrap_or(0)
}

#[async_trait]
impl BridgeContract for ContractClient {
    fn relayer_address(&self) -> &str {
        &self.address_string
    }

    async fn config(&self) -> Result<Config> {
        self.query(&QueryMsg::Config {}).await
    }

    async fn pending_operations(
        &self,
        start_after_key: Option<u64>,
        limit: Option<u32>,
    ) -> Result<PendingOperationsResponse> {
        self.query(&QueryMsg::PendingOperations {
            start_after_key,
            limit,
        })
        .await
    }

    async fn available_tickets(&self) -> Result<Vec<u32>> {
        let response: AvailableTicketsResponse =
            self.query(&QueryMsg::AvailableTickets {}).await?;
        Ok(response.tickets)
    }

    async fn fees_collected(&self, relayer_address: &str) -> Result<Vec<Coin>> {
        let response: FeesCollectedResponse = self
            .query(&QueryMsg::FeesCollected {
                relayer_address: relayer_address.to_string(),
            })
            .await?;
        Ok(response.fees_collected)
    }

    async fn bridge_state(&self) -> Result<BridgeState> {
        let response: BridgeStateResponse = self.query(&QueryMsg::BridgeState {}).await?;
        Ok(response.state)
    }

    async fn save_signature(
        &self,
        operation_id: u32,
        operation_version: u64,
        signature: &str,
    ) -> Result<String> {
        self.execute_msg(ExecuteMsg::SaveSignature {
            operation_id,
            operation_version,
            signature: signature.to_string(),
        })
        .await
    }

    async fn save_evidence(&self, evidence: &Evidence) -> Result<String> {
        self.execute_msg(ExecuteMsg::SaveEvidence {
            evidence: evidence.clone(),
        })
        .await
    }

    async fn claim_relayer_fees(&self, amounts: Vec<Coin>) -> Result<String> {
        self.execute_msg(ExecuteMsg::ClaimRelayerFees { amounts }).await
    }

    async fn recover_tickets(
        &self,
        account_sequence: u32,
        number_of_tickets: Option<u32>,
    ) -> Result<String> {
        self.execute_msg(ExecuteMsg::RecoverTickets {
            account_sequence,
            number_of_tickets,
        })
        .await
    }

    async fn halt_bridge(&self) -> Result<String> {
        self.execute_msg(ExecuteMsg::HaltBridge {}).await
    }

    async fn resume_bridge(&self) -> Result<String> {
        self.execute_msg(ExecuteMsg::ResumeBridge {}).await
    }

    async fn update_xrpl_base_fee(&self, xrpl_base_fee: u64) -> Result<String> {
        self.execute_msg(ExecuteMsg::UpdateXrplBaseFee { xrpl_base_fee })
            .await
    }
}

/// Owner actions without a place in the relay loop
impl ContractClient {
    pub async fn register_xrpl_token(
        &self,
        issuer: &str,
        currency: &str,
        sending_precision: i32,
        max_holding_amount: Uint128,
        bridging_fee: Uint128,
    ) -> Result<String> {
        self.execute_msg(ExecuteMsg::RegisterXrplToken {
            issuer: issuer.to_string(),
            currency: currency.to_string(),
            sending_precision,
            max_holding_amount,
            bridging_fee,
        })
        .await
    }

    pub async fn rotate_keys(
        &self,
        new_relayers: Vec<Relayer>,
        new_evidence_threshold: u32,
    ) -> Result<String> {
        self.execute_msg(ExecuteMsg::RotateKeys {
            new_relayers,
            new_evidence_threshold,
        })
        .await
    }
}

/// Serialize a message the way it is embedded in `MsgExecuteContract`
pub fn encode_execute_msg(msg: &impl Serialize) -> Result<Vec<u8>> {
    serde_json::to_vec(msg).wrap_err("Failed to encode execute message")
}
