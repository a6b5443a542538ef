//! Bridge contract message definitions
//!
//! Execute and query messages of the cw-xrpl bridge contract, plus the
//! response types the relayer reads. Messages serialize to the contract's
//! externally tagged snake_case JSON.

use cosmwasm_std::{Coin, Uint128};
use serde::{Deserialize, Serialize};

use crate::serde_utils::deserialize_string_or_number;

// ============================================================================
// Shared types
// ============================================================================

/// A relayer as registered in the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relayer {
    /// Contract-chain account of the relayer
    pub cosmos_address: String,
    /// XRPL classic address of the relayer's signing key
    pub xrpl_address: String,
    /// Compressed secp256k1 public key, hex
    pub xrpl_pub_key: String,
}

/// A multisignature contributed by a relayer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub relayer_cosmos_address: String,
    /// DER signature, hex
    pub signature: String,
}

/// Pending operation the relayers have to execute on XRPL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub id: String,
    pub version: u64,
    pub operation_type: OperationType,
    #[serde(default)]
    pub account_sequence: Option<u32>,
    #[serde(default)]
    pub ticket_sequence: Option<u32>,
    pub xrpl_base_fee: u64,
    #[serde(default)]
    pub signatures: Vec<Signature>,
}

impl Operation {
    /// Ticket the operation consumes, zero meaning none
    pub fn ticket(&self) -> Option<u32> {
        self.ticket_sequence.filter(|t| *t != 0)
    }

    /// Account sequence the operation consumes, zero meaning none
    pub fn sequence(&self) -> Option<u32> {
        self.account_sequence.filter(|s| *s != 0)
    }

    /// Key under which signatures for this operation are stored
    pub fn signing_key(&self) -> u32 {
        self.ticket().or(self.sequence()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    AllocateTickets {
        number: u32,
    },
    TrustSet {
        issuer: String,
        currency: String,
        trust_set_limit_amount: Uint128,
    },
    RotateKeys {
        new_relayers: Vec<Relayer>,
        new_evidence_threshold: u32,
    },
    CosmosToXrplTransfer {
        issuer: String,
        currency: String,
        amount: Uint128,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_amount: Option<Uint128>,
        sender: String,
        recipient: String,
    },
}

impl OperationType {
    pub fn name(&self) -> &'static str {
        match self {
            OperationType::AllocateTickets { .. } => "allocate_tickets",
            OperationType::TrustSet { .. } => "trust_set",
            OperationType::RotateKeys { .. } => "rotate_keys",
            OperationType::CosmosToXrplTransfer { .. } => "cosmos_to_xrpl_transfer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionResult {
    Accepted,
    Rejected,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    TicketsAllocation {
        #[serde(default)]
        tickets: Option<Vec<u32>>,
    },
}

/// A relayer's claim about an XRPL fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    XrplToCosmosTransfer {
        tx_hash: String,
        issuer: String,
        currency: String,
        /// Plain decimal string
        amount: String,
        recipient: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
    },
    XrplTransactionResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tx_hash: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account_sequence: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ticket_sequence: Option<u32>,
        transaction_result: TransactionResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation_result: Option<OperationResult>,
    },
}

impl Evidence {
    pub fn kind(&self) -> &'static str {
        match self {
            Evidence::XrplToCosmosTransfer { .. } => "xrpl_to_cosmos_transfer",
            Evidence::XrplTransactionResult { .. } => "xrpl_transaction_result",
        }
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            Evidence::XrplToCosmosTransfer { tx_hash, .. } => Some(tx_hash),
            Evidence::XrplTransactionResult { tx_hash, .. } => tx_hash.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Active,
    Halted,
}

// ============================================================================
// Execute messages
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    /// Store this relayer's multisignature for an operation
    SaveSignature {
        /// Ticket sequence, or account sequence when no ticket is used
        operation_id: u32,
        operation_version: u64,
        signature: String,
    },

    /// Vote for an XRPL fact
    SaveEvidence { evidence: Evidence },

    /// Claim the bridging fees accrued to the sender
    ClaimRelayerFees { amounts: Vec<Coin> },

    /// Allocate tickets again after they ran out (owner only)
    RecoverTickets {
        account_sequence: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        number_of_tickets: Option<u32>,
    },

    /// Register a token issued on XRPL (owner only)
    RegisterXrplToken {
        issuer: String,
        currency: String,
        sending_precision: i32,
        max_holding_amount: Uint128,
        bridging_fee: Uint128,
    },

    /// Replace the relayer set and threshold (owner only)
    RotateKeys {
        new_relayers: Vec<Relayer>,
        new_evidence_threshold: u32,
    },

    /// Update the fee base used for new operations (owner only)
    UpdateXrplBaseFee { xrpl_base_fee: u64 },

    /// Stop all bridging (owner or relayer)
    HaltBridge {},

    /// Resume bridging (owner only)
    ResumeBridge {},
}

// ============================================================================
// Query messages
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    Config {},
    PendingOperations {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_after_key: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    AvailableTickets {},
    FeesCollected { relayer_address: String },
    BridgeState {},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub relayers: Vec<Relayer>,
    pub evidence_threshold: u32,
    pub used_ticket_sequence_threshold: u32,
    pub trust_set_limit_amount: Uint128,
    pub bridge_xrpl_address: String,
    pub bridge_state: BridgeState,
    pub xrpl_base_fee: u64,
    #[serde(default)]
    pub token_factory_addr: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingOperationsResponse {
    #[serde(default)]
    pub last_key: Option<u64>,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailableTicketsResponse {
    pub tickets: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeesCollectedResponse {
    pub fees_collected: Vec<Coin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStateResponse {
    pub state: BridgeState,
}
