//! XRPL transaction model for the multisigned bridge transactions
//!
//! Only the four transaction types the bridge account ever signs are
//! modelled. Every variant carries exactly the fields of its type.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Transaction types known to the relayer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Payment,
    AccountSet,
    TicketCreate,
    SignerListSet,
    TrustSet,
}

impl TransactionType {
    /// Numeric code used by the binary codec
    pub fn code(&self) -> u16 {
        match self {
            TransactionType::Payment => 0,
            TransactionType::AccountSet => 3,
            TransactionType::TicketCreate => 10,
            TransactionType::SignerListSet => 12,
            TransactionType::TrustSet => 20,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransactionType::Payment => "Payment",
            TransactionType::AccountSet => "AccountSet",
            TransactionType::TicketCreate => "TicketCreate",
            TransactionType::SignerListSet => "SignerListSet",
            TransactionType::TrustSet => "TrustSet",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Payment" => Some(TransactionType::Payment),
            "AccountSet" => Some(TransactionType::AccountSet),
            "TicketCreate" => Some(TransactionType::TicketCreate),
            "SignerListSet" => Some(TransactionType::SignerListSet),
            "TrustSet" => Some(TransactionType::TrustSet),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Issued currency amount as it appears in XRPL JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedAmount {
    pub currency: String,
    pub issuer: String,
    pub value: String,
}

/// XRPL amount: a drops string for XRP or an issued currency object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Drops(String),
    Issued(IssuedAmount),
}

impl Amount {
    pub fn to_json(&self) -> Value {
        match self {
            Amount::Drops(drops) => Value::String(drops.clone()),
            Amount::Issued(issued) => json!({
                "currency": issued.currency,
                "issuer": issued.issuer,
                "value": issued.value,
            }),
        }
    }
}

/// Entry of a signer list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignerEntry {
    pub account: String,
    pub signer_weight: u16,
}

/// A single multisignature attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Signer {
    pub account: String,
    pub signing_pub_key: String,
    pub txn_signature: String,
}

/// Type-specific transaction fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionKind {
    TicketCreate {
        ticket_count: u32,
    },
    TrustSet {
        limit_amount: IssuedAmount,
    },
    Payment {
        destination: String,
        amount: Amount,
        send_max: Option<Amount>,
    },
    SignerListSet {
        signer_quorum: u32,
        signer_entries: Vec<SignerEntry>,
    },
}

impl TransactionKind {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            TransactionKind::TicketCreate { .. } => TransactionType::TicketCreate,
            TransactionKind::TrustSet { .. } => TransactionType::TrustSet,
            TransactionKind::Payment { .. } => TransactionType::Payment,
            TransactionKind::SignerListSet { .. } => TransactionType::SignerListSet,
        }
    }
}

/// A bridge account transaction prepared for multisigning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub account: String,
    pub kind: TransactionKind,
    /// Fee in drops
    pub fee: String,
    pub flags: u32,
    /// Zero when the transaction consumes a ticket
    pub sequence: u32,
    pub ticket_sequence: Option<u32>,
    /// Empty for multisigned transactions
    pub signing_pub_key: String,
    pub signers: Vec<Signer>,
}

impl Transaction {
    pub fn transaction_type(&self) -> TransactionType {
        self.kind.transaction_type()
    }

    /// JSON representation in the XRPL field naming
    pub fn to_json(&self) -> Value {
        let mut tx = Map::new();
        tx.insert(
            "TransactionType".into(),
            json!(self.transaction_type().name()),
        );
        tx.insert("Account".into(), json!(self.account));
        tx.insert("Fee".into(), json!(self.fee));
        tx.insert("Flags".into(), json!(self.flags));
        tx.insert("Sequence".into(), json!(self.sequence));
        if let Some(ticket) = self.ticket_sequence {
            tx.insert("TicketSequence".into(), json!(ticket));
        }
        tx.insert("SigningPubKey".into(), json!(self.signing_pub_key));

        match &self.kind {
            TransactionKind::TicketCreate { ticket_count } => {
                tx.insert("TicketCount".into(), json!(ticket_count));
            }
            TransactionKind::TrustSet { limit_amount } => {
                tx.insert(
                    "LimitAmount".into(),
                    Amount::Issued(limit_amount.clone()).to_json(),
                );
            }
            TransactionKind::Payment {
                destination,
                amount,
                send_max,
            } => {
                tx.insert("Destination".into(), json!(destination));
                tx.insert("Amount".into(), amount.to_json());
                if let Some(send_max) = send_max {
                    tx.insert("SendMax".into(), send_max.to_json());
                }
            }
            TransactionKind::SignerListSet {
                signer_quorum,
                signer_entries,
            } => {
                tx.insert("SignerQuorum".into(), json!(signer_quorum));
                let entries: Vec<Value> = signer_entries
                    .iter()
                    .map(|entry| json!({ "SignerEntry": entry }))
                    .collect();
                tx.insert("SignerEntries".into(), Value::Array(entries));
            }
        }

        if !self.signers.is_empty() {
            let signers: Vec<Value> = self
                .signers
                .iter()
                .map(|signer| json!({ "Signer": signer }))
                .collect();
            tx.insert("Signers".into(), Value::Array(signers));
        }

        Value::Object(tx)
    }
}
