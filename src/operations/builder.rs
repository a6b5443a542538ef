//! Multisigning transaction skeletons for pending operations

use thiserror::Error;

use crate::contracts::{Operation, OperationType};
use crate::xrpl::currency::XRP_CURRENCY;
use crate::xrpl::fee::multisigning_fee;
use crate::xrpl::{Amount, IssuedAmount, Signer, SignerEntry, Transaction, TransactionKind};

/// Weight every relayer gets in a rotated signer list
const ROTATED_SIGNER_WEIGHT: u16 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// The operation does not carry enough data for any transaction type
    #[error("operation {id} ({operation_type}) does not qualify for an XRPL transaction")]
    Unqualified {
        id: String,
        operation_type: &'static str,
    },

    #[error("operation {id} has neither a ticket nor an account sequence")]
    MissingSequence { id: String },
}

/// Whether the operation carries a usable transaction payload
pub fn qualifies(operation_type: &OperationType) -> bool {
    match operation_type {
        OperationType::AllocateTickets { number } => *number > 0,
        OperationType::TrustSet {
            issuer, currency, ..
        } => !issuer.is_empty() && !currency.is_empty(),
        OperationType::CosmosToXrplTransfer {
            issuer,
            currency,
            amount,
            recipient,
            ..
        } => {
            !issuer.is_empty() && !currency.is_empty() && !amount.is_zero() && !recipient.is_empty()
        }
        OperationType::RotateKeys {
            new_relayers,
            new_evidence_threshold,
        } => !new_relayers.is_empty() && *new_evidence_threshold > 0,
    }
}

/// Builds bridge account transactions in their canonical multisigning form
#[derive(Debug, Clone)]
pub struct TxBuilder {
    bridge_account: String,
}

impl TxBuilder {
    pub fn new(bridge_account: &str) -> Self {
        Self {
            bridge_account: bridge_account.to_string(),
        }
    }

    pub fn bridge_account(&self) -> &str {
        &self.bridge_account
    }

    /// Build the unsigned transaction for an operation.
    ///
    /// The result has an empty `SigningPubKey`, `Sequence` zero when a ticket
    /// is consumed, and the flat multisigning fee.
    pub fn build(&self, operation: &Operation) -> Result<Transaction, BuildError> {
        if !qualifies(&operation.operation_type) {
            return Err(BuildError::Unqualified {
                id: operation.id.clone(),
                operation_type: operation.operation_type.name(),
            });
        }

        let (sequence, ticket_sequence) = match (operation.ticket(), operation.sequence()) {
            (Some(ticket), _) => (0, Some(ticket)),
            (None, Some(sequence)) => (sequence, None),
            (None, None) => {
                return Err(BuildError::MissingSequence {
                    id: operation.id.clone(),
                })
            }
        };

        Ok(Transaction {
            account: self.bridge_account.clone(),
            kind: transaction_kind(&operation.operation_type),
            fee: multisigning_fee(operation.xrpl_base_fee).to_string(),
            flags: 0,
            sequence,
            ticket_sequence,
            signing_pub_key: String::new(),
            signers: Vec::new(),
        })
    }
}

fn transaction_kind(operation_type: &OperationType) -> TransactionKind {
    match operation_type {
        OperationType::AllocateTickets { number } => TransactionKind::TicketCreate {
            ticket_count: *number,
        },
        OperationType::TrustSet {
            issuer,
            currency,
            trust_set_limit_amount,
        } => TransactionKind::TrustSet {
            limit_amount: IssuedAmount {
                currency: currency.clone(),
                issuer: issuer.clone(),
                value: trust_set_limit_amount.to_string(),
            },
        },
        OperationType::CosmosToXrplTransfer {
            issuer,
            currency,
            amount,
            max_amount,
            recipient,
            ..
        } => {
            let to_amount = |value: String| {
                if currency == XRP_CURRENCY {
                    Amount::Drops(value)
                } else {
                    Amount::Issued(IssuedAmount {
                        currency: currency.clone(),
                        issuer: issuer.clone(),
                        value,
                    })
                }
            };
            TransactionKind::Payment {
                destination: recipient.clone(),
                amount: to_amount(amount.to_string()),
                send_max: max_amount.as_ref().map(|max| to_amount(max.to_string())),
            }
        }
        OperationType::RotateKeys {
            new_relayers,
            new_evidence_threshold,
        } => TransactionKind::SignerListSet {
            signer_quorum: *new_evidence_threshold,
            signer_entries: new_relayers
                .iter()
                .map(|relayer| SignerEntry {
                    account: relayer.xrpl_address.clone(),
                    signer_weight: ROTATED_SIGNER_WEIGHT,
                })
                .collect(),
        },
    }
}

/// Attach signers in descending account order.
///
/// This fixes the JSON rendering only; the binary encoding orders signers by
/// numeric account ID on its own.
pub fn attach_signers(mut tx: Transaction, mut signers: Vec<Signer>) -> Transaction {
    signers.sort_by(|a, b| b.account.cmp(&a.account));
    tx.signers = signers;
    tx
}
