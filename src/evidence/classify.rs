//! Mapping of scanned bridge account transactions to contract evidence

use crate::contracts::{Evidence, OperationResult, TransactionResult};
use crate::xrpl::currency::{convert_amount_to_issued_currency_amount, is_zero};
use crate::xrpl::memo::decode_bridge_memo;
use crate::xrpl::{ScannedTransaction, TransactionType, RESULT_SUCCESS};

/// What the reporter does with a scanned transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The result code may still change; look again next cycle
    NotFinal,
    Report(Evidence),
    Ignored(&'static str),
}

/// Whether a transaction result can no longer change
pub fn is_final(transaction_result: &str) -> bool {
    transaction_result == RESULT_SUCCESS
        || transaction_result.starts_with("tec")
        || transaction_result.starts_with("tem")
        || transaction_result == "tefPAST_SEQ"
        || transaction_result == "tefMAX_LEDGER"
}

fn transaction_result(result: &str) -> TransactionResult {
    if result == RESULT_SUCCESS {
        TransactionResult::Accepted
    } else {
        TransactionResult::Rejected
    }
}

/// Classify a transaction of the bridge account history
pub fn classify(scanned: &ScannedTransaction, bridge_account: &str) -> Classification {
    let Some(meta) = &scanned.meta else {
        return Classification::NotFinal;
    };
    if !is_final(&meta.transaction_result) {
        return Classification::NotFinal;
    }

    if scanned.tx.account == bridge_account {
        classify_outgoing(scanned, &meta.transaction_result)
    } else {
        classify_incoming(scanned, bridge_account)
    }
}

fn classify_incoming(scanned: &ScannedTransaction, bridge_account: &str) -> Classification {
    let tx = &scanned.tx;
    let Some(meta) = &scanned.meta else {
        return Classification::NotFinal;
    };

    if TransactionType::from_name(&tx.transaction_type) != Some(TransactionType::Payment) {
        return Classification::Ignored("incoming transaction is not a payment");
    }
    if tx.destination.as_deref() != Some(bridge_account) {
        return Classification::Ignored("payment is not addressed to the bridge");
    }
    if meta.transaction_result != RESULT_SUCCESS {
        return Classification::Ignored("incoming payment failed");
    }

    let Some(bridge_memo) = decode_bridge_memo(&tx.memos) else {
        return Classification::Ignored("missing or malformed bridge memo");
    };
    let Some(delivered) = &meta.delivered_amount else {
        return Classification::Ignored("missing delivered amount");
    };
    let Ok(amount) = convert_amount_to_issued_currency_amount(delivered) else {
        return Classification::Ignored("unreadable delivered amount");
    };
    if is_zero(&amount.value) {
        return Classification::Ignored("zero delivered amount");
    }

    Classification::Report(Evidence::XrplToCosmosTransfer {
        tx_hash: scanned.hash.clone(),
        issuer: amount.issuer,
        currency: amount.currency,
        amount: amount.value,
        recipient: bridge_memo.orai_recipient,
        memo: Some(bridge_memo.memo).filter(|m| !m.is_empty()),
    })
}

fn classify_outgoing(scanned: &ScannedTransaction, result: &str) -> Classification {
    let tx = &scanned.tx;
    let transaction_result = transaction_result(result);

    match TransactionType::from_name(&tx.transaction_type) {
        Some(TransactionType::TicketCreate) => {
            let tickets = scanned
                .meta
                .as_ref()
                .map(|meta| meta.created_tickets())
                .unwrap_or_default();
            Classification::Report(Evidence::XrplTransactionResult {
                tx_hash: Some(scanned.hash.clone()),
                account_sequence: Some(tx.sequence).filter(|s| *s != 0),
                ticket_sequence: tx.ticket(),
                transaction_result,
                operation_result: Some(OperationResult::TicketsAllocation {
                    tickets: Some(tickets).filter(|t| !t.is_empty()),
                }),
            })
        }
        Some(TransactionType::TrustSet) | Some(TransactionType::Payment) => {
            Classification::Report(keyed_result(scanned, transaction_result))
        }
        Some(TransactionType::SignerListSet) => {
            // the bootstrap list is set by the bridge owner with a regular signature
            if tx.signers.is_empty() {
                return Classification::Ignored("signer list set without multisignature");
            }
            Classification::Report(keyed_result(scanned, transaction_result))
        }
        Some(TransactionType::AccountSet) => Classification::Ignored("account settings change"),
        _ => Classification::Ignored("unexpected outgoing transaction type"),
    }
}

/// Result evidence identified by the ticket, or by the sequence without one
fn keyed_result(scanned: &ScannedTransaction, transaction_result: TransactionResult) -> Evidence {
    let ticket_sequence = scanned.tx.ticket();
    Evidence::XrplTransactionResult {
        tx_hash: Some(scanned.hash.clone()),
        account_sequence: match ticket_sequence {
            Some(_) => None,
            None => Some(scanned.tx.sequence).filter(|s| *s != 0),
        },
        ticket_sequence,
        transaction_result,
        operation_result: None,
    }
}
