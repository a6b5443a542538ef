//! XRPL → contract: report bridge account history as evidence

pub mod classify;

use std::sync::Arc;

use eyre::Result;
use tracing::{debug, error, info, warn};

use crate::contract_client::{is_rejection, BridgeContract};
use crate::contracts::Evidence;
use crate::metrics;
use crate::retry::{with_retry, RetryConfig};
use crate::xrpl::LedgerScanner;

pub use classify::{classify, is_final, Classification};

/// Per-cycle tally of the evidence direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvidenceSummary {
    pub scanned: usize,
    pub reported: usize,
    /// The contract refused the evidence (already recorded, unknown operation, ...)
    pub rejected: usize,
    pub failed: usize,
    pub not_final: usize,
}

pub struct EvidenceReporter {
    contract: Arc<dyn BridgeContract>,
    scanner: LedgerScanner,
    bridge_account: String,
    retry: RetryConfig,
}

impl EvidenceReporter {
    pub fn new(
        contract: Arc<dyn BridgeContract>,
        scanner: LedgerScanner,
        bridge_account: &str,
        retry: RetryConfig,
    ) -> Self {
        Self {
            contract,
            scanner,
            bridge_account: bridge_account.to_string(),
            retry,
        }
    }

    pub fn watermark(&self) -> i64 {
        self.scanner.watermark()
    }

    /// Scan new bridge account transactions and submit evidence for each.
    ///
    /// A failing scan fails the cycle. Submission failures are counted per
    /// transaction and never stop the remaining ones.
    pub async fn report_new_transactions(&mut self) -> Result<EvidenceSummary> {
        let transactions = self.scanner.scan().await?;
        let mut summary = EvidenceSummary {
            scanned: transactions.len(),
            ..EvidenceSummary::default()
        };

        for scanned in &transactions {
            let evidence = match classify(scanned, &self.bridge_account) {
                Classification::Report(evidence) => evidence,
                Classification::NotFinal => {
                    summary.not_final += 1;
                    debug!(hash = %scanned.hash, "Transaction result not final yet");
                    continue;
                }
                Classification::Ignored(reason) => {
                    debug!(
                        hash = %scanned.hash,
                        transaction_type = %scanned.tx.transaction_type,
                        reason,
                        "Skipping transaction"
                    );
                    continue;
                }
            };

            match self.submit(&evidence).await {
                Ok(txhash) => {
                    summary.reported += 1;
                    info!(
                        hash = %scanned.hash,
                        ledger_index = scanned.ledger_index,
                        kind = evidence.kind(),
                        txhash = %txhash,
                        "Saved evidence"
                    );
                }
                Err(e) if is_rejection(&e) => {
                    summary.rejected += 1;
                    warn!(
                        hash = %scanned.hash,
                        kind = evidence.kind(),
                        error = %e,
                        "Contract rejected evidence"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    metrics::record_error("evidence", evidence.kind());
                    error!(
                        hash = %scanned.hash,
                        kind = evidence.kind(),
                        error = ?e,
                        "Failed to save evidence"
                    );
                }
            }
        }

        Ok(summary)
    }

    async fn submit(&self, evidence: &Evidence) -> Result<String> {
        let label = evidence.tx_hash().unwrap_or(evidence.kind());
        let result = with_retry(&self.retry, label, |_| self.contract.save_evidence(evidence)).await;
        metrics::record_evidence(evidence.kind(), result.is_ok());
        result
    }
}
