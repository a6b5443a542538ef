//! Contract → XRPL: sign pending operations and submit them once quorum is met
//!
//! [`plan_operation`] holds every decision about an operation and performs no
//! I/O. [`OperationRelayer`] fetches what the plan needs, carries out the
//! resulting [`OperationAction`] and reports.

pub mod builder;
pub mod signers;

use std::sync::Arc;

use eyre::{Result, WrapErr};
use tracing::{debug, error, info, warn};

use crate::contract_client::BridgeContract;
use crate::contracts::{Evidence, Operation, OperationType, TransactionResult};
use crate::metrics;
use crate::xrpl::codec;
use crate::xrpl::fee::compute_base_fee;
use crate::xrpl::rpc::SubmitResult;
use crate::xrpl::{Transaction, Wallet, XrplApi, RESULT_SUCCESS};

pub use builder::{attach_signers, BuildError, TxBuilder};
pub use signers::{aggregate_quorum, BridgeSigners, Quorum, SignerSetResolver};

/// What to do with a pending operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationAction {
    /// The bridge account moved past the operation's sequence
    ReportInvalid { account_sequence: u32 },
    /// Contribute this relayer's signature over the transaction
    Sign(Transaction),
    /// Quorum met: submit the multisigned transaction to XRPL
    Submit(Transaction),
    /// This relayer signed already; the others have not reached quorum yet
    AwaitQuorum { weight: u32 },
}

/// Inputs of [`plan_operation`] that are shared by all operations of a cycle
pub struct PlanContext<'a> {
    pub relayer_address: &'a str,
    pub signers: &'a BridgeSigners,
    pub builder: &'a TxBuilder,
}

/// Whether this relayer already contributed a signature to the operation
pub fn has_signed(operation: &Operation, relayer_address: &str) -> bool {
    operation
        .signatures
        .iter()
        .any(|s| s.relayer_cosmos_address == relayer_address)
}

/// Account sequence the bridge account must still be at for the operation to be valid.
///
/// Only ticket allocations consuming an account sequence are checked, and never
/// once this relayer has signed, so an earlier vote is not revised.
pub fn sequence_to_verify(operation: &Operation, relayer_address: &str) -> Option<u32> {
    if has_signed(operation, relayer_address) {
        return None;
    }
    match operation.operation_type {
        OperationType::AllocateTickets { number } if number > 0 => operation.sequence(),
        _ => None,
    }
}

/// Decide the next step for an operation.
///
/// `current_sequence` is the bridge account sequence, fetched by the caller
/// whenever [`sequence_to_verify`] returns a value.
pub fn plan_operation(
    operation: &Operation,
    context: &PlanContext<'_>,
    current_sequence: Option<u32>,
) -> Result<OperationAction, BuildError> {
    if let (Some(expected), Some(current)) = (
        sequence_to_verify(operation, context.relayer_address),
        current_sequence,
    ) {
        if expected != current {
            return Ok(OperationAction::ReportInvalid {
                account_sequence: expected,
            });
        }
    }

    let tx = context.builder.build(operation)?;

    match aggregate_quorum(&operation.signatures, context.signers) {
        // rebuilt so nothing done to the signing copy leaks into the submission
        Quorum::Reached(selected) => Ok(OperationAction::Submit(attach_signers(
            context.builder.build(operation)?,
            selected,
        ))),
        Quorum::NotReached { weight } if has_signed(operation, context.relayer_address) => {
            Ok(OperationAction::AwaitQuorum { weight })
        }
        Quorum::NotReached { .. } => Ok(OperationAction::Sign(tx)),
    }
}

/// Engine result classes of an XRPL submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Success,
    /// Applied with a `tec` code: fee claimed, outcome final
    AppliedTec,
    /// The sequence or ticket was already consumed
    Duplicate,
    InsufficientFee,
    Unexpected,
}

impl SubmissionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionOutcome::Success => "success",
            SubmissionOutcome::AppliedTec => "applied_tec",
            SubmissionOutcome::Duplicate => "duplicate",
            SubmissionOutcome::InsufficientFee => "insufficient_fee",
            SubmissionOutcome::Unexpected => "unexpected",
        }
    }
}

pub fn classify_submission(engine_result: &str) -> SubmissionOutcome {
    match engine_result {
        RESULT_SUCCESS => SubmissionOutcome::Success,
        "tefPAST_SEQ" | "tefALREADY" | "tefNO_TICKET" => SubmissionOutcome::Duplicate,
        "telINSUF_FEE_P" => SubmissionOutcome::InsufficientFee,
        code if code.starts_with("tec") => SubmissionOutcome::AppliedTec,
        _ => SubmissionOutcome::Unexpected,
    }
}

/// What happened to one operation in a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    ReportedInvalid,
    Signed,
    AwaitingQuorum,
    Submitted(SubmissionOutcome),
}

/// Per-cycle tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationsSummary {
    pub total: usize,
    pub failed: usize,
}

pub struct OperationRelayer {
    contract: Arc<dyn BridgeContract>,
    xrpl: Arc<dyn XrplApi>,
    wallet: Arc<Wallet>,
    builder: TxBuilder,
    resolver: SignerSetResolver,
}

impl OperationRelayer {
    pub fn new(
        contract: Arc<dyn BridgeContract>,
        xrpl: Arc<dyn XrplApi>,
        wallet: Arc<Wallet>,
        bridge_account: &str,
    ) -> Self {
        Self {
            resolver: SignerSetResolver::new(xrpl.clone(), contract.clone(), bridge_account),
            builder: TxBuilder::new(bridge_account),
            contract,
            xrpl,
            wallet,
        }
    }

    /// Process every pending operation.
    ///
    /// Failing to list operations or to resolve the signer set fails the
    /// cycle; a failing operation is logged and does not affect the others.
    pub async fn process_pending_operations(&self) -> Result<OperationsSummary> {
        let operations = self
            .contract
            .all_pending_operations()
            .await
            .wrap_err("Failed to fetch pending operations")?;
        metrics::set_pending_operations(operations.len());

        if operations.is_empty() {
            debug!("No pending operations to process");
            return Ok(OperationsSummary::default());
        }

        let signers = self.resolver.resolve().await?;
        let mut summary = OperationsSummary {
            total: operations.len(),
            failed: 0,
        };

        for operation in &operations {
            if let Err(e) = self.process_operation(operation, &signers).await {
                summary.failed += 1;
                metrics::record_error("operations", operation.operation_type.name());
                error!(
                    operation_id = %operation.id,
                    version = operation.version,
                    operation_type = operation.operation_type.name(),
                    error = ?e,
                    "Failed to process operation"
                );
            }
        }

        Ok(summary)
    }

    pub async fn process_operation(
        &self,
        operation: &Operation,
        signers: &BridgeSigners,
    ) -> Result<OperationOutcome> {
        let relayer_address = self.contract.relayer_address();

        let current_sequence = match sequence_to_verify(operation, relayer_address) {
            Some(_) => Some(
                self.xrpl
                    .account_info(self.builder.bridge_account())
                    .await
                    .wrap_err("Failed to fetch bridge account info")?
                    .sequence,
            ),
            None => None,
        };

        let context = PlanContext {
            relayer_address,
            signers,
            builder: &self.builder,
        };

        match plan_operation(operation, &context, current_sequence)? {
            OperationAction::ReportInvalid { account_sequence } => {
                self.report_invalid(operation, account_sequence, current_sequence)
                    .await?;
                Ok(OperationOutcome::ReportedInvalid)
            }
            OperationAction::Sign(tx) => {
                self.register_signature(operation, &tx).await?;
                Ok(OperationOutcome::Signed)
            }
            OperationAction::AwaitQuorum { weight } => {
                debug!(
                    operation_id = %operation.id,
                    weight,
                    quorum = signers.quorum,
                    "Already signed, waiting for quorum"
                );
                Ok(OperationOutcome::AwaitingQuorum)
            }
            OperationAction::Submit(tx) => {
                let outcome = self.submit(operation, &tx).await?;
                Ok(OperationOutcome::Submitted(outcome))
            }
        }
    }

    async fn report_invalid(
        &self,
        operation: &Operation,
        account_sequence: u32,
        current_sequence: Option<u32>,
    ) -> Result<()> {
        warn!(
            operation_id = %operation.id,
            expected = ?current_sequence,
            in_operation = account_sequence,
            "Invalid bridge account sequence, reporting operation as invalid"
        );

        let evidence = Evidence::XrplTransactionResult {
            tx_hash: None,
            account_sequence: Some(account_sequence),
            ticket_sequence: None,
            transaction_result: TransactionResult::Invalid,
            operation_result: None,
        };
        let result = self.contract.save_evidence(&evidence).await;
        metrics::record_evidence(evidence.kind(), result.is_ok());
        result.wrap_err("Failed to report invalid operation")?;
        Ok(())
    }

    async fn register_signature(&self, operation: &Operation, tx: &Transaction) -> Result<()> {
        let signer = self.wallet.multisign(tx)?;
        let operation_type = operation.operation_type.name();

        let result = self
            .contract
            .save_signature(operation.signing_key(), operation.version, &signer.txn_signature)
            .await;
        metrics::record_signature(operation_type, result.is_ok());
        let txhash = result.wrap_err("Failed to save signature")?;

        info!(
            operation_id = %operation.id,
            operation_id_key = operation.signing_key(),
            version = operation.version,
            operation_type,
            txhash = %txhash,
            "Saved operation signature"
        );
        Ok(())
    }

    async fn submit(&self, operation: &Operation, tx: &Transaction) -> Result<SubmissionOutcome> {
        let blob = codec::encode(tx).wrap_err("Failed to encode multisigned transaction")?;
        let tx_hash = codec::transaction_hash(&blob);
        let response = self
            .xrpl
            .submit(&hex::encode_upper(&blob))
            .await
            .wrap_err("Failed to submit transaction to XRPL")?;

        let outcome = classify_submission(&response.engine_result);
        metrics::record_xrpl_submission(outcome.as_str());

        match outcome {
            SubmissionOutcome::Success => info!(
                operation_id = %operation.id,
                tx_hash = %tx_hash,
                transaction_type = %tx.transaction_type(),
                signers = tx.signers.len(),
                "Submitted multisigned transaction"
            ),
            SubmissionOutcome::AppliedTec => info!(
                operation_id = %operation.id,
                tx_hash = %tx_hash,
                engine_result = %response.engine_result,
                "Transaction applied with tec code, outcome is final"
            ),
            SubmissionOutcome::Duplicate => debug!(
                operation_id = %operation.id,
                tx_hash = %tx_hash,
                engine_result = %response.engine_result,
                "Transaction already submitted"
            ),
            SubmissionOutcome::InsufficientFee => {
                self.log_fee_diagnostics(operation, &response).await
            }
            SubmissionOutcome::Unexpected => error!(
                operation_id = %operation.id,
                tx_hash = %tx_hash,
                engine_result = %response.engine_result,
                message = %response.engine_result_message,
                tx = %tx.to_json(),
                response = %serde_json::to_string(&response).unwrap_or_default(),
                "Unexpected XRPL submission result"
            ),
        }

        Ok(outcome)
    }

    /// Insufficient fee is not retried; log what the network currently asks for
    async fn log_fee_diagnostics(&self, operation: &Operation, response: &SubmitResult) {
        match self.xrpl.server_state().await {
            Ok(state) => warn!(
                operation_id = %operation.id,
                engine_result = %response.engine_result,
                operation_base_fee = operation.xrpl_base_fee,
                current_base_fee =
                    compute_base_fee(state.base_fee, state.load_factor, state.load_base),
                "Transaction fee too low for current network load"
            ),
            Err(e) => warn!(
                operation_id = %operation.id,
                engine_result = %response.engine_result,
                operation_base_fee = operation.xrpl_base_fee,
                error = %e,
                "Transaction fee too low; server state unavailable"
            ),
        }
    }
}
