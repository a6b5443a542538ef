//! The relay loop
//!
//! Each cycle reports XRPL evidence, then processes pending operations, then
//! runs the optional actions, and sleeps for the poll interval. Failures of
//! one direction are logged and counted; the next cycle starts over from the
//! state held by the two ledgers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use cosmwasm_std::{Coin, Uint128};
use eyre::{Result, WrapErr};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::SharedStats;
use crate::contract_client::BridgeContract;
use crate::contracts::BridgeState;
use crate::evidence::EvidenceReporter;
use crate::metrics;
use crate::operations::OperationRelayer;
use crate::xrpl::XrplApi;

/// Log a heartbeat every this many cycles
const HEARTBEAT_CYCLES: u64 = 20;

/// Periodic task run after both bridge directions
#[async_trait]
pub trait RelayAction: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> Result<()>;
}

/// Claims the relayer's share of bridging fees once it exceeds a minimum
pub struct ClaimFeesAction {
    contract: Arc<dyn BridgeContract>,
    min_amount: u128,
}

impl ClaimFeesAction {
    pub fn new(contract: Arc<dyn BridgeContract>, min_amount: u128) -> Self {
        Self {
            contract,
            min_amount,
        }
    }

    /// Coins strictly above the minimum
    pub fn claimable(&self, collected: Vec<Coin>) -> Vec<Coin> {
        let min = Uint128::new(self.min_amount);
        collected.into_iter().filter(|coin| coin.amount > min).collect()
    }
}

#[async_trait]
impl RelayAction for ClaimFeesAction {
    fn name(&self) -> &'static str {
        "claim_fees"
    }

    async fn run(&self) -> Result<()> {
        let collected = self
            .contract
            .fees_collected(self.contract.relayer_address())
            .await
            .wrap_err("Failed to query collected fees")?;

        let amounts = self.claimable(collected);
        if amounts.is_empty() {
            debug!(min_amount = %self.min_amount, "No fees above the claim threshold");
            return Ok(());
        }

        let claimed = amounts
            .iter()
            .map(|coin| coin.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let txhash = self.contract.claim_relayer_fees(amounts).await?;
        info!(amounts = %claimed, txhash = %txhash, "Claimed relayer fees");
        Ok(())
    }
}

/// Tracks the bridge state and the ticket pool.
///
/// Operations keep being signed while the bridge is halted, since key
/// rotation and ticket recovery run in that state.
pub struct BridgeMonitorAction {
    contract: Arc<dyn BridgeContract>,
    stats: SharedStats,
    tickets_warning_threshold: usize,
}

impl BridgeMonitorAction {
    pub fn new(
        contract: Arc<dyn BridgeContract>,
        stats: SharedStats,
        tickets_warning_threshold: usize,
    ) -> Self {
        Self {
            contract,
            stats,
            tickets_warning_threshold,
        }
    }
}

#[async_trait]
impl RelayAction for BridgeMonitorAction {
    fn name(&self) -> &'static str {
        "bridge_monitor"
    }

    async fn run(&self) -> Result<()> {
        let (state, tickets) = futures::try_join!(
            self.contract.bridge_state(),
            self.contract.available_tickets()
        )
        .wrap_err("Failed to query bridge status")?;
        let available = tickets.len();
        metrics::record_bridge_status(state == BridgeState::Halted, available);

        let mut stats = self.stats.write().await;
        let previous_state = stats.bridge_state.replace(state);
        let previous_tickets = stats.available_tickets.replace(available);
        drop(stats);

        if previous_state != Some(state) {
            match state {
                BridgeState::Halted => warn!("Bridge is halted, only owner operations are accepted"),
                BridgeState::Active => info!("Bridge is active"),
            }
        }

        let was_low = previous_tickets.is_some_and(|n| n < self.tickets_warning_threshold);
        if available < self.tickets_warning_threshold && !was_low {
            warn!(
                available,
                threshold = self.tickets_warning_threshold,
                "Few XRPL tickets left, the owner should recover tickets"
            );
        }
        Ok(())
    }
}

pub struct RelayLoop {
    evidence: EvidenceReporter,
    operations: OperationRelayer,
    actions: Vec<Box<dyn RelayAction>>,
    xrpl: Arc<dyn XrplApi>,
    stats: SharedStats,
    poll_interval: Duration,
}

impl RelayLoop {
    pub fn new(
        evidence: EvidenceReporter,
        operations: OperationRelayer,
        xrpl: Arc<dyn XrplApi>,
        stats: SharedStats,
        poll_interval: Duration,
    ) -> Self {
        Self {
            evidence,
            operations,
            actions: Vec::new(),
            xrpl,
            stats,
            poll_interval,
        }
    }

    pub fn with_action(mut self, action: Box<dyn RelayAction>) -> Self {
        self.actions.push(action);
        self
    }

    /// Run cycles until a shutdown signal arrives
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            watermark = self.evidence.watermark(),
            actions = self.actions.len(),
            "Relay loop starting"
        );

        let mut cycle = 0u64;
        loop {
            cycle += 1;
            if cycle % HEARTBEAT_CYCLES == 1 {
                info!(cycle, watermark = self.evidence.watermark(), "Relay loop heartbeat");
            }

            tokio::select! {
                _ = self.run_cycle() => {}
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping relay loop");
                    return Ok(());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping relay loop");
                    return Ok(());
                }
            }
        }
    }

    /// One pass over both directions and the extra actions.
    ///
    /// Returns whether both directions completed without a cycle-level error.
    pub async fn run_cycle(&mut self) -> bool {
        let evidence_ok = self.relay_evidence().await;
        let operations_ok = self.relay_operations().await;

        for action in &self.actions {
            if let Err(e) = action.run().await {
                metrics::record_error("action", action.name());
                warn!(action = action.name(), error = ?e, "Relay action failed");
            }
        }

        let success = evidence_ok && operations_ok;
        let mut stats = self.stats.write().await;
        stats.cycles += 1;
        stats.scan_watermark = self.evidence.watermark();
        if success {
            stats.last_successful_cycle = Some(Utc::now());
            metrics::record_successful_cycle();
        }
        success
    }

    async fn relay_evidence(&mut self) -> bool {
        match self.evidence.report_new_transactions().await {
            Ok(summary) => {
                metrics::record_cycle("xrpl_to_contract", true);
                let mut stats = self.stats.write().await;
                stats.transactions_scanned += summary.scanned as u64;
                stats.evidence_reported += summary.reported as u64;
                stats.evidence_failed += summary.failed as u64;
                true
            }
            Err(e) => {
                metrics::record_cycle("xrpl_to_contract", false);
                metrics::record_error("evidence", "cycle");
                error!(error = ?e, "Evidence cycle failed");
                self.on_cycle_error(&e).await;
                false
            }
        }
    }

    async fn relay_operations(&mut self) -> bool {
        match self.operations.process_pending_operations().await {
            Ok(summary) => {
                metrics::record_cycle("contract_to_xrpl", summary.failed == 0);
                let mut stats = self.stats.write().await;
                stats.operations_seen += summary.total as u64;
                stats.operations_failed += summary.failed as u64;
                true
            }
            Err(e) => {
                metrics::record_cycle("contract_to_xrpl", false);
                metrics::record_error("operations", "cycle");
                error!(error = ?e, "Operations cycle failed");
                self.on_cycle_error(&e).await;
                false
            }
        }
    }

    async fn on_cycle_error(&self, e: &eyre::Report) {
        self.stats.write().await.last_error = Some(format!("{:#}", e));
        if let Err(e) = self.xrpl.reconnect().await {
            warn!(error = %e, "Failed to reconnect XRPL client");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RelayerStats;
    use crate::contracts::{Config, Evidence, PendingOperationsResponse};
    use eyre::eyre;
    use std::sync::Mutex;
    use tokio::sync::RwLock;

    /// Serves fees and bridge status, records claims
    struct StubContract {
        collected: Vec<Coin>,
        claims: Mutex<Vec<Vec<Coin>>>,
        state: Mutex<BridgeState>,
        tickets: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl BridgeContract for StubContract {
        fn relayer_address(&self) -> &str {
            "orai1relayer1"
        }
        async fn config(&self) -> Result<Config> {
            Err(eyre!("not used"))
        }
        async fn pending_operations(
            &self,
            _start_after_key: Option<u64>,
            _limit: Option<u32>,
        ) -> Result<PendingOperationsResponse> {
            Ok(PendingOperationsResponse::default())
        }
        async fn available_tickets(&self) -> Result<Vec<u32>> {
            Ok(self.tickets.lock().unwrap().clone())
        }
        async fn fees_collected(&self, relayer_address: &str) -> Result<Vec<Coin>> {
            assert_eq!(relayer_address, "orai1relayer1");
            Ok(self.collected.clone())
        }
        async fn bridge_state(&self) -> Result<BridgeState> {
            Ok(*self.state.lock().unwrap())
        }
        async fn save_signature(&self, _: u32, _: u64, _: &str) -> Result<String> {
            Err(eyre!("not used"))
        }
        async fn save_evidence(&self, _evidence: &Evidence) -> Result<String> {
            Err(eyre!("not used"))
        }
        async fn claim_relayer_fees(&self, amounts: Vec<Coin>) -> Result<String> {
            self.claims.lock().unwrap().push(amounts);
            Ok("TXHASH".to_string())
        }
        async fn recover_tickets(&self, _: u32, _: Option<u32>) -> Result<String> {
            Err(eyre!("not used"))
        }
        async fn halt_bridge(&self) -> Result<String> {
            Err(eyre!("not used"))
        }
        async fn resume_bridge(&self) -> Result<String> {
            Err(eyre!("not used"))
        }
        async fn update_xrpl_base_fee(&self, _xrpl_base_fee: u64) -> Result<String> {
            Err(eyre!("not used"))
        }
    }

    fn stub_contract(collected: Vec<Coin>) -> Arc<StubContract> {
        Arc::new(StubContract {
            collected,
            claims: Mutex::new(vec![]),
            state: Mutex::new(BridgeState::Active),
            tickets: Mutex::new(vec![10, 11, 12]),
        })
    }

    #[tokio::test]
    async fn test_claims_only_coins_above_minimum() {
        let contract = stub_contract(vec![
            Coin::new(1_000_000u128, "orai"),
            Coin::new(2_500_000u128, "factory/orai1bridge/xrp"),
            Coin::new(10u128, "uusdt"),
        ]);
        let action = ClaimFeesAction::new(contract.clone(), 1_000_000);

        action.run().await.unwrap();

        let claims = contract.claims.lock().unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0], vec![Coin::new(2_500_000u128, "factory/orai1bridge/xrp")]);
    }

    #[tokio::test]
    async fn test_nothing_to_claim() {
        let contract = stub_contract(vec![Coin::new(5u128, "orai")]);
        let action = ClaimFeesAction::new(contract.clone(), 1_000_000);

        action.run().await.unwrap();
        assert!(contract.claims.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_monitor_tracks_bridge_status() {
        let contract = stub_contract(vec![]);
        let stats: SharedStats = Arc::new(RwLock::new(RelayerStats::new(
            "orai1relayer1",
            "rRelayer1",
            "rBridge",
        )));
        let action = BridgeMonitorAction::new(contract.clone(), stats.clone(), 5);

        action.run().await.unwrap();
        {
            let stats = stats.read().await;
            assert_eq!(stats.bridge_state, Some(BridgeState::Active));
            assert_eq!(stats.available_tickets, Some(3));
        }

        *contract.state.lock().unwrap() = BridgeState::Halted;
        contract.tickets.lock().unwrap().clear();
        action.run().await.unwrap();

        let stats = stats.read().await;
        assert_eq!(stats.bridge_state, Some(BridgeState::Halted));
        assert_eq!(stats.available_tickets, Some(0));
    }
}
