//! Checks against a running XRPL node
//!
//! Run with: cargo test --test live_xrpl -- --ignored
//!
//! Requires XRPL_RPC_URL and XRPL_BRIDGE_ADDRESS; XRPL_START_LEDGER is optional.

use std::env;
use std::sync::Arc;

use xrpl_relayer::evidence::{classify, Classification};
use xrpl_relayer::xrpl::fee::compute_base_fee;
use xrpl_relayer::xrpl::{LedgerScanner, XrplApi, XrplRpcClient};

struct LiveConfig {
    rpc_url: String,
    bridge_address: String,
    start_ledger: i64,
}

impl LiveConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            rpc_url: env::var("XRPL_RPC_URL").ok()?,
            bridge_address: env::var("XRPL_BRIDGE_ADDRESS").ok()?,
            start_ledger: env::var("XRPL_START_LEDGER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(-1),
        })
    }
}

fn client(config: &LiveConfig) -> Arc<dyn XrplApi> {
    Arc::new(XrplRpcClient::new(&config.rpc_url).expect("Failed to create XRPL client"))
}

#[tokio::test]
#[ignore]
async fn test_bridge_account_is_reachable() {
    let config = LiveConfig::from_env()
        .expect("Set XRPL_RPC_URL and XRPL_BRIDGE_ADDRESS to run live tests");
    let xrpl = client(&config);

    let state = xrpl.server_state().await.expect("server_state failed");
    assert!(state.base_fee > 0);
    let base_fee = compute_base_fee(state.base_fee, state.load_factor, state.load_base);
    assert!(base_fee >= state.base_fee);
    println!("Base fee with load: {} drops", base_fee);

    let info = xrpl
        .account_info(&config.bridge_address)
        .await
        .expect("account_info failed");
    assert_eq!(info.account, config.bridge_address);
    println!("Bridge sequence: {}", info.sequence);

    let signer_lists = xrpl
        .signer_lists(&config.bridge_address)
        .await
        .expect("account_objects failed");
    assert!(signer_lists.len() <= 1, "an account holds at most one signer list");
}

#[tokio::test]
#[ignore]
async fn test_scan_bridge_history() {
    let config = LiveConfig::from_env()
        .expect("Set XRPL_RPC_URL and XRPL_BRIDGE_ADDRESS to run live tests");
    let mut scanner = LedgerScanner::new(client(&config), &config.bridge_address, config.start_ledger);

    let transactions = scanner.scan().await.expect("scan failed");
    println!("Scanned {} transactions", transactions.len());

    for scanned in &transactions {
        assert!(scanned.ledger_index as i64 >= config.start_ledger);
        assert!((scanned.ledger_index as i64) < scanner.watermark());
        match classify(scanned, &config.bridge_address) {
            Classification::Report(evidence) => {
                println!("{} -> {}", scanned.hash, evidence.kind())
            }
            Classification::NotFinal => println!("{} not final", scanned.hash),
            Classification::Ignored(reason) => println!("{} ignored: {}", scanned.hash, reason),
        }
    }
}
