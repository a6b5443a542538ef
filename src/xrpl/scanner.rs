//! Bridge account transaction scanner

use std::sync::Arc;

use eyre::{Result, WrapErr};
use serde_json::Value;
use tracing::{debug, info};

use super::rpc::{TransactionMeta, TxJson, XrplApi};
use crate::metrics;

/// Sentinel for "earliest available ledger" / "latest validated ledger"
pub const UNBOUNDED_LEDGER: i64 = -1;

/// A transaction from a validated ledger with its metadata
#[derive(Debug, Clone)]
pub struct ScannedTransaction {
    pub hash: String,
    pub ledger_index: u64,
    pub tx: TxJson,
    pub meta: Option<TransactionMeta>,
}

/// Pages `account_tx` for the bridge account from a watermark onwards
pub struct LedgerScanner {
    xrpl: Arc<dyn XrplApi>,
    account: String,
    /// Lowest ledger index not scanned yet
    watermark: i64,
}

impl LedgerScanner {
    pub fn new(xrpl: Arc<dyn XrplApi>, account: &str, start_ledger: i64) -> Self {
        Self {
            xrpl,
            account: account.to_string(),
            watermark: start_ledger,
        }
    }

    pub fn watermark(&self) -> i64 {
        self.watermark
    }

    /// Fetch every validated transaction from the watermark to the latest ledger.
    ///
    /// The watermark moves past the highest observed ledger only after all
    /// pages were fetched; a failing page leaves it untouched.
    pub async fn scan(&mut self) -> Result<Vec<ScannedTransaction>> {
        let mut transactions = Vec::new();
        let mut marker: Option<Value> = None;
        let mut last_ledger: Option<u64> = None;
        let mut pages = 0u32;

        loop {
            let page = self
                .xrpl
                .account_tx(&self.account, self.watermark, UNBOUNDED_LEDGER, marker.take())
                .await
                .wrap_err("Failed to fetch bridge account transactions")?;
            pages += 1;

            for entry in page.transactions {
                if !entry.validated.unwrap_or(page.validated) {
                    debug!(hash = %entry.hash, "Skipping transaction from unvalidated ledger");
                    continue;
                }
                last_ledger = Some(last_ledger.map_or(entry.ledger_index, |l| l.max(entry.ledger_index)));
                transactions.push(ScannedTransaction {
                    hash: entry.hash,
                    ledger_index: entry.ledger_index,
                    tx: entry.tx_json,
                    meta: entry.meta,
                });
            }

            match page.marker {
                Some(next) if !next.is_null() => marker = Some(next),
                _ => break,
            }
        }

        if let Some(last) = last_ledger {
            let next = i64::try_from(last).unwrap_or(i64::MAX).saturating_add(1);
            if next > self.watermark {
                self.watermark = next;
            }
        }

        metrics::record_scan(transactions.len(), self.watermark);
        if !transactions.is_empty() {
            info!(
                count = transactions.len(),
                pages = pages,
                watermark = self.watermark,
                "Scanned bridge account transactions"
            );
        }

        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xrpl::rpc::{AccountInfo, AccountTxEntry, AccountTxPage, ServerState, SignerList, SubmitResult};
    use async_trait::async_trait;
    use eyre::eyre;
    use std::sync::Mutex;

    /// Serves scripted pages and records the requested ledger bounds
    struct ScriptedXrpl {
        pages: Mutex<Vec<Result<AccountTxPage>>>,
        requests: Mutex<Vec<(i64, Option<Value>)>>,
    }

    impl ScriptedXrpl {
        fn new(pages: Vec<Result<AccountTxPage>>) -> Self {
            Self {
                pages: Mutex::new(pages),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl XrplApi for ScriptedXrpl {
        async fn account_info(&self, _account: &str) -> Result<AccountInfo> {
            Err(eyre!("not scripted"))
        }

        async fn signer_lists(&self, _account: &str) -> Result<Vec<SignerList>> {
            Err(eyre!("not scripted"))
        }

        async fn account_tx(
            &self,
            _account: &str,
            ledger_index_min: i64,
            _ledger_index_max: i64,
            marker: Option<Value>,
        ) -> Result<AccountTxPage> {
            self.requests.lock().unwrap().push((ledger_index_min, marker));
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                return Ok(AccountTxPage {
                    validated: true,
                    ..AccountTxPage::default()
                });
            }
            pages.remove(0)
        }

        async fn submit(&self, _tx_blob: &str) -> Result<SubmitResult> {
            Err(eyre!("not scripted"))
        }

        async fn server_state(&self) -> Result<ServerState> {
            Err(eyre!("not scripted"))
        }

        async fn reconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    fn entry(hash: &str, ledger_index: u64) -> AccountTxEntry {
        AccountTxEntry {
            hash: hash.to_string(),
            ledger_index,
            tx_json: TxJson::default(),
            meta: None,
            validated: None,
        }
    }

    fn page(entries: Vec<AccountTxEntry>, marker: Option<Value>, validated: bool) -> AccountTxPage {
        AccountTxPage {
            transactions: entries,
            marker,
            validated,
        }
    }

    #[tokio::test]
    async fn test_follows_markers_and_advances_watermark() {
        let xrpl = Arc::new(ScriptedXrpl::new(vec![
            Ok(page(
                vec![entry("C", 30), entry("B", 20)],
                Some(serde_json::json!({"ledger": 20, "seq": 0})),
                true,
            )),
            Ok(page(vec![entry("A", 10)], None, true)),
        ]));
        let mut scanner = LedgerScanner::new(xrpl.clone(), "rBridge", UNBOUNDED_LEDGER);

        let txs = scanner.scan().await.unwrap();
        let hashes: Vec<&str> = txs.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["C", "B", "A"]);
        assert_eq!(scanner.watermark(), 31);

        let requests = xrpl.requests.lock().unwrap();
        assert_eq!(requests[0], (UNBOUNDED_LEDGER, None));
        assert_eq!(requests[1].0, UNBOUNDED_LEDGER);
        assert!(requests[1].1.is_some());
    }

    #[tokio::test]
    async fn test_watermark_stays_when_nothing_observed() {
        let xrpl = Arc::new(ScriptedXrpl::new(vec![Ok(page(vec![], None, true))]));
        let mut scanner = LedgerScanner::new(xrpl.clone(), "rBridge", 100);

        assert!(scanner.scan().await.unwrap().is_empty());
        assert_eq!(scanner.watermark(), 100);

        // next scan resumes from the same watermark
        scanner.scan().await.unwrap();
        assert_eq!(xrpl.requests.lock().unwrap()[1].0, 100);
    }

    #[tokio::test]
    async fn test_discards_unvalidated_results() {
        let mut validated_entry = entry("B", 55);
        validated_entry.validated = Some(true);
        let mut unvalidated_entry = entry("C", 60);
        unvalidated_entry.validated = Some(false);

        let xrpl = Arc::new(ScriptedXrpl::new(vec![
            Ok(page(vec![entry("A", 50)], None, false)),
            Ok(page(vec![unvalidated_entry, validated_entry], None, true)),
        ]));
        let mut scanner = LedgerScanner::new(xrpl, "rBridge", 40);

        assert!(scanner.scan().await.unwrap().is_empty());
        assert_eq!(scanner.watermark(), 40);

        let txs = scanner.scan().await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].hash, "B");
        assert_eq!(scanner.watermark(), 56);
    }

    #[tokio::test]
    async fn test_failed_page_keeps_watermark() {
        let xrpl = Arc::new(ScriptedXrpl::new(vec![
            Ok(page(
                vec![entry("B", 20)],
                Some(serde_json::json!("next")),
                true,
            )),
            Err(eyre!("connection reset")),
        ]));
        let mut scanner = LedgerScanner::new(xrpl, "rBridge", 5);

        assert!(scanner.scan().await.is_err());
        assert_eq!(scanner.watermark(), 5);
    }
}
