//! Bridge signer set and quorum aggregation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use eyre::{eyre, Result, WrapErr};
use tracing::{debug, warn};

use crate::contract_client::BridgeContract;
use crate::contracts::{Relayer, Signature};
use crate::xrpl::rpc::SignerList;
use crate::xrpl::{Signer, XrplApi};

/// Current signer list of the bridge account joined with the relayer registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeSigners {
    /// XRPL account → signer weight
    pub weights: HashMap<String, u32>,
    pub quorum: u32,
    /// XRPL account → public key (hex)
    pub pub_keys: HashMap<String, String>,
    /// Contract-chain relayer address → XRPL account
    pub contract_to_xrpl: HashMap<String, String>,
}

impl BridgeSigners {
    pub fn new(signer_list: &SignerList, relayers: &[Relayer]) -> Self {
        let weights = signer_list
            .signer_entries
            .iter()
            .map(|wrapper| {
                (
                    wrapper.signer_entry.account.clone(),
                    u32::from(wrapper.signer_entry.signer_weight),
                )
            })
            .collect();

        let mut pub_keys = HashMap::new();
        let mut contract_to_xrpl = HashMap::new();
        for relayer in relayers {
            pub_keys.insert(relayer.xrpl_address.clone(), relayer.xrpl_pub_key.clone());
            contract_to_xrpl.insert(relayer.cosmos_address.clone(), relayer.xrpl_address.clone());
        }

        Self {
            weights,
            quorum: signer_list.signer_quorum,
            pub_keys,
            contract_to_xrpl,
        }
    }

    /// XRPL signer entry and weight for a contract signature, if every lookup succeeds
    fn resolve(&self, signature: &Signature) -> Option<(Signer, u32)> {
        let relayer = &signature.relayer_cosmos_address;
        let Some(account) = self.contract_to_xrpl.get(relayer) else {
            warn!(relayer = %relayer, "Found unknown signer");
            return None;
        };
        let Some(pub_key) = self.pub_keys.get(account) else {
            warn!(xrpl_address = %account, "Found signer without public key in the contract");
            return None;
        };
        let Some(weight) = self.weights.get(account).copied() else {
            warn!(xrpl_address = %account, "Found signer without weight in the signer list");
            return None;
        };

        Some((
            Signer {
                account: account.clone(),
                signing_pub_key: pub_key.clone(),
                txn_signature: signature.signature.clone(),
            },
            weight,
        ))
    }
}

/// Result of walking an operation's signatures against the signer set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Quorum {
    /// Signers whose cumulative weight first met the quorum, in signature order
    Reached(Vec<Signer>),
    NotReached { weight: u32 },
}

/// Accumulate signatures in order until their weight meets the quorum.
///
/// Signatures from unknown relayers, or relayers missing a public key or a
/// weight, are skipped, and so is any further signature for an XRPL account
/// already selected. Stopping at the first sufficient prefix keeps the
/// signer count and therefore the fee minimal.
pub fn aggregate_quorum(signatures: &[Signature], signers: &BridgeSigners) -> Quorum {
    let mut selected = Vec::new();
    let mut seen = HashSet::new();
    let mut weight = 0u32;

    for signature in signatures {
        let Some((signer, signer_weight)) = signers.resolve(signature) else {
            continue;
        };
        if !seen.insert(signer.account.clone()) {
            debug!(xrpl_address = %signer.account, "Skipping repeated signature");
            continue;
        }
        selected.push(signer);
        weight = weight.saturating_add(signer_weight);
        if weight >= signers.quorum {
            return Quorum::Reached(selected);
        }
    }

    Quorum::NotReached { weight }
}

/// Loads [`BridgeSigners`] from XRPL and the contract
pub struct SignerSetResolver {
    xrpl: Arc<dyn XrplApi>,
    contract: Arc<dyn BridgeContract>,
    bridge_account: String,
}

impl SignerSetResolver {
    pub fn new(xrpl: Arc<dyn XrplApi>, contract: Arc<dyn BridgeContract>, bridge_account: &str) -> Self {
        Self {
            xrpl,
            contract,
            bridge_account: bridge_account.to_string(),
        }
    }

    /// The bridge account must own exactly one signer list
    pub async fn resolve(&self) -> Result<BridgeSigners> {
        let (signer_lists, config) = futures::try_join!(
            async {
                self.xrpl
                    .signer_lists(&self.bridge_account)
                    .await
                    .wrap_err("Failed to fetch bridge signer list")
            },
            async {
                self.contract
                    .config()
                    .await
                    .wrap_err("Failed to fetch contract config")
            },
        )?;

        let [signer_list] = signer_lists.as_slice() else {
            return Err(eyre!(
                "Bridge account {} has {} signer lists, expected exactly one",
                self.bridge_account,
                signer_lists.len()
            ));
        };

        let signers = BridgeSigners::new(signer_list, &config.relayers);
        debug!(
            quorum = signers.quorum,
            signers = signers.weights.len(),
            relayers = config.relayers.len(),
            "Resolved bridge signers"
        );
        Ok(signers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xrpl::rpc::SignerEntryWrapper;
    use crate::xrpl::SignerEntry;

    fn relayer(n: u8) -> Relayer {
        Relayer {
            cosmos_address: format!("orai1relayer{}", n),
            xrpl_address: format!("rRelayer{}", n),
            xrpl_pub_key: format!("02{:02X}", n),
        }
    }

    fn signer_list(accounts: &[(&str, u16)], quorum: u32) -> SignerList {
        SignerList {
            signer_quorum: quorum,
            signer_entries: accounts
                .iter()
                .map(|(account, weight)| SignerEntryWrapper {
                    signer_entry: SignerEntry {
                        account: account.to_string(),
                        signer_weight: *weight,
                    },
                })
                .collect(),
        }
    }

    fn signature(n: u8) -> Signature {
        Signature {
            relayer_cosmos_address: format!("orai1relayer{}", n),
            signature: format!("SIG{}", n),
        }
    }

    fn three_of_two() -> BridgeSigners {
        BridgeSigners::new(
            &signer_list(&[("rRelayer1", 1), ("rRelayer2", 1), ("rRelayer3", 1)], 2),
            &[relayer(1), relayer(2), relayer(3)],
        )
    }

    #[test]
    fn test_lookup_maps() {
        let signers = three_of_two();
        assert_eq!(signers.quorum, 2);
        assert_eq!(signers.weights["rRelayer2"], 1);
        assert_eq!(signers.pub_keys["rRelayer3"], "0203");
        assert_eq!(signers.contract_to_xrpl["orai1relayer1"], "rRelayer1");
    }

    #[test]
    fn test_quorum_not_reached() {
        let quorum = aggregate_quorum(&[signature(1)], &three_of_two());
        assert_eq!(quorum, Quorum::NotReached { weight: 1 });

        assert_eq!(
            aggregate_quorum(&[], &three_of_two()),
            Quorum::NotReached { weight: 0 }
        );
    }

    #[test]
    fn test_quorum_stops_at_first_sufficient_prefix() {
        let quorum = aggregate_quorum(&[signature(3), signature(1), signature(2)], &three_of_two());
        match quorum {
            Quorum::Reached(selected) => {
                let accounts: Vec<&str> = selected.iter().map(|s| s.account.as_str()).collect();
                assert_eq!(accounts, vec!["rRelayer3", "rRelayer1"]);
                assert_eq!(selected[0].txn_signature, "SIG3");
                assert_eq!(selected[0].signing_pub_key, "0203");
            }
            other => panic!("expected quorum, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_signers_are_skipped() {
        let mut signers = three_of_two();
        // registered in the contract but absent from the XRPL signer list
        signers
            .contract_to_xrpl
            .insert("orai1relayer9".to_string(), "rRelayer9".to_string());
        signers
            .pub_keys
            .insert("rRelayer9".to_string(), "0209".to_string());

        let stranger = Signature {
            relayer_cosmos_address: "orai1stranger".to_string(),
            signature: "SIGX".to_string(),
        };

        let quorum = aggregate_quorum(&[stranger.clone(), signature(9), signature(1)], &signers);
        assert_eq!(quorum, Quorum::NotReached { weight: 1 });

        let quorum = aggregate_quorum(&[stranger, signature(9), signature(1), signature(2)], &signers);
        assert!(matches!(quorum, Quorum::Reached(ref s) if s.len() == 2));
    }

    #[test]
    fn test_repeated_relayer_counts_once() {
        let signers = three_of_two();
        let mut repeated = signature(1);
        repeated.signature = "SIG1-AGAIN".to_string();

        let quorum = aggregate_quorum(&[signature(1), repeated.clone()], &signers);
        assert_eq!(quorum, Quorum::NotReached { weight: 1 });

        match aggregate_quorum(&[signature(1), repeated, signature(2)], &signers) {
            Quorum::Reached(selected) => {
                let accounts: Vec<&str> = selected.iter().map(|s| s.account.as_str()).collect();
                assert_eq!(accounts, vec!["rRelayer1", "rRelayer2"]);
                assert_eq!(selected[0].txn_signature, "SIG1");
            }
            other => panic!("expected quorum, got {:?}", other),
        }
    }

    #[test]
    fn test_weighted_quorum() {
        let signers = BridgeSigners::new(
            &signer_list(&[("rRelayer1", 3), ("rRelayer2", 1)], 3),
            &[relayer(1), relayer(2)],
        );
        let quorum = aggregate_quorum(&[signature(1), signature(2)], &signers);
        assert!(matches!(quorum, Quorum::Reached(ref s) if s.len() == 1));
    }
}
