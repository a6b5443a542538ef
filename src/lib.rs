//! Oraichain ⇄ XRPL bridge relayer - library interface
//!
//! - **XRPL → contract**: scan the bridge account history and report
//!   incoming transfers and outgoing transaction results as evidence
//! - **Contract → XRPL**: sign pending operations and submit the
//!   multisigned transaction once the relayers reached quorum
//!
//! Modules are public for the binary and the integration tests.

pub mod api;
pub mod config;
pub mod contract_client;
pub mod contracts;
pub mod evidence;
pub mod metrics;
pub mod operations;
pub mod relay_loop;
pub mod retry;
pub mod serde_utils;
pub mod xrpl;
