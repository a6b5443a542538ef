//! XRP Ledger side of the bridge: binary codec, keys, JSON-RPC and scanning

pub mod address;
pub mod codec;
pub mod currency;
pub mod fee;
pub mod memo;
pub mod rpc;
pub mod scanner;
pub mod transaction;
pub mod wallet;

pub use rpc::{XrplApi, XrplRpcClient};
pub use scanner::{LedgerScanner, ScannedTransaction};
pub use transaction::{Amount, IssuedAmount, Signer, SignerEntry, Transaction, TransactionKind, TransactionType};
pub use wallet::Wallet;

/// Largest number of tickets a single allocation may request
pub const MAX_TICKETS_TO_ALLOCATE: u32 = 250;

/// Significant decimal digits of an issued-currency amount
pub const XRPL_ISSUED_DECIMALS: u32 = 15;

/// Engine result of a successfully applied transaction
pub const RESULT_SUCCESS: &str = "tesSUCCESS";
