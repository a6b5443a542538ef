//! XRPL binary serialization for the bridge transaction types
//!
//! Implements the subset of the canonical binary format needed to produce
//! multisigning payloads and submittable blobs: field headers, canonical
//! field ordering, variable-length prefixes, amounts, account IDs and
//! the Signers / SignerEntries arrays.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use thiserror::Error;

use super::address::{decode_account_id, sha512_half, AccountId, AddressError};
use super::transaction::{Amount, IssuedAmount, Signer, Transaction, TransactionKind};

/// Prefix of the data a multisigner signs ("SMT\0")
const MULTISIGN_PREFIX: [u8; 4] = [0x53, 0x4D, 0x54, 0x00];

/// Prefix of the data hashed into a transaction id ("TXN\0")
const TRANSACTION_ID_PREFIX: [u8; 4] = [0x54, 0x58, 0x4E, 0x00];

const OBJECT_END: u8 = 0xE1;
const ARRAY_END: u8 = 0xF1;

/// Largest amount of drops that can exist (100 billion XRP)
const MAX_DROPS: u64 = 100_000_000_000_000_000;

const NATIVE_POSITIVE: u64 = 0x4000_0000_0000_0000;
const ISSUED_BIT: u64 = 0x8000_0000_0000_0000;
const ISSUED_POSITIVE: u64 = 0x4000_0000_0000_0000;
const MIN_MANTISSA: u64 = 1_000_000_000_000_000;
const MIN_EXPONENT: i64 = -96;
const MAX_EXPONENT: i64 = 80;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid account {account}: {source}")]
    Account {
        account: String,
        source: AddressError,
    },

    #[error("invalid amount: {0}")]
    Amount(String),

    #[error("amount {0} has more than 16 significant digits")]
    Precision(String),

    #[error("amount {0} is out of the representable exponent range")]
    Exponent(String),

    #[error("invalid currency code: {0}")]
    Currency(String),

    #[error("invalid hex in {field}: {value}")]
    Hex { field: &'static str, value: String },

    #[error("variable length field too long: {0} bytes")]
    Length(usize),
}

/// (type code, field code) pair identifying a serialized field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FieldId {
    type_code: u8,
    field_code: u8,
}

impl FieldId {
    const fn new(type_code: u8, field_code: u8) -> Self {
        Self {
            type_code,
            field_code,
        }
    }

    /// Signatures and the signer array are never part of signed data
    fn is_signing_field(&self) -> bool {
        *self != fields::TXN_SIGNATURE && *self != fields::SIGNERS
    }

    fn write_header(&self, out: &mut Vec<u8>) {
        let (t, f) = (self.type_code, self.field_code);
        match (t < 16, f < 16) {
            (true, true) => out.push((t << 4) | f),
            (true, false) => {
                out.push(t << 4);
                out.push(f);
            }
            (false, true) => {
                out.push(f);
                out.push(t);
            }
            (false, false) => {
                out.push(0);
                out.push(t);
                out.push(f);
            }
        }
    }
}

pub mod fields {
    use super::FieldId;

    pub const TRANSACTION_TYPE: FieldId = FieldId::new(1, 2);
    pub const SIGNER_WEIGHT: FieldId = FieldId::new(1, 3);
    pub const FLAGS: FieldId = FieldId::new(2, 2);
    pub const SEQUENCE: FieldId = FieldId::new(2, 4);
    pub const SIGNER_QUORUM: FieldId = FieldId::new(2, 35);
    pub const TICKET_COUNT: FieldId = FieldId::new(2, 40);
    pub const TICKET_SEQUENCE: FieldId = FieldId::new(2, 41);
    pub const AMOUNT: FieldId = FieldId::new(6, 1);
    pub const LIMIT_AMOUNT: FieldId = FieldId::new(6, 3);
    pub const FEE: FieldId = FieldId::new(6, 8);
    pub const SEND_MAX: FieldId = FieldId::new(6, 9);
    pub const SIGNING_PUB_KEY: FieldId = FieldId::new(7, 3);
    pub const TXN_SIGNATURE: FieldId = FieldId::new(7, 4);
    pub const ACCOUNT: FieldId = FieldId::new(8, 1);
    pub const DESTINATION: FieldId = FieldId::new(8, 3);
    pub const SIGNER_ENTRY: FieldId = FieldId::new(14, 11);
    pub const SIGNER: FieldId = FieldId::new(14, 16);
    pub const SIGNERS: FieldId = FieldId::new(15, 3);
    pub const SIGNER_ENTRIES: FieldId = FieldId::new(15, 4);
}

#[derive(Debug, Clone)]
enum FieldValue {
    UInt16(u16),
    UInt32(u32),
    Amount(Vec<u8>),
    Blob(Vec<u8>),
    Account(AccountId),
    Object(Vec<(FieldId, FieldValue)>),
    Array(Vec<(FieldId, FieldValue)>),
}

/// Serialize a transaction with all of its fields, ready for `submit`
pub fn encode(tx: &Transaction) -> Result<Vec<u8>, CodecError> {
    let fields = transaction_fields(tx)?;
    let mut out = Vec::with_capacity(256);
    write_fields(&fields, false, &mut out)?;
    Ok(out)
}

/// Bytes a multisigner signs: prefix, signing fields and the signer's account ID
pub fn encode_for_multisigning(tx: &Transaction, signer: &AccountId) -> Result<Vec<u8>, CodecError> {
    let fields = transaction_fields(tx)?;
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(&MULTISIGN_PREFIX);
    write_fields(&fields, true, &mut out)?;
    out.extend_from_slice(signer);
    Ok(out)
}

/// Uppercase hex transaction id of a serialized transaction
pub fn transaction_hash(blob: &[u8]) -> String {
    let mut data = Vec::with_capacity(blob.len() + 4);
    data.extend_from_slice(&TRANSACTION_ID_PREFIX);
    data.extend_from_slice(blob);
    hex::encode_upper(sha512_half(&data))
}

/// Serialized form of an amount (8 bytes native, 48 bytes issued)
pub fn encode_amount(amount: &Amount) -> Result<Vec<u8>, CodecError> {
    match amount {
        Amount::Drops(drops) => Ok(encode_drops(drops)?.to_vec()),
        Amount::Issued(issued) => encode_issued(issued),
    }
}

/// 160-bit currency code for a 3-character ISO-like code or 40 hex chars
pub fn encode_currency(code: &str) -> Result<[u8; 20], CodecError> {
    let mut out = [0u8; 20];
    if code.len() == 3 && code.is_ascii() && code != "XRP" {
        out[12..15].copy_from_slice(code.as_bytes());
        return Ok(out);
    }
    if code.len() == 40 {
        let raw = hex::decode(code).map_err(|_| CodecError::Currency(code.to_string()))?;
        out.copy_from_slice(&raw);
        return Ok(out);
    }
    Err(CodecError::Currency(code.to_string()))
}

fn encode_drops(drops: &str) -> Result<[u8; 8], CodecError> {
    let value: u64 = drops
        .parse()
        .map_err(|_| CodecError::Amount(drops.to_string()))?;
    if value > MAX_DROPS {
        return Err(CodecError::Amount(drops.to_string()));
    }
    Ok((NATIVE_POSITIVE | value).to_be_bytes())
}

fn encode_issued(amount: &IssuedAmount) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(48);
    out.extend_from_slice(&issued_value_bits(&amount.value)?.to_be_bytes());
    out.extend_from_slice(&encode_currency(&amount.currency)?);
    out.extend_from_slice(&parse_account(&amount.issuer)?);
    Ok(out)
}

/// Mantissa/exponent encoding of an issued currency value
fn issued_value_bits(value: &str) -> Result<u64, CodecError> {
    let decimal =
        BigDecimal::from_str(value).map_err(|_| CodecError::Amount(value.to_string()))?;
    let zero = BigDecimal::from(0);
    if decimal == zero {
        return Ok(ISSUED_BIT);
    }
    let positive = decimal > zero;

    let (digits, scale) = decimal.abs().normalized().as_bigint_and_exponent();
    let digits = digits.to_string();
    if digits.len() > 16 {
        return Err(CodecError::Precision(value.to_string()));
    }

    let mut mantissa: u64 = digits
        .parse()
        .map_err(|_| CodecError::Amount(value.to_string()))?;
    let mut exponent = -scale;
    while mantissa < MIN_MANTISSA {
        mantissa *= 10;
        exponent -= 1;
    }
    if !(MIN_EXPONENT..=MAX_EXPONENT).contains(&exponent) {
        return Err(CodecError::Exponent(value.to_string()));
    }

    let mut bits = ISSUED_BIT | mantissa | (((exponent + 97) as u64) << 54);
    if positive {
        bits |= ISSUED_POSITIVE;
    }
    Ok(bits)
}

fn parse_account(account: &str) -> Result<AccountId, CodecError> {
    decode_account_id(account).map_err(|source| CodecError::Account {
        account: account.to_string(),
        source,
    })
}

fn parse_hex(field: &'static str, value: &str) -> Result<Vec<u8>, CodecError> {
    hex::decode(value).map_err(|_| CodecError::Hex {
        field,
        value: value.to_string(),
    })
}

fn transaction_fields(tx: &Transaction) -> Result<Vec<(FieldId, FieldValue)>, CodecError> {
    let mut out = vec![
        (
            fields::TRANSACTION_TYPE,
            FieldValue::UInt16(tx.transaction_type().code()),
        ),
        (fields::FLAGS, FieldValue::UInt32(tx.flags)),
        (fields::SEQUENCE, FieldValue::UInt32(tx.sequence)),
        (
            fields::FEE,
            FieldValue::Amount(encode_drops(&tx.fee)?.to_vec()),
        ),
        (
            fields::SIGNING_PUB_KEY,
            FieldValue::Blob(parse_hex("SigningPubKey", &tx.signing_pub_key)?),
        ),
        (fields::ACCOUNT, FieldValue::Account(parse_account(&tx.account)?)),
    ];

    if let Some(ticket) = tx.ticket_sequence {
        out.push((fields::TICKET_SEQUENCE, FieldValue::UInt32(ticket)));
    }

    match &tx.kind {
        TransactionKind::TicketCreate { ticket_count } => {
            out.push((fields::TICKET_COUNT, FieldValue::UInt32(*ticket_count)));
        }
        TransactionKind::TrustSet { limit_amount } => {
            out.push((
                fields::LIMIT_AMOUNT,
                FieldValue::Amount(encode_issued(limit_amount)?),
            ));
        }
        TransactionKind::Payment {
            destination,
            amount,
            send_max,
        } => {
            out.push((
                fields::DESTINATION,
                FieldValue::Account(parse_account(destination)?),
            ));
            out.push((fields::AMOUNT, FieldValue::Amount(encode_amount(amount)?)));
            if let Some(send_max) = send_max {
                out.push((fields::SEND_MAX, FieldValue::Amount(encode_amount(send_max)?)));
            }
        }
        TransactionKind::SignerListSet {
            signer_quorum,
            signer_entries,
        } => {
            out.push((fields::SIGNER_QUORUM, FieldValue::UInt32(*signer_quorum)));
            let mut entries = Vec::with_capacity(signer_entries.len());
            for entry in signer_entries {
                entries.push((
                    fields::SIGNER_ENTRY,
                    FieldValue::Object(vec![
                        (fields::ACCOUNT, FieldValue::Account(parse_account(&entry.account)?)),
                        (fields::SIGNER_WEIGHT, FieldValue::UInt16(entry.signer_weight)),
                    ]),
                ));
            }
            out.push((fields::SIGNER_ENTRIES, FieldValue::Array(entries)));
        }
    }

    if !tx.signers.is_empty() {
        out.push((fields::SIGNERS, signers_array(&tx.signers)?));
    }

    Ok(out)
}

/// The ledger only accepts signers ordered by numeric account ID
fn signers_array(signers: &[Signer]) -> Result<FieldValue, CodecError> {
    let mut decoded = Vec::with_capacity(signers.len());
    for signer in signers {
        decoded.push((parse_account(&signer.account)?, signer));
    }
    decoded.sort_by(|a, b| a.0.cmp(&b.0));

    let mut items = Vec::with_capacity(decoded.len());
    for (account_id, signer) in decoded {
        items.push((
            fields::SIGNER,
            FieldValue::Object(vec![
                (fields::ACCOUNT, FieldValue::Account(account_id)),
                (
                    fields::SIGNING_PUB_KEY,
                    FieldValue::Blob(parse_hex("SigningPubKey", &signer.signing_pub_key)?),
                ),
                (
                    fields::TXN_SIGNATURE,
                    FieldValue::Blob(parse_hex("TxnSignature", &signer.txn_signature)?),
                ),
            ]),
        ));
    }
    Ok(FieldValue::Array(items))
}

fn write_fields(
    fields: &[(FieldId, FieldValue)],
    signing: bool,
    out: &mut Vec<u8>,
) -> Result<(), CodecError> {
    let mut sorted: Vec<&(FieldId, FieldValue)> = fields
        .iter()
        .filter(|(id, _)| !signing || id.is_signing_field())
        .collect();
    sorted.sort_by_key(|(id, _)| *id);

    for (id, value) in sorted {
        id.write_header(out);
        write_value(value, signing, out)?;
    }
    Ok(())
}

fn write_value(value: &FieldValue, signing: bool, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match value {
        FieldValue::UInt16(v) => out.extend_from_slice(&v.to_be_bytes()),
        FieldValue::UInt32(v) => out.extend_from_slice(&v.to_be_bytes()),
        FieldValue::Amount(bytes) => out.extend_from_slice(bytes),
        FieldValue::Blob(bytes) => {
            write_length_prefix(bytes.len(), out)?;
            out.extend_from_slice(bytes);
        }
        FieldValue::Account(account_id) => {
            out.push(20);
            out.extend_from_slice(account_id);
        }
        FieldValue::Object(inner) => {
            write_fields(inner, signing, out)?;
            out.push(OBJECT_END);
        }
        FieldValue::Array(items) => {
            for (id, item) in items {
                id.write_header(out);
                write_value(item, signing, out)?;
            }
            out.push(ARRAY_END);
        }
    }
    Ok(())
}

fn write_length_prefix(len: usize, out: &mut Vec<u8>) -> Result<(), CodecError> {
    if len <= 192 {
        out.push(len as u8);
    } else if len <= 12_480 {
        let rest = len - 193;
        out.push((193 + (rest >> 8)) as u8);
        out.push((rest & 0xff) as u8);
    } else if len <= 918_744 {
        let rest = len - 12_481;
        out.push((241 + (rest >> 16)) as u8);
        out.push(((rest >> 8) & 0xff) as u8);
        out.push((rest & 0xff) as u8);
    } else {
        return Err(CodecError::Length(len));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xrpl::transaction::SignerEntry;

    const BRIDGE: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";
    const ZERO_ACCOUNT: &str = "rrrrrrrrrrrrrrrrrrrrrhoLvTp";

    fn ticket_create(ticket: u32) -> Transaction {
        Transaction {
            account: BRIDGE.to_string(),
            kind: TransactionKind::TicketCreate { ticket_count: 3 },
            fee: "330".to_string(),
            flags: 0,
            sequence: 0,
            ticket_sequence: Some(ticket),
            signing_pub_key: String::new(),
            signers: vec![],
        }
    }

    #[test]
    fn test_field_headers() {
        let mut out = Vec::new();
        fields::TRANSACTION_TYPE.write_header(&mut out);
        fields::TICKET_SEQUENCE.write_header(&mut out);
        fields::SIGNER.write_header(&mut out);
        fields::SIGNERS.write_header(&mut out);
        fields::SIGNER_ENTRY.write_header(&mut out);
        assert_eq!(out, vec![0x12, 0x20, 0x29, 0xE0, 0x10, 0xF3, 0xEB]);
    }

    #[test]
    fn test_length_prefix() {
        let mut out = Vec::new();
        write_length_prefix(33, &mut out).unwrap();
        assert_eq!(out, vec![33]);

        let mut out = Vec::new();
        write_length_prefix(193, &mut out).unwrap();
        assert_eq!(out, vec![193, 0]);

        let mut out = Vec::new();
        write_length_prefix(12_480, &mut out).unwrap();
        assert_eq!(out, vec![240, 255]);
    }

    #[test]
    fn test_native_amount() {
        let bytes = encode_amount(&Amount::Drops("1000000".to_string())).unwrap();
        assert_eq!(hex::encode_upper(bytes), "40000000000F4240");
        assert!(encode_amount(&Amount::Drops("-1".to_string())).is_err());
        assert!(encode_amount(&Amount::Drops("100000000000000001".to_string())).is_err());
    }

    #[test]
    fn test_issued_value_encoding() {
        assert_eq!(issued_value_bits("1").unwrap(), 0xD483_8D7E_A4C6_8000);
        assert_eq!(issued_value_bits("0").unwrap(), 0x8000_0000_0000_0000);
        // sign bit cleared for negatives
        assert_eq!(issued_value_bits("-1").unwrap(), 0x9483_8D7E_A4C6_8000);
        assert_eq!(
            issued_value_bits("1.0").unwrap(),
            issued_value_bits("1").unwrap()
        );
        assert!(matches!(
            issued_value_bits("1.2345678901234567"),
            Err(CodecError::Precision(_))
        ));
        assert!(issued_value_bits("abc").is_err());
    }

    #[test]
    fn test_currency_code() {
        let usd = encode_currency("USD").unwrap();
        assert_eq!(
            hex::encode_upper(usd),
            "0000000000000000000000005553440000000000"
        );
        let raw = "0158415500000000C1F76FF6ECB0BAC600000000";
        assert_eq!(hex::encode_upper(encode_currency(raw).unwrap()), raw);
        assert!(encode_currency("XRP").is_err());
        assert!(encode_currency("TOOLONG").is_err());
    }

    #[test]
    fn test_ticket_create_layout() {
        let blob = encode(&ticket_create(7)).unwrap();
        let hex_blob = hex::encode_upper(&blob);

        // TransactionType, Flags, Sequence, TicketCount, TicketSequence
        assert!(hex_blob.starts_with("12000A"));
        assert!(hex_blob.contains("2200000000240000000020280000000320290000000768400000000000014A"));
        // empty SigningPubKey followed by the account
        assert!(hex_blob.contains("73008114"));
    }

    #[test]
    fn test_multisigning_payload() {
        let tx = ticket_create(7);
        let signer = decode_account_id(ZERO_ACCOUNT).unwrap();
        let data = encode_for_multisigning(&tx, &signer).unwrap();
        let blob = encode(&tx).unwrap();

        assert_eq!(&data[..4], &MULTISIGN_PREFIX);
        assert_eq!(&data[4..data.len() - 20], blob.as_slice());
        assert_eq!(&data[data.len() - 20..], &signer);
    }

    #[test]
    fn test_signers_excluded_from_signing_data_and_sorted_in_blob() {
        let mut tx = ticket_create(7);
        let unsigned = encode(&tx).unwrap();
        tx.signers = vec![
            Signer {
                account: BRIDGE.to_string(),
                signing_pub_key: "02".repeat(33),
                txn_signature: "3045".to_string(),
            },
            Signer {
                account: ZERO_ACCOUNT.to_string(),
                signing_pub_key: "03".repeat(33),
                txn_signature: "3044".to_string(),
            },
        ];

        let signer = decode_account_id(ZERO_ACCOUNT).unwrap();
        let with_signers = encode_for_multisigning(&tx, &signer).unwrap();
        assert_eq!(&with_signers[4..with_signers.len() - 20], unsigned.as_slice());

        let blob = encode(&tx).unwrap();
        assert_eq!(&blob[..unsigned.len()], unsigned.as_slice());
        let array = &blob[unsigned.len()..];
        assert_eq!(array[0], 0xF3);
        assert_eq!(&array[1..3], &[0xE0, 0x10]);
        // the zero account sorts first numerically, its object starts with SigningPubKey
        assert_eq!(&array[3..5], &[0x73, 0x21]);
        assert_eq!(array[5], 0x03);
        assert_eq!(*array.last().unwrap(), 0xF1);
    }

    #[test]
    fn test_signer_list_set_entries() {
        let tx = Transaction {
            account: BRIDGE.to_string(),
            kind: TransactionKind::SignerListSet {
                signer_quorum: 1,
                signer_entries: vec![SignerEntry {
                    account: ZERO_ACCOUNT.to_string(),
                    signer_weight: 1,
                }],
            },
            fee: "330".to_string(),
            flags: 0,
            sequence: 12,
            ticket_sequence: None,
            signing_pub_key: String::new(),
            signers: vec![],
        };
        let hex_blob = hex::encode_upper(encode(&tx).unwrap());
        assert!(hex_blob.starts_with("12000C"));
        assert!(hex_blob.contains("240000000C"));
        assert!(hex_blob.contains("202300000001"));
        assert!(hex_blob.ends_with(&format!("F4EB1300018114{}E1F1", "00".repeat(20))));
    }

    #[test]
    fn test_transaction_hash_is_uppercase_hex() {
        let hash = transaction_hash(&encode(&ticket_create(1)).unwrap());
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash.to_uppercase());
    }

    #[test]
    fn test_invalid_account_rejected() {
        let mut tx = ticket_create(1);
        tx.account = "not-an-account".to_string();
        assert!(matches!(encode(&tx), Err(CodecError::Account { .. })));
    }
}
