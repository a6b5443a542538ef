//! XRPL classic address and family seed encoding
//!
//! Classic addresses and seeds are base58 (Ripple alphabet) encodings of
//! `version || payload || checksum`, where the checksum is the first four
//! bytes of a double SHA-256 over `version || payload`.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

/// Version byte of a classic account address
const ACCOUNT_ID_VERSION: u8 = 0x00;

/// Version byte of a secp256k1 family seed
const FAMILY_SEED_VERSION: u8 = 0x21;

/// The account that is used as the issuer of native XRP
pub const XRP_ISSUER: &str = "rrrrrrrrrrrrrrrrrrrrrhoLvTp";

/// 20-byte XRPL account identifier
pub type AccountId = [u8; 20];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58 encoding: {0}")]
    Base58(String),

    #[error("checksum mismatch")]
    Checksum,

    #[error("unexpected version byte {0:#04x}")]
    Version(u8),

    #[error("unexpected payload length {0}")]
    Length(usize),
}

/// SHA-256 digest
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// First half of a SHA-512 digest, the hash XRPL uses for signing and ids
pub fn sha512_half(data: &[u8]) -> [u8; 32] {
    let digest = Sha512::digest(data);
    let mut half = [0u8; 32];
    half.copy_from_slice(&digest[..32]);
    half
}

/// Account ID of a compressed secp256k1 public key: RIPEMD160(SHA256(key))
pub fn account_id_from_public_key(public_key: &[u8]) -> AccountId {
    let sha = sha256(public_key);
    Ripemd160::digest(sha).into()
}

pub fn encode_account_id(account_id: &AccountId) -> String {
    encode_checked(ACCOUNT_ID_VERSION, account_id)
}

pub fn decode_account_id(address: &str) -> Result<AccountId, AddressError> {
    let payload = decode_checked(ACCOUNT_ID_VERSION, address)?;
    payload
        .as_slice()
        .try_into()
        .map_err(|_| AddressError::Length(payload.len()))
}

/// Whether the string is a well-formed classic address
pub fn is_valid_classic_address(address: &str) -> bool {
    decode_account_id(address).is_ok()
}

pub fn encode_seed(entropy: &[u8; 16]) -> String {
    encode_checked(FAMILY_SEED_VERSION, entropy)
}

/// Decode an `s...` family seed into its 16 bytes of entropy
pub fn decode_seed(seed: &str) -> Result<[u8; 16], AddressError> {
    let payload = decode_checked(FAMILY_SEED_VERSION, seed)?;
    payload
        .as_slice()
        .try_into()
        .map_err(|_| AddressError::Length(payload.len()))
}

fn checksum(data: &[u8]) -> [u8; 4] {
    let hash = sha256(&sha256(data));
    [hash[0], hash[1], hash[2], hash[3]]
}

fn encode_checked(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(payload.len() + 5);
    data.push(version);
    data.extend_from_slice(payload);
    let check = checksum(&data);
    data.extend_from_slice(&check);
    bs58::encode(data)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_string()
}

fn decode_checked(version: u8, encoded: &str) -> Result<Vec<u8>, AddressError> {
    let data = bs58::decode(encoded)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_vec()
        .map_err(|e| AddressError::Base58(e.to_string()))?;

    if data.len() < 5 {
        return Err(AddressError::Length(data.len()));
    }

    let (body, check) = data.split_at(data.len() - 4);
    if checksum(body) != check {
        return Err(AddressError::Checksum);
    }
    if body[0] != version {
        return Err(AddressError::Version(body[0]));
    }

    Ok(body[1..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xrp_issuer_is_zero_account() {
        assert_eq!(decode_account_id(XRP_ISSUER).unwrap(), [0u8; 20]);
        assert_eq!(encode_account_id(&[0u8; 20]), XRP_ISSUER);
    }

    #[test]
    fn test_account_id_from_genesis_public_key() {
        let public_key =
            hex::decode("0330E7FC9D56BB25D6893BA3F317AE5BCF33B3291BD63DB32654A313222F7FD020")
                .unwrap();
        let account_id = account_id_from_public_key(&public_key);
        assert_eq!(
            encode_account_id(&account_id),
            "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh"
        );
    }

    #[test]
    fn test_seed_roundtrip() {
        let entropy = decode_seed("snoPBrXtMeMyMHUVTgbuqAfg1SUTb").unwrap();
        assert_eq!(encode_seed(&entropy), "snoPBrXtMeMyMHUVTgbuqAfg1SUTb");
    }

    #[test]
    fn test_rejects_corrupted_address() {
        assert_eq!(
            decode_account_id("rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTi"),
            Err(AddressError::Checksum)
        );
        assert!(!is_valid_classic_address("not-an-address"));
        assert!(is_valid_classic_address("rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh"));
    }

    #[test]
    fn test_seed_is_not_an_address() {
        assert!(matches!(
            decode_account_id("snoPBrXtMeMyMHUVTgbuqAfg1SUTb"),
            Err(AddressError::Version(0x21)) | Err(AddressError::Length(_))
        ));
    }
}
