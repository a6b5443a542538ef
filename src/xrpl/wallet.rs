//! XRPL wallet: secp256k1 keys derived from a family seed
//!
//! The relayer only ever multisigns, so the wallet exposes the signing
//! primitive for multisignatures and the identity fields the contract
//! registry knows the relayer by.

use eyre::{eyre, Result, WrapErr};
use k256::ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;

use super::address::{
    account_id_from_public_key, decode_seed, encode_account_id, sha512_half, AccountId,
};
use super::codec;
use super::transaction::{Signer, Transaction};

pub struct Wallet {
    signing_key: SigningKey,
    /// Compressed public key, uppercase hex
    public_key: String,
    account_id: AccountId,
    /// Classic address
    pub address: String,
}

impl Wallet {
    /// Derive the account keypair of a secp256k1 family seed
    pub fn from_seed(seed: &str) -> Result<Self> {
        let entropy = decode_seed(seed).wrap_err("Invalid XRPL seed")?;

        let root = derive_secret(&entropy, None)?;
        let root_public = root.public_key().to_encoded_point(true);
        let intermediate = derive_secret(root_public.as_bytes(), Some(0))?;

        let scalar = *root.to_nonzero_scalar() + *intermediate.to_nonzero_scalar();
        let signing_key = SigningKey::from_bytes(&scalar.to_bytes())
            .map_err(|e| eyre!("Failed to derive XRPL signing key: {}", e))?;

        let public_key = signing_key.verifying_key().to_encoded_point(true);
        let account_id = account_id_from_public_key(public_key.as_bytes());

        Ok(Self {
            signing_key,
            public_key: hex::encode_upper(public_key.as_bytes()),
            account_id,
            address: encode_account_id(&account_id),
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// Produce this wallet's multisignature over a transaction
    pub fn multisign(&self, tx: &Transaction) -> Result<Signer> {
        let data = codec::encode_for_multisigning(tx, &self.account_id)
            .wrap_err("Failed to encode transaction for multisigning")?;
        let signature = self.sign_digest(&sha512_half(&data))?;

        Ok(Signer {
            account: self.address.clone(),
            signing_pub_key: self.public_key.clone(),
            txn_signature: signature,
        })
    }

    /// DER-encoded low-S signature over a 32-byte digest, uppercase hex
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<String> {
        let signature: Signature = self
            .signing_key
            .sign_prehash(digest)
            .map_err(|e| eyre!("Failed to sign digest: {}", e))?;
        let signature = signature.normalize_s().unwrap_or(signature);
        Ok(hex::encode_upper(signature.to_der().as_bytes()))
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("public_key", &self.public_key)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

/// First SHA-512Half of `data || [discriminator] || counter` that is a valid secret key
fn derive_secret(data: &[u8], discriminator: Option<u32>) -> Result<SecretKey> {
    for counter in 0..=u32::MAX {
        let mut buf = Vec::with_capacity(data.len() + 8);
        buf.extend_from_slice(data);
        if let Some(discriminator) = discriminator {
            buf.extend_from_slice(&discriminator.to_be_bytes());
        }
        buf.extend_from_slice(&counter.to_be_bytes());

        if let Ok(secret) = SecretKey::from_slice(&sha512_half(&buf)) {
            return Ok(secret);
        }
    }
    Err(eyre!("Seed does not yield a valid secp256k1 key"))
}
