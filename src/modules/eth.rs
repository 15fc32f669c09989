//! Ethereum platform adapter.
//!
//! Signatures are EIP-191 personal messages over secp256k1, encoded as the
//! 65-byte `r || s || v` hex string wallets produce. Addresses are rendered
//! with the EIP-55 mixed-case checksum and compared case-insensitively.

use elliptic_curve::sec1::ToEncodedPoint;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::PublicKey;
use once_cell::sync::Lazy;
use rand_core::OsRng;
use regex::Regex;

use crate::modules::crypto::keccak256;
use crate::modules::platform::{Platform, PlatformError};
use crate::modules::secure_keys::PrivateKey;

/// Mainnet platform identifier.
pub const ETH_PLATFORM: &str = "eth";

const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";
const SIGNATURE_LEN: usize = 65;
const ADDRESS_LEN: usize = 20;

static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap());
static SIGNATURE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{130}$").unwrap());
static PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(|\*|(\*\.)?[a-z0-9-]+(\.[a-z0-9-]+)*|0x[0-9a-fA-F]{40}(#[0-9a-fA-F]+)?)$")
        .unwrap()
});

/// Ethereum mainnet or a named test network.
#[derive(Debug, Clone)]
pub struct EthPlatform {
    name: String,
    compatible: Vec<String>,
}

impl EthPlatform {
    pub fn mainnet() -> Self {
        Self {
            name: ETH_PLATFORM.to_string(),
            compatible: Vec::new(),
        }
    }

    /// `eth:<network>`; trusts mainnet issuers.
    pub fn network(network: &str) -> Self {
        Self {
            name: format!("{ETH_PLATFORM}:{network}"),
            compatible: vec![ETH_PLATFORM.to_string()],
        }
    }

    fn signing_key(key: &PrivateKey) -> Result<SigningKey, PlatformError> {
        SigningKey::from_slice(key.expose()).map_err(|e| PlatformError::InvalidKey(e.to_string()))
    }
}

/// EIP-191 digest of a personal message.
pub fn hash_personal_message(message: &[u8]) -> [u8; 32] {
    let mut data = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 20 + message.len());
    data.extend_from_slice(PERSONAL_MESSAGE_PREFIX.as_bytes());
    data.extend_from_slice(message.len().to_string().as_bytes());
    data.extend_from_slice(message);
    keccak256(&data)
}

fn address_of(verifying_key: &VerifyingKey) -> [u8; ADDRESS_LEN] {
    let point = PublicKey::from(verifying_key).to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; ADDRESS_LEN];
    address.copy_from_slice(&hash[12..]);
    address
}

fn parse_address(address: &str) -> Option<[u8; ADDRESS_LEN]> {
    if !ADDRESS_RE.is_match(address) {
        return None;
    }
    let bytes = hex::decode(&address[2..]).ok()?;
    bytes.try_into().ok()
}

/// Address of the contract `sender` deploys at `nonce`:
/// `keccak256(rlp([sender, nonce]))[12..]`.
pub fn contract_address(sender: &[u8; ADDRESS_LEN], nonce: u64) -> [u8; ADDRESS_LEN] {
    let mut nonce_rlp = Vec::with_capacity(9);
    if nonce == 0 {
        nonce_rlp.push(0x80);
    } else {
        let be = nonce.to_be_bytes();
        let significant = &be[be.iter().position(|b| *b != 0).unwrap_or(be.len() - 1)..];
        if significant.len() == 1 && significant[0] < 0x80 {
            nonce_rlp.push(significant[0]);
        } else {
            nonce_rlp.push(0x80 + significant.len() as u8);
            nonce_rlp.extend_from_slice(significant);
        }
    }

    let payload_len = 1 + ADDRESS_LEN + nonce_rlp.len();
    let mut rlp = Vec::with_capacity(1 + payload_len);
    rlp.push(0xc0 + payload_len as u8);
    rlp.push(0x80 + ADDRESS_LEN as u8);
    rlp.extend_from_slice(sender);
    rlp.extend_from_slice(&nonce_rlp);

    let hash = keccak256(&rlp);
    let mut address = [0u8; ADDRESS_LEN];
    address.copy_from_slice(&hash[12..]);
    address
}

/// EIP-55 mixed-case checksum encoding.
pub fn to_checksum(address: &[u8; ADDRESS_LEN]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(2 + lower.len());
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> if i % 2 == 0 { 4 } else { 0 }) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn with_nonce(address: [u8; ADDRESS_LEN], nonce: Option<u64>) -> String {
    match nonce {
        Some(nonce) => to_checksum(&contract_address(&address, nonce)),
        None => to_checksum(&address),
    }
}

impl Platform for EthPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate_key(&self) -> Result<PrivateKey, PlatformError> {
        let signing_key = SigningKey::random(&mut OsRng);
        PrivateKey::from_bytes(signing_key.to_bytes().as_slice())
            .map_err(|e| PlatformError::InvalidKey(e.to_string()))
    }

    fn address(&self, key: &PrivateKey, nonce: Option<u64>) -> Result<String, PlatformError> {
        let signing_key = Self::signing_key(key)?;
        Ok(with_nonce(address_of(signing_key.verifying_key()), nonce))
    }

    fn sign(&self, key: &PrivateKey, message: &[u8]) -> Result<String, PlatformError> {
        let signing_key = Self::signing_key(key)?;
        let digest = hash_personal_message(message);
        let (signature, recovery_id) = signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| PlatformError::SigningFailed(e.to_string()))?;

        let mut bytes = Vec::with_capacity(SIGNATURE_LEN);
        bytes.extend_from_slice(&signature.to_bytes());
        bytes.push(27 + recovery_id.to_byte());
        Ok(format!("0x{}", hex::encode(bytes)))
    }

    fn recover(
        &self,
        signature: &str,
        message: &[u8],
        nonce: Option<u64>,
    ) -> Result<String, PlatformError> {
        if !self.is_valid_signature(signature) {
            return Err(PlatformError::InvalidSignature(format!(
                "expected 0x-prefixed {SIGNATURE_LEN}-byte hex"
            )));
        }
        let bytes = hex::decode(&signature[2..])
            .map_err(|e| PlatformError::InvalidSignature(e.to_string()))?;

        let v = bytes[SIGNATURE_LEN - 1];
        let recovery_byte = match v {
            27 | 28 => v - 27,
            0 | 1 => v,
            other => {
                return Err(PlatformError::InvalidSignature(format!(
                    "invalid recovery byte {other}"
                )))
            }
        };
        let recovery_id = RecoveryId::from_byte(recovery_byte)
            .ok_or_else(|| PlatformError::InvalidSignature("invalid recovery id".to_string()))?;
        let sig = Signature::from_slice(&bytes[..SIGNATURE_LEN - 1])
            .map_err(|e| PlatformError::InvalidSignature(e.to_string()))?;

        let digest = hash_personal_message(message);
        let verifying_key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
            .map_err(|e| PlatformError::RecoveryFailed(e.to_string()))?;

        Ok(with_nonce(address_of(&verifying_key), nonce))
    }

    fn addresses_equal(&self, a: &str, b: &str, nonce: Option<u64>) -> bool {
        let (Some(a), Some(b)) = (parse_address(a), parse_address(b)) else {
            return false;
        };
        if a == b {
            return true;
        }
        match nonce {
            Some(nonce) => contract_address(&a, nonce) == b || contract_address(&b, nonce) == a,
            None => false,
        }
    }

    fn compatible_platforms(&self) -> &[String] {
        &self.compatible
    }

    fn is_valid_address(&self, address: &str) -> bool {
        ADDRESS_RE.is_match(address)
    }

    fn is_valid_signature(&self, signature: &str) -> bool {
        SIGNATURE_RE.is_match(signature)
    }

    fn is_valid_path(&self, path_name: &str) -> bool {
        PATH_RE.is_match(path_name)
    }
}
