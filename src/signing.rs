// Cryptographic signing module
// This file handles per-path key derivation and payload signing for
// software-custody wallets
//
// Numan Thabit 2025 Nov

use crate::errors::RelayError;
use base64::{engine::general_purpose::STANDARD_NO_PAD as B64, Engine as _};
use blake2::{Blake2b512, Digest};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

const INTENT_SCOPE_SIGN_DOC: u8 = 0x00;
const INTENT_VERSION: u8 = 0x00;
const INTENT_APP_ID: u8 = 0x00;
const ED25519_FLAG: u8 = 0x00;

/// Signature produced by a transport together with the signer's public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// `flag || signature || pubkey`
    #[serde(with = "hex_bytes")]
    pub serialized: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

impl Signature {
    pub fn to_b64(&self) -> String {
        B64.encode(&self.serialized)
    }
}

fn blake2b_256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b512::new();
    for part in parts {
        hasher.update(part);
    }
    let hash = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hash[..32]);
    digest
}

/// Derive the Ed25519 key for `path` from an account secret.
/// Key = Blake2b-256(secret || 0x00 || path).
pub fn derive_signing_key(secret: &[u8], path: &str) -> Result<SigningKey, RelayError> {
    if secret.is_empty() {
        return Err(RelayError::CustodyDataUnavailable("empty account secret".into()));
    }
    if path.is_empty() {
        return Err(RelayError::CustodyDataUnavailable("empty derivation path".into()));
    }
    let seed = Zeroizing::new(blake2b_256(&[secret, &[0u8], path.as_bytes()]));
    Ok(SigningKey::from_bytes(&seed))
}

/// Sign `payload` as an intent message: 3-byte intent header || payload,
/// hashed with Blake2b-256 and signed with Ed25519.
pub fn sign_payload(signing_key: &SigningKey, payload: &[u8]) -> Signature {
    let vk: VerifyingKey = signing_key.verifying_key();

    let mut intent = Vec::with_capacity(3 + payload.len());
    intent.push(INTENT_SCOPE_SIGN_DOC);
    intent.push(INTENT_VERSION);
    intent.push(INTENT_APP_ID);
    intent.extend_from_slice(payload);

    let digest = blake2b_256(&[&intent]);
    let sig_bytes: [u8; 64] = signing_key.sign(&digest).to_bytes();
    let pk_bytes: [u8; 32] = vk.to_bytes();

    let mut serialized = Vec::with_capacity(1 + 64 + 32);
    serialized.push(ED25519_FLAG);
    serialized.extend_from_slice(&sig_bytes);
    serialized.extend_from_slice(&pk_bytes);

    Signature {
        serialized,
        public_key: pk_bytes.to_vec(),
    }
}

/// Check a serialized signature against the payload it claims to cover.
pub fn verify_payload(signature: &Signature, payload: &[u8]) -> bool {
    if signature.serialized.len() != 1 + 64 + 32 || signature.serialized[0] != ED25519_FLAG {
        return false;
    }
    let Ok(pk) = <[u8; 32]>::try_from(&signature.serialized[65..]) else {
        return false;
    };
    let Ok(vk) = VerifyingKey::from_bytes(&pk) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(&signature.serialized[1..65]) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);

    let mut intent = Vec::with_capacity(3 + payload.len());
    intent.extend_from_slice(&[INTENT_SCOPE_SIGN_DOC, INTENT_VERSION, INTENT_APP_ID]);
    intent.extend_from_slice(payload);
    let digest = blake2b_256(&[&intent]);
    vk.verify_strict(&digest, &sig).is_ok()
}

/// Fingerprint of a PIN bound to an account group.
pub fn pin_fingerprint(account_id: &str, pin: &str) -> [u8; 32] {
    blake2b_256(&[account_id.as_bytes(), &[0u8], pin.as_bytes()])
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        hex::decode(raw.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_keys_depend_on_path() {
        let secret = [7u8; 32];
        let a = derive_signing_key(&secret, "m/44'/60'/0'/0/0").unwrap();
        let b = derive_signing_key(&secret, "m/44'/60'/0'/0/1").unwrap();
        let a2 = derive_signing_key(&secret, "m/44'/60'/0'/0/0").unwrap();
        assert_ne!(a.verifying_key(), b.verifying_key());
        assert_eq!(a.verifying_key(), a2.verifying_key());
    }

    #[test]
    fn empty_inputs_are_custody_errors() {
        assert!(matches!(
            derive_signing_key(&[], "m/0"),
            Err(RelayError::CustodyDataUnavailable(_))
        ));
        assert!(matches!(
            derive_signing_key(&[1], ""),
            Err(RelayError::CustodyDataUnavailable(_))
        ));
    }

    #[test]
    fn signatures_verify_against_their_payload_only() {
        let key = derive_signing_key(&[3u8; 16], "m/0").unwrap();
        let sig = sign_payload(&key, b"sign doc");
        assert_eq!(sig.serialized.len(), 97);
        assert_eq!(sig.serialized[0], ED25519_FLAG);
        assert!(verify_payload(&sig, b"sign doc"));
        assert!(!verify_payload(&sig, b"other doc"));
    }

    #[test]
    fn signature_serializes_as_hex() {
        let key = derive_signing_key(&[3u8; 16], "m/0").unwrap();
        let sig = sign_payload(&key, b"x");
        let json = serde_json::to_value(&sig).unwrap();
        assert_eq!(json["public_key"], hex::encode(&sig.public_key));
        let back: Signature = serde_json::from_value(json).unwrap();
        assert_eq!(back, sig);
    }
}
