//! Key management for owner identities
//!
//! Owners are identified by an [`Address`] derived from a secp256k1 public
//! key. Remote hosts authenticate an approval by an ECDSA signature over the
//! request hash, made with the key behind the owner's address.

use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::address::Address;
use super::hash::Hash256;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Get the public key as a hex string (compressed format)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// The principal address owned by this key
    pub fn address(&self) -> Address {
        public_key_to_address(&self.public_key)
    }

    /// Sign a request hash (64-byte compact signature)
    pub fn sign(&self, hash: &Hash256) -> Vec<u8> {
        sign_hash(&self.secret_key, hash)
    }
}

/// Sign a 32-byte digest with a secret key
pub fn sign_hash(secret_key: &SecretKey, hash: &Hash256) -> Vec<u8> {
    let secp = Secp256k1::new();
    let message = Message::from_digest(*hash.as_bytes());
    let signature = secp.sign_ecdsa(&message, secret_key);
    signature.serialize_compact().to_vec()
}

/// Verify a compact signature over a digest against a public key
pub fn verify_signature(
    public_key: &PublicKey,
    hash: &Hash256,
    signature: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest(*hash.as_bytes());
    let sig = Signature::from_compact(signature).map_err(|_| KeyError::InvalidSignature)?;

    match secp.verify_ecdsa(&message, &sig, public_key) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Convert a public key to a principal address: RIPEMD160(SHA256(pubkey))
pub fn public_key_to_address(public_key: &PublicKey) -> Address {
    Address::derive(&public_key.serialize())
}

/// Parse a public key from hex string
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pair_generation() {
        let kp = KeyPair::generate();
        assert_eq!(kp.private_key_hex().len(), 64);
        assert_eq!(kp.public_key_hex().len(), 66);
        assert!(!kp.address().is_zero());
    }

    #[test]
    fn test_key_pair_from_hex() {
        let kp1 = KeyPair::generate();
        let private_hex = kp1.private_key_hex();

        let kp2 = KeyPair::from_private_key_hex(&private_hex).unwrap();
        assert_eq!(kp1.public_key_hex(), kp2.public_key_hex());
        assert_eq!(kp1.address(), kp2.address());
    }

    #[test]
    fn test_public_key_round_trip_gives_same_address() {
        let kp = KeyPair::generate();
        let pk = public_key_from_hex(&kp.public_key_hex()).unwrap();
        assert_eq!(public_key_to_address(&pk), kp.address());
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate();
        let hash = Hash256::digest(b"request");

        let signature = kp.sign(&hash);
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(&kp.public_key, &hash, &signature).unwrap());

        // Wrong message
        let other = Hash256::digest(b"other request");
        assert!(!verify_signature(&kp.public_key, &other, &signature).unwrap());

        // Wrong key
        let stranger = KeyPair::generate();
        assert!(!verify_signature(&stranger.public_key, &hash, &signature).unwrap());

        // Malformed signature
        assert!(matches!(
            verify_signature(&kp.public_key, &hash, &[0u8; 10]),
            Err(KeyError::InvalidSignature)
        ));
    }

    #[test]
    fn test_invalid_private_key() {
        assert!(KeyPair::from_private_key_hex("not hex").is_err());
        assert!(KeyPair::from_private_key_hex("00").is_err());
    }
}
