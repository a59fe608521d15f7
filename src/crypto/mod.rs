//! Cryptographic utilities for the gateway
//!
//! This module provides:
//! - SHA-256 hashing and the [`Hash256`] digest type
//! - 20-byte principal [`Address`]es
//! - secp256k1 key pairs, request-hash signing and verification

pub mod address;
pub mod hash;
pub mod keys;

pub use address::{Address, AddressError};
pub use hash::{sha256, Hash256, HashParseError};
pub use keys::{
    public_key_from_hex, public_key_to_address, sign_hash, verify_signature, KeyError, KeyPair,
};
