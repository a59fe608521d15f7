//! Multisig-Gateway: a threshold-authorization gateway in Rust
//!
//! This crate provides an M-of-N approval gateway featuring:
//! - Owner registry with validated thresholds
//! - Domain-separated request hashing bound to a nonce
//! - Approval ledger counting only current owners
//! - All-or-nothing execution with replay protection
//! - Owner management through the approval pipeline itself
//! - Role-gated managed tokens as a downstream target
//! - JSON persistence with backups, a CLI and a REST API
//!
//! # Example
//!
//! ```rust
//! use multisig_gateway::crypto::Address;
//! use multisig_gateway::multisig::{GatewayConfig, InvocationDescriptor, MultiSig};
//! use multisig_gateway::token::{TokenCall, TokenManager};
//!
//! let owners = vec![Address::derive(b"alice"), Address::derive(b"bob")];
//! let mut gateway = MultiSig::new(GatewayConfig::new(owners.clone(), 2)).unwrap();
//!
//! // The gateway administers a token
//! let mut tokens = TokenManager::new();
//! let token = tokens
//!     .deploy("Gold".into(), "XAU".into(), 6, &owners[0], gateway.address(), gateway.address())
//!     .unwrap();
//!
//! // Both owners approve a mint
//! let payload = TokenCall::Mint { to: owners[0], amount: 100 }.encode().unwrap();
//! let call = InvocationDescriptor::call(token, payload);
//! let hash = gateway.compute_hash(&call, gateway.nonce());
//! for owner in &owners {
//!     gateway.approve(*owner, &call, 0, hash).unwrap();
//! }
//!
//! // Anyone can execute
//! let receipt = gateway.execute(Address::derive(b"relayer"), &call, &mut tokens).unwrap();
//! assert_eq!(receipt.nonce, 0);
//! assert_eq!(tokens.balance_of(&token, &owners[0]).unwrap(), 100);
//! ```

pub mod api;
pub mod cli;
pub mod crypto;
pub mod invoke;
pub mod multisig;
pub mod storage;
pub mod token;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use crypto::{Address, Hash256, KeyPair};
pub use invoke::{CallMode, CallRequest, InvocationError, Invoker, RefundRequest};
pub use multisig::{
    AdminCall, ExecutionReceipt, GatewayConfig, InvocationDescriptor, MultiSig, MultisigError,
    RefundOutcome, RefundParams,
};
pub use storage::{Storage, StorageConfig};
pub use token::{ManagedToken, TokenCall, TokenManager};
