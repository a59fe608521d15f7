//! Threshold-authorization gateway
//!
//! A gateway holds an M-of-N owner set. Any outbound call must first be
//! approved by M distinct current owners, each approving the request hash of
//! the exact call parameters at the current nonce. Owner management runs
//! through the same pipeline as a self-call.
//!
//! # Example
//!
//! ```ignore
//! use multisig_gateway::multisig::{GatewayConfig, InvocationDescriptor, MultiSig};
//!
//! // Create a 2-of-3 gateway
//! let mut gateway = MultiSig::new(GatewayConfig::new(vec![alice, bob, carol], 2))?;
//!
//! // Two owners approve the same request
//! let call = InvocationDescriptor::call(token, payload);
//! let hash = gateway.compute_hash(&call, gateway.nonce());
//! gateway.approve(alice, &call, gateway.nonce(), hash)?;
//! gateway.approve(bob, &call, gateway.nonce(), hash)?;
//!
//! // Anyone can now trigger it
//! let receipt = gateway.execute(relayer, &call, &mut token_manager)?;
//! ```

pub mod admin;
pub mod descriptor;
pub mod gateway;
pub mod ledger;
pub mod owners;

pub use admin::AdminCall;
pub use descriptor::{domain_separator, request_hash, InvocationDescriptor, RefundParams};
pub use gateway::{ExecutionReceipt, GatewayConfig, MultiSig, RefundOutcome, DEFAULT_CHAIN_ID};
pub use ledger::{ApprovalEntry, ApprovalLedger};
pub use owners::{MultisigError, OwnerSet};
