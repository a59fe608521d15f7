//! Downstream invocation boundary
//!
//! The gateway forwards approved calls to arbitrary targets through the
//! [`Invoker`] capability. The gateway never interprets payloads bound for
//! other targets; it only observes success (with return data) or failure.
//!
//! # Modes
//!
//! - [`CallMode::Direct`] runs the call in the target's own context: the
//!   target sees the gateway as the sender and mutates its own state.
//! - [`CallMode::ContextPreserving`] runs the target's logic in the gateway's
//!   context: the target sees the original trigger as the sender and the
//!   gateway as the executing identity. Targets that cannot run in a foreign
//!   context reject it with [`InvocationError::UnsupportedMode`].

use crate::crypto::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque bytes returned by a successful invocation
pub type ReturnData = Vec<u8>;

/// Execution context selector for a forwarded call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    #[default]
    Direct,
    ContextPreserving,
}

impl CallMode {
    /// Single-byte tag used in request hashing
    pub fn as_byte(&self) -> u8 {
        match self {
            CallMode::Direct => 0,
            CallMode::ContextPreserving => 1,
        }
    }
}

impl fmt::Display for CallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallMode::Direct => write!(f, "direct"),
            CallMode::ContextPreserving => write!(f, "context-preserving"),
        }
    }
}

impl std::str::FromStr for CallMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" | "call" => Ok(CallMode::Direct),
            "context-preserving" | "delegate" => Ok(CallMode::ContextPreserving),
            other => Err(format!("unknown call mode: {}", other)),
        }
    }
}

/// Failure reported by a downstream target
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("Unknown target: {0}")]
    UnknownTarget(Address),
    #[error("Call reverted: {0}")]
    Reverted(String),
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Target does not support {0} calls")]
    UnsupportedMode(CallMode),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// A call the gateway wants performed
#[derive(Debug, Clone, Copy)]
pub struct CallRequest<'a> {
    /// Principal that triggered the execution (not necessarily an owner)
    pub origin: Address,
    /// The gateway forwarding the call
    pub gateway: Address,
    pub target: Address,
    pub value: u128,
    pub payload: &'a [u8],
    pub mode: CallMode,
}

impl CallRequest<'_> {
    /// The sender the target observes
    pub fn sender(&self) -> Address {
        match self.mode {
            CallMode::Direct => self.gateway,
            CallMode::ContextPreserving => self.origin,
        }
    }

    /// Whose storage and identity the call executes under
    pub fn executing_as(&self) -> Address {
        match self.mode {
            CallMode::Direct => self.target,
            CallMode::ContextPreserving => self.gateway,
        }
    }
}

/// A best-effort refund requested after a successful execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub gateway: Address,
    /// `None` means the native asset
    pub asset: Option<Address>,
    pub recipient: Address,
    pub amount: u128,
}

/// Capability to perform calls against downstream targets.
///
/// Implementations must be all-or-nothing per call: a failed call must leave
/// the target as it was.
pub trait Invoker {
    fn invoke(&mut self, call: &CallRequest<'_>) -> Result<ReturnData, InvocationError>;

    /// Pay a refund on the gateway's behalf. Hosts without refund support
    /// keep the default.
    fn refund(&mut self, request: &RefundRequest) -> Result<(), InvocationError> {
        Err(InvocationError::Unsupported(format!(
            "refund of {} to {}",
            request.amount, request.recipient
        )))
    }
}
