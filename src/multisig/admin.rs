//! Owner-management payloads
//!
//! The gateway has no direct setters. Changing owners or the threshold is a
//! regular approved request whose target is the gateway's own address and
//! whose payload is a JSON-encoded [`AdminCall`].

use crate::crypto::Address;
use crate::invoke::InvocationError;
use crate::multisig::owners::{MultisigError, OwnerSet};
use serde::{Deserialize, Serialize};

/// A change to the gateway's own configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum AdminCall {
    AddOwner { owner: Address, threshold: usize },
    RemoveOwner { owner: Address, threshold: usize },
    SwapOwner { old_owner: Address, new_owner: Address },
    ChangeThreshold { threshold: usize },
}

impl AdminCall {
    /// Encode as a request payload
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, InvocationError> {
        serde_json::from_slice(payload)
            .map_err(|e| InvocationError::MalformedPayload(format!("admin call: {}", e)))
    }

    /// Apply to an owner set. On error the set is left as it was.
    pub fn apply(&self, owners: &mut OwnerSet) -> Result<(), MultisigError> {
        match self {
            AdminCall::AddOwner { owner, threshold } => owners.add_owner(*owner, *threshold),
            AdminCall::RemoveOwner { owner, threshold } => owners.remove_owner(owner, *threshold),
            AdminCall::SwapOwner {
                old_owner,
                new_owner,
            } => owners.swap_owner(old_owner, *new_owner),
            AdminCall::ChangeThreshold { threshold } => owners.change_threshold(*threshold),
        }
    }
}
