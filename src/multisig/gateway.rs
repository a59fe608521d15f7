//! Threshold approval and execution engine
//!
//! A [`MultiSig`] owns the owner registry, the nonce and the approval
//! ledger. Owners approve request hashes one by one; anyone may then ask the
//! gateway to execute a descriptor, which succeeds only if enough current
//! owners approved the hash of that descriptor at the current nonce.
//!
//! `execute` is all-or-nothing: the threshold check, the invocation, any
//! owner-set change and the nonce advance either all happen or none do.
//! Exclusive access (`&mut self`) makes each call indivisible; hosts that
//! share a gateway put it behind a single writer lock.

use crate::crypto::{Address, Hash256};
use crate::invoke::{CallRequest, InvocationError, Invoker, RefundRequest, ReturnData};
use crate::multisig::admin::AdminCall;
use crate::multisig::descriptor::{self, hex_bytes, InvocationDescriptor};
use crate::multisig::ledger::ApprovalLedger;
use crate::multisig::owners::{MultisigError, OwnerSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Network discriminator used when none is configured
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// Construction parameters for a gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub owners: Vec<Address>,
    pub threshold: usize,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Human-readable name, folded into the address
    #[serde(default)]
    pub label: Option<String>,
    /// Per-instance entropy; drawn at random when absent
    #[serde(default)]
    pub salt: Option<Hash256>,
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

impl GatewayConfig {
    pub fn new(owners: Vec<Address>, threshold: usize) -> Self {
        Self {
            owners,
            threshold,
            chain_id: DEFAULT_CHAIN_ID,
            label: None,
            salt: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Fix the salt, making the address reproducible
    pub fn with_salt(mut self, salt: Hash256) -> Self {
        self.salt = Some(salt);
        self
    }

    /// Address = RIPEMD160(SHA256(chain_id || label || threshold || sorted owners || salt))
    fn derive_address(&self, salt: &Hash256) -> Address {
        let mut sorted_owners = self.owners.clone();
        sorted_owners.sort();

        let label = self.label.as_deref().unwrap_or("");
        let mut data = Vec::with_capacity(56 + label.len() + 20 * sorted_owners.len());
        data.extend_from_slice(&self.chain_id.to_be_bytes());
        data.extend_from_slice(&(label.len() as u64).to_be_bytes());
        data.extend_from_slice(label.as_bytes());
        data.extend_from_slice(&(self.threshold as u64).to_be_bytes());
        for owner in &sorted_owners {
            data.extend_from_slice(owner.as_bytes());
        }
        data.extend_from_slice(salt.as_bytes());

        Address::derive(&data)
    }
}

/// Result of the best-effort refund step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundOutcome {
    /// No refund requested
    Skipped,
    Paid { request: RefundRequest },
    Failed { request: RefundRequest, reason: String },
}

/// Record of a successful execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub hash: Hash256,
    /// Nonce the request executed at
    pub nonce: u64,
    /// Principal that triggered the execution
    pub origin: Address,
    pub target: Address,
    #[serde(with = "hex_bytes")]
    pub return_data: ReturnData,
    pub refund: RefundOutcome,
    pub executed_at: DateTime<Utc>,
}

/// A threshold-authorization gateway
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultiSig {
    address: Address,
    chain_id: u64,
    label: Option<String>,
    salt: Hash256,
    owners: OwnerSet,
    nonce: u64,
    ledger: ApprovalLedger,
    created_at: DateTime<Utc>,
}

impl MultiSig {
    /// Create a gateway at nonce 0 with an empty ledger
    pub fn new(config: GatewayConfig) -> Result<Self, MultisigError> {
        let salt = config.salt.unwrap_or_else(|| Hash256(rand::random()));
        let address = config.derive_address(&salt);
        let owners = OwnerSet::new(config.owners, config.threshold)?;

        log::info!(
            "Gateway {} created ({}, chain {})",
            address,
            owners.description(),
            config.chain_id
        );

        Ok(Self {
            address,
            chain_id: config.chain_id,
            label: config.label,
            salt,
            owners,
            nonce: 0,
            ledger: ApprovalLedger::new(),
            created_at: Utc::now(),
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Entropy the address was derived with
    pub fn salt(&self) -> Hash256 {
        self.salt
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_owner(&self, principal: &Address) -> bool {
        self.owners.is_owner(principal)
    }

    pub fn owners(&self) -> &[Address] {
        self.owners.owners()
    }

    pub fn owner_set(&self) -> &OwnerSet {
        &self.owners
    }

    pub fn threshold(&self) -> usize {
        self.owners.threshold()
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn ledger(&self) -> &ApprovalLedger {
        &self.ledger
    }

    pub fn domain_separator(&self) -> Hash256 {
        descriptor::domain_separator(self.chain_id, &self.address)
    }

    /// The hash owners must approve for `descriptor` at `nonce`
    pub fn compute_hash(&self, descriptor: &InvocationDescriptor, nonce: u64) -> Hash256 {
        descriptor::request_hash(&self.domain_separator(), descriptor, nonce)
    }

    /// Approvals for `hash` that currently count toward the threshold
    pub fn approval_count(&self, hash: &Hash256) -> usize {
        self.ledger.tally(hash, &self.owners)
    }

    /// Every principal recorded as approving `hash`, current owner or not
    pub fn approvals_for(&self, hash: &Hash256) -> Vec<Address> {
        self.ledger.approvers(hash)
    }

    pub fn has_approved(&self, owner: &Address, hash: &Hash256) -> bool {
        self.ledger.has_approved(hash, owner)
    }

    /// Re-check invariants, e.g. after loading from disk
    pub fn validate(&self) -> Result<(), MultisigError> {
        self.owners.validate()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Record `caller`'s approval of `descriptor` at `nonce`.
    ///
    /// The hash is recomputed and must equal `expected_hash`, so an owner
    /// cannot be talked into approving parameters other than the ones they
    /// hashed. Approving twice is a no-op.
    pub fn approve(
        &mut self,
        caller: Address,
        descriptor: &InvocationDescriptor,
        nonce: u64,
        expected_hash: Hash256,
    ) -> Result<Hash256, MultisigError> {
        let computed = self.compute_hash(descriptor, nonce);
        if computed != expected_hash {
            return Err(MultisigError::HashMismatch {
                expected: expected_hash,
                computed,
            });
        }

        if !self.owners.is_owner(&caller) {
            return Err(MultisigError::NotAnOwner(caller));
        }

        if nonce < self.nonce {
            log::debug!(
                "Approval of {} by {} targets past nonce {} (current {})",
                computed,
                caller,
                nonce,
                self.nonce
            );
        }

        if self.ledger.record(computed, nonce, caller) {
            log::info!(
                "{} approved {} at nonce {} ({}/{})",
                caller,
                computed,
                nonce,
                self.ledger.tally(&computed, &self.owners),
                self.owners.threshold()
            );
        } else {
            log::debug!("{} already approved {}", caller, computed);
        }

        Ok(computed)
    }

    /// Execute `descriptor` at the current nonce.
    ///
    /// Any principal may call this. Fails with `InsufficientApprovals` when
    /// fewer than `threshold` current owners approved the hash, and with
    /// `InvocationFailed` (or an owner-set error for self-calls) when the call
    /// itself fails. On failure nothing changes.
    pub fn execute<I: Invoker + ?Sized>(
        &mut self,
        caller: Address,
        descriptor: &InvocationDescriptor,
        invoker: &mut I,
    ) -> Result<ExecutionReceipt, MultisigError> {
        let nonce = self.nonce;
        let hash = self.compute_hash(descriptor, nonce);

        let have = self.ledger.tally(&hash, &self.owners);
        let need = self.owners.threshold();
        if have < need {
            log::debug!(
                "Execution of {} at nonce {} refused: {}/{} approvals",
                hash,
                nonce,
                have,
                need
            );
            return Err(MultisigError::InsufficientApprovals { have, need });
        }

        let (return_data, staged_owners) = match self.dispatch(caller, descriptor, invoker) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Execution of {} at nonce {} failed: {}", hash, nonce, e);
                return Err(e);
            }
        };

        // Commit
        if let Some(owners) = staged_owners {
            log::info!(
                "Gateway {} owner set changed: {} -> {}",
                self.address,
                self.owners.description(),
                owners.description()
            );
            self.owners = owners;
        }
        self.nonce += 1;

        log::info!(
            "Executed {} at nonce {} -> {} ({} bytes returned, triggered by {})",
            hash,
            nonce,
            descriptor.target,
            return_data.len(),
            caller
        );

        let refund = self.settle_refund(caller, descriptor, invoker);

        Ok(ExecutionReceipt {
            hash,
            nonce,
            origin: caller,
            target: descriptor.target,
            return_data,
            refund,
            executed_at: Utc::now(),
        })
    }

    /// Drop ledger entries for nonces that can never execute again
    pub fn purge_stale(&mut self) -> usize {
        let removed = self.ledger.purge_before(self.nonce);
        if removed > 0 {
            log::debug!("Purged {} stale approval entries", removed);
        }
        removed
    }

    /// Perform the call without touching `self`. Self-calls are interpreted
    /// here and return the owner set to commit.
    fn dispatch<I: Invoker + ?Sized>(
        &self,
        caller: Address,
        descriptor: &InvocationDescriptor,
        invoker: &mut I,
    ) -> Result<(ReturnData, Option<OwnerSet>), MultisigError> {
        if descriptor.target == self.address {
            if descriptor.value != 0 {
                return Err(InvocationError::Reverted(
                    "self-call cannot carry value".to_string(),
                )
                .into());
            }

            let call = AdminCall::decode(&descriptor.payload)?;
            let mut staged = self.owners.clone();
            call.apply(&mut staged)?;
            return Ok((Vec::new(), Some(staged)));
        }

        let request = CallRequest {
            origin: caller,
            gateway: self.address,
            target: descriptor.target,
            value: descriptor.value,
            payload: &descriptor.payload,
            mode: descriptor.mode,
        };
        let data = invoker.invoke(&request)?;
        Ok((data, None))
    }

    fn settle_refund<I: Invoker + ?Sized>(
        &self,
        caller: Address,
        descriptor: &InvocationDescriptor,
        invoker: &mut I,
    ) -> RefundOutcome {
        let params = &descriptor.refund;
        if !params.is_active() {
            return RefundOutcome::Skipped;
        }

        let request = RefundRequest {
            gateway: self.address,
            asset: params.asset(),
            recipient: params.recipient().unwrap_or(caller),
            amount: params.amount(),
        };

        match invoker.refund(&request) {
            Ok(()) => {
                log::info!("Refunded {} to {}", request.amount, request.recipient);
                RefundOutcome::Paid { request }
            }
            Err(e) => {
                log::warn!(
                    "Refund of {} to {} failed: {}",
                    request.amount,
                    request.recipient,
                    e
                );
                RefundOutcome::Failed {
                    request,
                    reason: e.to_string(),
                }
            }
        }
    }
}
