//! Owner registry
//!
//! Holds the set of principals allowed to approve requests and the number
//! of distinct approvals an execution needs (M in M-of-N).

use crate::crypto::{Address, Hash256};
use crate::invoke::InvocationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultisigError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error("Owner set must contain at least one owner")]
    NoOwners,
    #[error("Duplicate owner: {0}")]
    DuplicateOwner(Address),
    #[error("Invalid owner address: {0}")]
    InvalidOwner(Address),
    #[error("Unknown owner: {0}")]
    UnknownOwner(Address),
    #[error("Caller is not an owner: {0}")]
    NotAnOwner(Address),
    #[error("Hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: Hash256, computed: Hash256 },
    #[error("Insufficient approvals: have {have}, need {need}")]
    InsufficientApprovals { have: usize, need: usize },
    #[error("Invocation failed: {0}")]
    InvocationFailed(#[from] InvocationError),
}

/// The current owners and approval threshold
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerSet {
    /// Owners in the order they were added
    owners: Vec<Address>,
    /// Minimum distinct owner approvals required
    threshold: usize,
}

impl OwnerSet {
    /// Create a validated owner set
    ///
    /// # Errors
    /// Returns error if the set is empty, contains duplicates or the zero
    /// address, or the threshold is outside `1..=owners.len()`
    pub fn new(owners: Vec<Address>, threshold: usize) -> Result<Self, MultisigError> {
        let set = Self { owners, threshold };
        set.validate()?;
        Ok(set)
    }

    /// Check every registry invariant
    pub fn validate(&self) -> Result<(), MultisigError> {
        if self.owners.is_empty() {
            return Err(MultisigError::NoOwners);
        }

        for (i, owner) in self.owners.iter().enumerate() {
            if owner.is_zero() {
                return Err(MultisigError::InvalidOwner(*owner));
            }
            if self.owners[..i].contains(owner) {
                return Err(MultisigError::DuplicateOwner(*owner));
            }
        }

        check_threshold(self.threshold, self.owners.len())
    }

    pub fn is_owner(&self, principal: &Address) -> bool {
        self.owners.contains(principal)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn owners(&self) -> &[Address] {
        &self.owners
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Get description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.threshold, self.owners.len())
    }

    /// Add an owner and set a new threshold
    pub fn add_owner(&mut self, owner: Address, threshold: usize) -> Result<(), MultisigError> {
        if owner.is_zero() {
            return Err(MultisigError::InvalidOwner(owner));
        }
        if self.is_owner(&owner) {
            return Err(MultisigError::DuplicateOwner(owner));
        }
        check_threshold(threshold, self.owners.len() + 1)?;

        self.owners.push(owner);
        self.threshold = threshold;
        Ok(())
    }

    /// Remove an owner and set a new threshold
    pub fn remove_owner(&mut self, owner: &Address, threshold: usize) -> Result<(), MultisigError> {
        let index = self
            .owners
            .iter()
            .position(|o| o == owner)
            .ok_or(MultisigError::UnknownOwner(*owner))?;
        check_threshold(threshold, self.owners.len() - 1)?;

        self.owners.remove(index);
        self.threshold = threshold;
        Ok(())
    }

    /// Replace one owner with another, keeping the threshold
    pub fn swap_owner(&mut self, old_owner: &Address, new_owner: Address) -> Result<(), MultisigError> {
        if new_owner.is_zero() {
            return Err(MultisigError::InvalidOwner(new_owner));
        }
        if self.is_owner(&new_owner) {
            return Err(MultisigError::DuplicateOwner(new_owner));
        }
        let index = self
            .owners
            .iter()
            .position(|o| o == old_owner)
            .ok_or(MultisigError::UnknownOwner(*old_owner))?;

        self.owners[index] = new_owner;
        Ok(())
    }

    pub fn change_threshold(&mut self, threshold: usize) -> Result<(), MultisigError> {
        check_threshold(threshold, self.owners.len())?;
        self.threshold = threshold;
        Ok(())
    }
}

fn check_threshold(threshold: usize, owner_count: usize) -> Result<(), MultisigError> {
    if threshold == 0 {
        return Err(MultisigError::InvalidThreshold(
            "threshold must be at least 1".to_string(),
        ));
    }
    if threshold > owner_count {
        return Err(MultisigError::InvalidThreshold(format!(
            "threshold {} exceeds owner count {}",
            threshold, owner_count
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_owners() -> Vec<Address> {
        vec![
            Address::derive(b"alice"),
            Address::derive(b"bob"),
            Address::derive(b"carol"),
        ]
    }

    #[test]
    fn test_owner_set_creation() {
        let set = OwnerSet::new(sample_owners(), 2).unwrap();

        assert_eq!(set.threshold(), 2);
        assert_eq!(set.len(), 3);
        assert_eq!(set.description(), "2-of-3");
        assert!(set.is_owner(&Address::derive(b"alice")));
        assert!(!set.is_owner(&Address::derive(b"mallory")));
    }

    #[test]
    fn test_owner_set_validation() {
        // Zero threshold
        assert!(matches!(
            OwnerSet::new(sample_owners(), 0),
            Err(MultisigError::InvalidThreshold(_))
        ));

        // Threshold > owners
        assert!(matches!(
            OwnerSet::new(sample_owners(), 4),
            Err(MultisigError::InvalidThreshold(_))
        ));

        // Empty
        assert_eq!(OwnerSet::new(vec![], 1), Err(MultisigError::NoOwners));

        // Duplicates
        let dup = Address::derive(b"same");
        assert_eq!(
            OwnerSet::new(vec![dup, dup], 1),
            Err(MultisigError::DuplicateOwner(dup))
        );

        // Zero address
        assert_eq!(
            OwnerSet::new(vec![Address::ZERO], 1),
            Err(MultisigError::InvalidOwner(Address::ZERO))
        );

        // A single owner with threshold 1 is allowed
        assert!(OwnerSet::new(vec![Address::derive(b"solo")], 1).is_ok());
    }

    #[test]
    fn test_add_owner() {
        let mut set = OwnerSet::new(sample_owners(), 2).unwrap();
        let dave = Address::derive(b"dave");

        set.add_owner(dave, 3).unwrap();
        assert!(set.is_owner(&dave));
        assert_eq!(set.description(), "3-of-4");

        // Adding again is rejected and leaves the set alone
        let before = set.clone();
        assert_eq!(set.add_owner(dave, 3), Err(MultisigError::DuplicateOwner(dave)));
        assert_eq!(set, before);

        // Threshold checked against the grown set
        let erin = Address::derive(b"erin");
        assert!(matches!(
            set.add_owner(erin, 6),
            Err(MultisigError::InvalidThreshold(_))
        ));
        assert!(!set.is_owner(&erin));
    }

    #[test]
    fn test_remove_owner() {
        let mut set = OwnerSet::new(sample_owners(), 2).unwrap();
        let carol = Address::derive(b"carol");

        set.remove_owner(&carol, 2).unwrap();
        assert!(!set.is_owner(&carol));
        assert_eq!(set.description(), "2-of-2");

        assert_eq!(
            set.remove_owner(&carol, 1),
            Err(MultisigError::UnknownOwner(carol))
        );

        // Threshold must still fit the shrunken set
        let bob = Address::derive(b"bob");
        assert!(matches!(
            set.remove_owner(&bob, 2),
            Err(MultisigError::InvalidThreshold(_))
        ));
        assert!(set.is_owner(&bob));
    }

    #[test]
    fn test_last_owner_cannot_be_removed() {
        let solo = Address::derive(b"solo");
        let mut set = OwnerSet::new(vec![solo], 1).unwrap();

        assert!(matches!(
            set.remove_owner(&solo, 1),
            Err(MultisigError::InvalidThreshold(_))
        ));
        assert!(matches!(
            set.remove_owner(&solo, 0),
            Err(MultisigError::InvalidThreshold(_))
        ));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_swap_owner_keeps_position() {
        let mut set = OwnerSet::new(sample_owners(), 2).unwrap();
        let bob = Address::derive(b"bob");
        let dave = Address::derive(b"dave");

        set.swap_owner(&bob, dave).unwrap();
        assert_eq!(set.owners()[1], dave);
        assert!(!set.is_owner(&bob));
        assert_eq!(set.threshold(), 2);

        assert_eq!(
            set.swap_owner(&bob, Address::derive(b"x")),
            Err(MultisigError::UnknownOwner(bob))
        );
        let alice = Address::derive(b"alice");
        assert_eq!(
            set.swap_owner(&alice, dave),
            Err(MultisigError::DuplicateOwner(dave))
        );
    }

    #[test]
    fn test_change_threshold() {
        let mut set = OwnerSet::new(sample_owners(), 2).unwrap();

        set.change_threshold(3).unwrap();
        assert_eq!(set.threshold(), 3);

        assert!(set.change_threshold(0).is_err());
        assert!(set.change_threshold(4).is_err());
        assert_eq!(set.threshold(), 3);
    }
}
