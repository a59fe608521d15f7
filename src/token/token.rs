//! Managed fungible token
//!
//! A balance ledger with two privileged roles. The `admin` mints, burns,
//! pauses and sets the transfer fee; the `compliance` role maintains a
//! blacklist and can burn blacklisted balances. In a typical deployment both
//! roles are held by gateways.

use crate::crypto::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// 100% in basis points
pub const MAX_FEE_BPS: u16 = 10_000;

/// Token-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u128, need: u128 },
    #[error("Insufficient allowance: have {have}, need {need}")]
    InsufficientAllowance { have: u128, need: u128 },
    #[error("Invalid amount: amount must be greater than 0")]
    InvalidAmount,
    #[error("Token not found: {0}")]
    TokenNotFound(Address),
    #[error("Token already exists: {0}")]
    TokenAlreadyExists(Address),
    #[error("{caller} lacks the {role} role")]
    Unauthorized { caller: Address, role: &'static str },
    #[error("Token is paused")]
    Paused,
    #[error("Address is blacklisted: {0}")]
    Blacklisted(Address),
    #[error("Address is not blacklisted: {0}")]
    NotBlacklisted(Address),
    #[error("Invalid fee: {0} bps exceeds 10000")]
    InvalidFee(u16),
    #[error("Supply overflow")]
    Overflow,
    #[error("Invalid symbol: must be 1-10 characters")]
    InvalidSymbol,
    #[error("Invalid name: must be 1-50 characters")]
    InvalidName,
    #[error("Invalid decimals: must be 0-18")]
    InvalidDecimals,
}

/// Token metadata (immutable after creation)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub created_at: DateTime<Utc>,
}

impl TokenMetadata {
    /// Create new token metadata with validation
    pub fn new(name: String, symbol: String, decimals: u8) -> Result<Self, TokenError> {
        if name.is_empty() || name.len() > 50 {
            return Err(TokenError::InvalidName);
        }

        if symbol.is_empty() || symbol.len() > 10 {
            return Err(TokenError::InvalidSymbol);
        }

        if decimals > 18 {
            return Err(TokenError::InvalidDecimals);
        }

        Ok(Self {
            name,
            symbol,
            decimals,
            created_at: Utc::now(),
        })
    }
}

/// Something that happened to a token
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TokenEventKind {
    Transfer { from: Address, to: Address, amount: u128, fee: u128 },
    Approval { owner: Address, spender: Address, amount: u128 },
    Mint { to: Address, amount: u128 },
    Burn { from: Address, amount: u128 },
    FeeChanged { fee_bps: u16 },
    Paused,
    Unpaused,
    Blacklisted { address: Address },
    Unblacklisted { address: Address },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TokenEvent {
    pub token: Address,
    pub kind: TokenEventKind,
    pub timestamp: DateTime<Utc>,
}

/// A role-gated fungible token
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManagedToken {
    pub address: Address,
    pub metadata: TokenMetadata,
    admin: Address,
    compliance: Address,
    total_supply: u128,
    balances: HashMap<Address, u128>,
    /// Allowances: owner -> (spender -> amount)
    allowances: HashMap<Address, HashMap<Address, u128>>,
    paused: bool,
    blacklist: BTreeSet<Address>,
    fee_bps: u16,
    /// Event history (last 100)
    pub history: Vec<TokenEvent>,
}

impl ManagedToken {
    /// Create a token with zero supply
    pub fn new(address: Address, metadata: TokenMetadata, admin: Address, compliance: Address) -> Self {
        Self {
            address,
            metadata,
            admin,
            compliance,
            total_supply: 0,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            paused: false,
            blacklist: BTreeSet::new(),
            fee_bps: 0,
            history: Vec::new(),
        }
    }

    // =========================================================================
    // View Functions
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.metadata.decimals
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn compliance(&self) -> Address {
        self.compliance
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn balance_of(&self, address: &Address) -> u128 {
        *self.balances.get(address).unwrap_or(&0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_blacklisted(&self, address: &Address) -> bool {
        self.blacklist.contains(address)
    }

    pub fn transfer_fee(&self) -> u16 {
        self.fee_bps
    }

    /// Number of addresses holding a non-zero balance
    pub fn holder_count(&self) -> usize {
        self.balances.values().filter(|&&b| b > 0).count()
    }

    // =========================================================================
    // Admin Functions
    // =========================================================================

    pub fn mint(&mut self, caller: &Address, to: Address, amount: u128) -> Result<TokenEvent, TokenError> {
        self.require_admin(caller)?;
        if amount == 0 {
            return Err(TokenError::InvalidAmount);
        }
        let supply = self.total_supply.checked_add(amount).ok_or(TokenError::Overflow)?;

        self.total_supply = supply;
        *self.balances.entry(to).or_insert(0) += amount;
        Ok(self.emit(TokenEventKind::Mint { to, amount }))
    }

    /// Burn from the admin's own balance
    pub fn burn(&mut self, caller: &Address, amount: u128) -> Result<TokenEvent, TokenError> {
        self.require_admin(caller)?;
        if amount == 0 {
            return Err(TokenError::InvalidAmount);
        }
        self.debit(caller, amount)?;
        self.total_supply -= amount;
        Ok(self.emit(TokenEventKind::Burn {
            from: *caller,
            amount,
        }))
    }

    pub fn set_transfer_fee(&mut self, caller: &Address, fee_bps: u16) -> Result<TokenEvent, TokenError> {
        self.require_admin(caller)?;
        if fee_bps > MAX_FEE_BPS {
            return Err(TokenError::InvalidFee(fee_bps));
        }
        self.fee_bps = fee_bps;
        Ok(self.emit(TokenEventKind::FeeChanged { fee_bps }))
    }

    pub fn pause(&mut self, caller: &Address) -> Result<TokenEvent, TokenError> {
        self.require_admin(caller)?;
        self.paused = true;
        Ok(self.emit(TokenEventKind::Paused))
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<TokenEvent, TokenError> {
        self.require_admin(caller)?;
        self.paused = false;
        Ok(self.emit(TokenEventKind::Unpaused))
    }

    // =========================================================================
    // Compliance Functions
    // =========================================================================

    pub fn add_to_blacklist(&mut self, caller: &Address, address: Address) -> Result<TokenEvent, TokenError> {
        self.require_compliance(caller)?;
        self.blacklist.insert(address);
        Ok(self.emit(TokenEventKind::Blacklisted { address }))
    }

    pub fn remove_from_blacklist(&mut self, caller: &Address, address: Address) -> Result<TokenEvent, TokenError> {
        self.require_compliance(caller)?;
        if !self.blacklist.remove(&address) {
            return Err(TokenError::NotBlacklisted(address));
        }
        Ok(self.emit(TokenEventKind::Unblacklisted { address }))
    }

    /// Destroy the whole balance of a blacklisted address
    pub fn burn_blacklisted(&mut self, caller: &Address, address: Address) -> Result<TokenEvent, TokenError> {
        self.require_compliance(caller)?;
        if !self.is_blacklisted(&address) {
            return Err(TokenError::NotBlacklisted(address));
        }

        let amount = self.balances.remove(&address).unwrap_or(0);
        self.total_supply -= amount;
        Ok(self.emit(TokenEventKind::Burn {
            from: address,
            amount,
        }))
    }

    // =========================================================================
    // Holder Functions
    // =========================================================================

    /// Transfer tokens, charging the transfer fee to the recipient's side
    pub fn transfer(&mut self, from: &Address, to: Address, amount: u128) -> Result<TokenEvent, TokenError> {
        self.check_transfer(from, &to, amount)?;
        self.move_funds(*from, to, amount)
    }

    /// Set allowance (0 revokes)
    pub fn approve(&mut self, owner: &Address, spender: Address, amount: u128) -> Result<TokenEvent, TokenError> {
        self.allowances
            .entry(*owner)
            .or_default()
            .insert(spender, amount);

        Ok(self.emit(TokenEventKind::Approval {
            owner: *owner,
            spender,
            amount,
        }))
    }

    /// Transfer on behalf of `from` (requires prior approval)
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<TokenEvent, TokenError> {
        self.check_transfer(&from, &to, amount)?;
        if self.is_blacklisted(spender) {
            return Err(TokenError::Blacklisted(*spender));
        }

        let current_allowance = self.allowance(&from, spender);
        if current_allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                have: current_allowance,
                need: amount,
            });
        }

        let event = self.move_funds(from, to, amount)?;
        if let Some(allowance) = self
            .allowances
            .get_mut(&from)
            .and_then(|spenders| spenders.get_mut(spender))
        {
            *allowance -= amount;
        }
        Ok(event)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn require_admin(&self, caller: &Address) -> Result<(), TokenError> {
        if *caller != self.admin {
            return Err(TokenError::Unauthorized {
                caller: *caller,
                role: "admin",
            });
        }
        Ok(())
    }

    fn require_compliance(&self, caller: &Address) -> Result<(), TokenError> {
        if *caller != self.compliance {
            return Err(TokenError::Unauthorized {
                caller: *caller,
                role: "compliance",
            });
        }
        Ok(())
    }

    fn check_transfer(&self, from: &Address, to: &Address, amount: u128) -> Result<(), TokenError> {
        if self.paused {
            return Err(TokenError::Paused);
        }
        if amount == 0 {
            return Err(TokenError::InvalidAmount);
        }
        for party in [from, to] {
            if self.is_blacklisted(party) {
                return Err(TokenError::Blacklisted(*party));
            }
        }
        let have = self.balance_of(from);
        if have < amount {
            return Err(TokenError::InsufficientBalance { have, need: amount });
        }
        Ok(())
    }

    /// Move already-checked funds, splitting off the fee for the admin
    fn move_funds(&mut self, from: Address, to: Address, amount: u128) -> Result<TokenEvent, TokenError> {
        let fee = amount
            .checked_mul(self.fee_bps as u128)
            .map(|v| v / MAX_FEE_BPS as u128)
            .unwrap_or_else(|| amount / MAX_FEE_BPS as u128 * self.fee_bps as u128);

        self.debit(&from, amount)?;
        *self.balances.entry(to).or_insert(0) += amount - fee;
        if fee > 0 {
            *self.balances.entry(self.admin).or_insert(0) += fee;
        }

        Ok(self.emit(TokenEventKind::Transfer {
            from,
            to,
            amount,
            fee,
        }))
    }

    fn debit(&mut self, from: &Address, amount: u128) -> Result<(), TokenError> {
        let have = self.balance_of(from);
        if have < amount {
            return Err(TokenError::InsufficientBalance { have, need: amount });
        }
        self.balances.insert(*from, have - amount);
        Ok(())
    }

    fn emit(&mut self, kind: TokenEventKind) -> TokenEvent {
        let event = TokenEvent {
            token: self.address,
            kind,
            timestamp: Utc::now(),
        };

        // Keep last 100
        self.history.push(event.clone());
        if self.history.len() > 100 {
            self.history.remove(0);
        }

        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Address {
        Address::derive(b"admin")
    }

    fn compliance() -> Address {
        Address::derive(b"compliance")
    }

    fn user() -> Address {
        Address::derive(b"user")
    }

    fn create_test_token() -> ManagedToken {
        let metadata = TokenMetadata::new("Gold Token".to_string(), "XAU".to_string(), 6).unwrap();
        let mut token = ManagedToken::new(Address::derive(b"token"), metadata, admin(), compliance());
        token.mint(&admin(), admin(), 5_000_000_000).unwrap();
        token
    }

    #[test]
    fn test_token_creation() {
        let token = create_test_token();

        assert_eq!(token.name(), "Gold Token");
        assert_eq!(token.symbol(), "XAU");
        assert_eq!(token.decimals(), 6);
        assert_eq!(token.total_supply(), 5_000_000_000);
        assert_eq!(token.balance_of(&admin()), 5_000_000_000);
        assert_eq!(token.holder_count(), 1);
    }

    #[test]
    fn test_metadata_validation() {
        assert!(TokenMetadata::new("".to_string(), "TST".to_string(), 18).is_err());
        assert!(TokenMetadata::new("Test".to_string(), "TOOLONGSYMBOL".to_string(), 18).is_err());
        assert!(TokenMetadata::new("Test".to_string(), "TST".to_string(), 19).is_err());
    }

    #[test]
    fn test_roles_are_enforced() {
        let mut token = create_test_token();

        assert!(matches!(
            token.mint(&user(), user(), 1),
            Err(TokenError::Unauthorized { role: "admin", .. })
        ));
        assert!(matches!(
            token.pause(&compliance()),
            Err(TokenError::Unauthorized { .. })
        ));
        assert!(matches!(
            token.add_to_blacklist(&admin(), user()),
            Err(TokenError::Unauthorized { role: "compliance", .. })
        ));
        assert_eq!(token.total_supply(), 5_000_000_000);
    }

    #[test]
    fn test_transfer() {
        let mut token = create_test_token();

        token.transfer(&admin(), user(), 1_000_000).unwrap();
        assert_eq!(token.balance_of(&user()), 1_000_000);
        assert_eq!(token.balance_of(&admin()), 4_999_000_000);

        assert!(matches!(
            token.transfer(&user(), admin(), 2_000_000),
            Err(TokenError::InsufficientBalance { .. })
        ));
        assert_eq!(token.transfer(&user(), admin(), 0), Err(TokenError::InvalidAmount));
    }

    #[test]
    fn test_pause_blocks_transfers() {
        let mut token = create_test_token();

        token.pause(&admin()).unwrap();
        assert_eq!(token.transfer(&admin(), user(), 1), Err(TokenError::Paused));

        // Approvals still work while paused
        token.approve(&admin(), user(), 10).unwrap();
        assert_eq!(
            token.transfer_from(&user(), admin(), user(), 10),
            Err(TokenError::Paused)
        );

        token.unpause(&admin()).unwrap();
        token.transfer_from(&user(), admin(), user(), 10).unwrap();
        assert_eq!(token.balance_of(&user()), 10);
    }

    #[test]
    fn test_blacklist() {
        let mut token = create_test_token();
        token.transfer(&admin(), user(), 1_000_000).unwrap();

        token.add_to_blacklist(&compliance(), user()).unwrap();
        assert_eq!(
            token.transfer(&user(), admin(), 1),
            Err(TokenError::Blacklisted(user()))
        );
        assert_eq!(
            token.transfer(&admin(), user(), 1),
            Err(TokenError::Blacklisted(user()))
        );

        token.burn_blacklisted(&compliance(), user()).unwrap();
        assert_eq!(token.balance_of(&user()), 0);
        assert_eq!(token.total_supply(), 4_999_000_000);

        token.remove_from_blacklist(&compliance(), user()).unwrap();
        token.transfer(&admin(), user(), 1).unwrap();

        assert_eq!(
            token.burn_blacklisted(&compliance(), user()),
            Err(TokenError::NotBlacklisted(user()))
        );
    }

    #[test]
    fn test_transfer_fee_goes_to_admin() {
        let mut token = create_test_token();
        token.transfer(&admin(), user(), 1_000_000).unwrap();

        token.set_transfer_fee(&admin(), 10).unwrap();
        let other = Address::derive(b"other");
        let event = token.transfer(&user(), other, 100_000).unwrap();

        assert!(matches!(event.kind, TokenEventKind::Transfer { fee: 100, .. }));
        assert_eq!(token.balance_of(&other), 99_900);
        assert_eq!(token.balance_of(&admin()), 4_999_000_100);
        assert_eq!(token.total_supply(), 5_000_000_000);

        assert_eq!(
            token.set_transfer_fee(&admin(), 10_001),
            Err(TokenError::InvalidFee(10_001))
        );
    }

    #[test]
    fn test_burn_from_admin_balance() {
        let mut token = create_test_token();

        token.burn(&admin(), 1_000_000_000).unwrap();
        assert_eq!(token.total_supply(), 4_000_000_000);
        assert!(matches!(
            token.burn(&admin(), 5_000_000_000),
            Err(TokenError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_transfer_from_allowance() {
        let mut token = create_test_token();
        token.transfer(&admin(), user(), 1_000_000).unwrap();

        assert!(matches!(
            token.transfer_from(&admin(), user(), admin(), 1_000_000),
            Err(TokenError::InsufficientAllowance { .. })
        ));

        token.approve(&user(), admin(), 500_000).unwrap();
        token.transfer_from(&admin(), user(), admin(), 500_000).unwrap();
        assert_eq!(token.allowance(&user(), &admin()), 0);
        assert!(token.transfer_from(&admin(), user(), admin(), 500_000).is_err());
        assert_eq!(token.balance_of(&user()), 500_000);
    }
}
