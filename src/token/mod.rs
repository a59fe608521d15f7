//! Managed fungible tokens governed through gateways
//!
//! Provides a role-gated token with:
//! - Balances and allowances per address
//! - Admin operations (mint, burn, pause, transfer fee)
//! - Compliance operations (blacklist, burn blacklisted)
//!
//! # Example
//!
//! ```ignore
//! use multisig_gateway::token::{TokenCall, TokenManager};
//!
//! let mut manager = TokenManager::new();
//!
//! // Owner gateway is admin, compliance gateway holds the compliance role
//! let token = manager.deploy(
//!     "Gold Token".to_string(),
//!     "XAU".to_string(),
//!     6,
//!     &deployer,
//!     owner_gateway.address(),
//!     compliance_gateway.address(),
//! )?;
//!
//! // Payload for a gateway request
//! let payload = TokenCall::Mint { to: treasury, amount: 1_000_000 }.encode()?;
//! ```

pub mod manager;
pub mod token;

pub use manager::{TokenCall, TokenManager};
pub use token::{ManagedToken, TokenError, TokenEvent, TokenEventKind, TokenMetadata, MAX_FEE_BPS};
