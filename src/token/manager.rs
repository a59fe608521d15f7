//! Token manager for deploying and calling tokens
//!
//! The manager is the downstream side of a gateway: it implements
//! [`Invoker`] by decoding a [`TokenCall`] payload and applying it to the
//! target token with the call's sender as the acting principal.

use crate::crypto::Address;
use crate::invoke::{CallMode, CallRequest, InvocationError, Invoker, RefundRequest, ReturnData};
use crate::token::token::{ManagedToken, TokenError, TokenEvent, TokenMetadata};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A call on a managed token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenCall {
    Mint { to: Address, amount: u128 },
    Burn { amount: u128 },
    SetTransferFee { fee_bps: u16 },
    Pause,
    Unpause,
    AddToBlackList { address: Address },
    RemoveFromBlackList { address: Address },
    BurnBlackListed { address: Address },
    Transfer { to: Address, amount: u128 },
    Approve { spender: Address, amount: u128 },
    TransferFrom { from: Address, to: Address, amount: u128 },
}

impl TokenCall {
    /// Encode as a request payload
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, InvocationError> {
        serde_json::from_slice(payload)
            .map_err(|e| InvocationError::MalformedPayload(format!("token call: {}", e)))
    }

    /// Apply to `token` on behalf of `sender`
    pub fn apply(&self, token: &mut ManagedToken, sender: &Address) -> Result<TokenEvent, TokenError> {
        match self {
            TokenCall::Mint { to, amount } => token.mint(sender, *to, *amount),
            TokenCall::Burn { amount } => token.burn(sender, *amount),
            TokenCall::SetTransferFee { fee_bps } => token.set_transfer_fee(sender, *fee_bps),
            TokenCall::Pause => token.pause(sender),
            TokenCall::Unpause => token.unpause(sender),
            TokenCall::AddToBlackList { address } => token.add_to_blacklist(sender, *address),
            TokenCall::RemoveFromBlackList { address } => token.remove_from_blacklist(sender, *address),
            TokenCall::BurnBlackListed { address } => token.burn_blacklisted(sender, *address),
            TokenCall::Transfer { to, amount } => token.transfer(sender, *to, *amount),
            TokenCall::Approve { spender, amount } => token.approve(sender, *spender, *amount),
            TokenCall::TransferFrom { from, to, amount } => {
                token.transfer_from(sender, *from, *to, *amount)
            }
        }
    }
}

/// Manages all tokens in the system
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenManager {
    /// All tokens by address
    tokens: HashMap<Address, ManagedToken>,
    /// Deployment counter for address generation
    nonce: u64,
}

impl TokenManager {
    pub fn new() -> Self {
        Self {
            tokens: HashMap::new(),
            nonce: 0,
        }
    }

    /// Deploy a token with zero supply and the given role holders
    pub fn deploy(
        &mut self,
        name: String,
        symbol: String,
        decimals: u8,
        creator: &Address,
        admin: Address,
        compliance: Address,
    ) -> Result<Address, TokenError> {
        let metadata = TokenMetadata::new(name, symbol, decimals)?;

        let address = self.generate_address(creator, &metadata.symbol);
        self.nonce += 1;

        if self.tokens.contains_key(&address) {
            return Err(TokenError::TokenAlreadyExists(address));
        }

        let token = ManagedToken::new(address, metadata, admin, compliance);
        log::info!(
            "Token deployed: {} ({}) at {}, admin {}, compliance {}",
            token.name(),
            token.symbol(),
            address,
            admin,
            compliance
        );
        self.tokens.insert(address, token);

        Ok(address)
    }

    /// Derive a token address from creator, symbol and deployment counter
    fn generate_address(&self, creator: &Address, symbol: &str) -> Address {
        let input = format!("{}:{}:{}", creator, symbol, self.nonce);
        Address::derive(input.as_bytes())
    }

    pub fn get(&self, address: &Address) -> Option<&ManagedToken> {
        self.tokens.get(address)
    }

    pub fn get_mut(&mut self, address: &Address) -> Option<&mut ManagedToken> {
        self.tokens.get_mut(address)
    }

    pub fn list(&self) -> Vec<&ManagedToken> {
        self.tokens.values().collect()
    }

    pub fn count(&self) -> usize {
        self.tokens.len()
    }

    pub fn exists(&self, address: &Address) -> bool {
        self.tokens.contains_key(address)
    }

    pub fn balance_of(&self, token_address: &Address, holder: &Address) -> Result<u128, TokenError> {
        let token = self
            .tokens
            .get(token_address)
            .ok_or(TokenError::TokenNotFound(*token_address))?;

        Ok(token.balance_of(holder))
    }

    /// Apply a call to a token directly, outside any gateway
    pub fn call(
        &mut self,
        token_address: &Address,
        sender: &Address,
        call: &TokenCall,
    ) -> Result<TokenEvent, TokenError> {
        let token = self
            .tokens
            .get_mut(token_address)
            .ok_or(TokenError::TokenNotFound(*token_address))?;

        call.apply(token, sender)
    }
}

impl Invoker for TokenManager {
    fn invoke(&mut self, call: &CallRequest<'_>) -> Result<ReturnData, InvocationError> {
        if call.mode == CallMode::ContextPreserving {
            return Err(InvocationError::UnsupportedMode(call.mode));
        }
        if call.value != 0 {
            return Err(InvocationError::Reverted(
                "tokens do not accept value".to_string(),
            ));
        }

        let token = self
            .tokens
            .get_mut(&call.target)
            .ok_or(InvocationError::UnknownTarget(call.target))?;
        let token_call = TokenCall::decode(call.payload)?;

        let event = token_call
            .apply(token, &call.sender())
            .map_err(|e| InvocationError::Reverted(e.to_string()))?;

        log::debug!("Token {} call by {}: {:?}", call.target, call.sender(), event.kind);

        serde_json::to_vec(&event).map_err(|e| InvocationError::Reverted(e.to_string()))
    }

    /// Pay refunds in a token held by the gateway. Native refunds are not
    /// supported.
    fn refund(&mut self, request: &RefundRequest) -> Result<(), InvocationError> {
        let asset = request.asset.ok_or_else(|| {
            InvocationError::Unsupported("native refunds are not supported".to_string())
        })?;
        let token = self
            .tokens
            .get_mut(&asset)
            .ok_or(InvocationError::UnknownTarget(asset))?;

        token
            .transfer(&request.gateway, request.recipient, request.amount)
            .map_err(|e| InvocationError::Reverted(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> Address {
        Address::derive(b"gateway")
    }

    fn compliance() -> Address {
        Address::derive(b"compliance-gateway")
    }

    fn deploy(manager: &mut TokenManager) -> Address {
        manager
            .deploy(
                "Gold Token".to_string(),
                "XAU".to_string(),
                6,
                &Address::derive(b"deployer"),
                gateway(),
                compliance(),
            )
            .unwrap()
    }

    fn request<'a>(target: Address, payload: &'a [u8], mode: CallMode) -> CallRequest<'a> {
        CallRequest {
            origin: Address::derive(b"relayer"),
            gateway: gateway(),
            target,
            value: 0,
            payload,
            mode,
        }
    }

    #[test]
    fn test_deploy() {
        let mut manager = TokenManager::new();
        let first = deploy(&mut manager);
        let second = deploy(&mut manager);

        assert_ne!(first, second);
        assert_eq!(manager.count(), 2);
        assert_eq!(manager.get(&first).unwrap().admin(), gateway());
        assert_eq!(manager.get(&first).unwrap().total_supply(), 0);
    }

    #[test]
    fn test_token_call_encoding() {
        let call = TokenCall::Mint {
            to: Address::ZERO,
            amount: 5,
        };
        let bytes = call.encode().unwrap();
        assert_eq!(
            String::from_utf8(bytes.clone()).unwrap(),
            r#"{"mint":{"to":"0x0000000000000000000000000000000000000000","amount":5}}"#
        );
        assert_eq!(TokenCall::decode(&bytes).unwrap(), call);
        assert_eq!(TokenCall::decode(br#""pause""#).unwrap(), TokenCall::Pause);
    }

    #[test]
    fn test_invoke_acts_as_gateway() {
        let mut manager = TokenManager::new();
        let token = deploy(&mut manager);
        let holder = Address::derive(b"holder");

        let payload = TokenCall::Mint {
            to: holder,
            amount: 1000,
        }
        .encode()
        .unwrap();
        let data = manager
            .invoke(&request(token, &payload, CallMode::Direct))
            .unwrap();

        let event: TokenEvent = serde_json::from_slice(&data).unwrap();
        assert_eq!(event.token, token);
        assert_eq!(manager.balance_of(&token, &holder).unwrap(), 1000);
    }

    #[test]
    fn test_invoke_failures() {
        let mut manager = TokenManager::new();
        let token = deploy(&mut manager);
        let pause = TokenCall::Pause.encode().unwrap();

        assert_eq!(
            manager.invoke(&request(token, &pause, CallMode::ContextPreserving)),
            Err(InvocationError::UnsupportedMode(CallMode::ContextPreserving))
        );

        let unknown = Address::derive(b"nowhere");
        assert_eq!(
            manager.invoke(&request(unknown, &pause, CallMode::Direct)),
            Err(InvocationError::UnknownTarget(unknown))
        );

        assert!(matches!(
            manager.invoke(&request(token, b"{}", CallMode::Direct)),
            Err(InvocationError::MalformedPayload(_))
        ));

        // Compliance calls from the owner gateway are rejected by the token
        let blacklist = TokenCall::AddToBlackList {
            address: Address::derive(b"x"),
        }
        .encode()
        .unwrap();
        assert!(matches!(
            manager.invoke(&request(token, &blacklist, CallMode::Direct)),
            Err(InvocationError::Reverted(_))
        ));
        assert!(!manager.get(&token).unwrap().is_paused());
    }

    #[test]
    fn test_refund_in_token() {
        let mut manager = TokenManager::new();
        let token = deploy(&mut manager);
        let relayer = Address::derive(b"relayer");
        manager
            .call(&token, &gateway(), &TokenCall::Mint { to: gateway(), amount: 500 })
            .unwrap();

        let mut refund = RefundRequest {
            gateway: gateway(),
            asset: Some(token),
            recipient: relayer,
            amount: 200,
        };
        manager.refund(&refund).unwrap();
        assert_eq!(manager.balance_of(&token, &relayer).unwrap(), 200);

        refund.amount = 1000;
        assert!(matches!(
            manager.refund(&refund),
            Err(InvocationError::Reverted(_))
        ));

        refund.asset = None;
        assert!(matches!(
            manager.refund(&refund),
            Err(InvocationError::Unsupported(_))
        ));
    }

    #[test]
    fn test_call_nonexistent_token() {
        let mut manager = TokenManager::new();
        let missing = Address::derive(b"missing");

        assert_eq!(
            manager.call(&missing, &gateway(), &TokenCall::Pause),
            Err(TokenError::TokenNotFound(missing))
        );
        assert_eq!(
            manager.balance_of(&missing, &gateway()),
            Err(TokenError::TokenNotFound(missing))
        );
    }
}
