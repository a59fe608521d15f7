//! Invocation descriptors and request hashing
//!
//! A descriptor is everything an owner approves: where the call goes, what
//! it carries, how it runs and the refund parameters. The request hash binds
//! a descriptor to one nonce of one gateway on one chain:
//!
//! ```text
//! domain  = SHA256(DOMAIN_TAG || chain_id || gateway)
//! request = SHA256(REQUEST_TAG || target || value || SHA256(payload) || mode
//!                  || gas_hint || base_fee || fee_ceiling || fee_asset
//!                  || refund_recipient || nonce)
//! hash    = SHA256(0x19 || 0x01 || domain || request)
//! ```
//!
//! Every field has a fixed width (the payload enters through its digest), so
//! two different descriptors can never produce the same preimage.

use crate::crypto::{Address, Hash256};
use crate::invoke::CallMode;
use serde::{Deserialize, Serialize};

const DOMAIN_TAG: &[u8] = b"multisig-gateway/domain/v1";
const REQUEST_TAG: &[u8] = b"multisig-gateway/request/v1";
const HASH_PREFIX: [u8; 2] = [0x19, 0x01];

/// Refund and metering parameters.
///
/// They are hashed and forwarded; a zero `fee_ceiling` means no refund.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundParams {
    #[serde(default)]
    pub gas_hint: u64,
    #[serde(default)]
    pub base_fee: u64,
    /// Price per unit of gas
    #[serde(default)]
    pub fee_ceiling: u128,
    /// Refund asset; absent means the native asset
    #[serde(default)]
    pub fee_asset: Option<Address>,
    /// Refund receiver; absent means whoever triggered the execution
    #[serde(default)]
    pub refund_recipient: Option<Address>,
}

impl RefundParams {
    pub fn is_active(&self) -> bool {
        self.fee_ceiling > 0
    }

    /// `(gas_hint + base_fee) * fee_ceiling`, saturating
    pub fn amount(&self) -> u128 {
        let gas = (self.gas_hint as u128).saturating_add(self.base_fee as u128);
        gas.saturating_mul(self.fee_ceiling)
    }

    /// Asset with the zero address folded into "native"
    pub fn asset(&self) -> Option<Address> {
        self.fee_asset.filter(|a| !a.is_zero())
    }

    /// Recipient with the zero address folded into "absent"
    pub fn recipient(&self) -> Option<Address> {
        self.refund_recipient.filter(|a| !a.is_zero())
    }
}

/// One proposed outbound call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationDescriptor {
    pub target: Address,
    #[serde(default)]
    pub value: u128,
    /// Opaque call data, hex-encoded in JSON
    #[serde(default, with = "hex_bytes")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub mode: CallMode,
    #[serde(default)]
    pub refund: RefundParams,
}

impl InvocationDescriptor {
    /// A direct call with no value and no refund
    pub fn call(target: Address, payload: Vec<u8>) -> Self {
        Self {
            target,
            value: 0,
            payload,
            mode: CallMode::Direct,
            refund: RefundParams::default(),
        }
    }

    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }

    pub fn with_mode(mut self, mode: CallMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_refund(mut self, refund: RefundParams) -> Self {
        self.refund = refund;
        self
    }

    /// Hash of the descriptor fields and nonce, without the domain
    pub fn struct_hash(&self, nonce: u64) -> Hash256 {
        let payload_hash = Hash256::digest(&self.payload);
        let fee_asset = self.refund.asset().unwrap_or(Address::ZERO);
        let recipient = self.refund.recipient().unwrap_or(Address::ZERO);

        Hash256::digest_parts(&[
            REQUEST_TAG,
            self.target.as_bytes(),
            &self.value.to_be_bytes(),
            payload_hash.as_bytes(),
            &[self.mode.as_byte()],
            &self.refund.gas_hint.to_be_bytes(),
            &self.refund.base_fee.to_be_bytes(),
            &self.refund.fee_ceiling.to_be_bytes(),
            fee_asset.as_bytes(),
            recipient.as_bytes(),
            &nonce.to_be_bytes(),
        ])
    }
}

/// Identity of one gateway instance on one network
pub fn domain_separator(chain_id: u64, gateway: &Address) -> Hash256 {
    Hash256::digest_parts(&[DOMAIN_TAG, &chain_id.to_be_bytes(), gateway.as_bytes()])
}

/// The approval-ledger key for a descriptor at a nonce
pub fn request_hash(domain: &Hash256, descriptor: &InvocationDescriptor, nonce: u64) -> Hash256 {
    let struct_hash = descriptor.struct_hash(nonce);
    Hash256::digest_parts(&[&HASH_PREFIX, domain.as_bytes(), struct_hash.as_bytes()])
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(payload)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InvocationDescriptor {
        InvocationDescriptor::call(Address::derive(b"token"), b"mint".to_vec())
    }

    fn domain() -> Hash256 {
        domain_separator(1, &Address::derive(b"gateway"))
    }

    #[test]
    fn test_hash_is_deterministic() {
        let d = sample();
        assert_eq!(request_hash(&domain(), &d, 0), request_hash(&domain(), &d, 0));
    }

    #[test]
    fn test_hash_binds_every_field() {
        let base = request_hash(&domain(), &sample(), 0);

        let variants = vec![
            InvocationDescriptor::call(Address::derive(b"other"), b"mint".to_vec()),
            sample().with_value(1),
            InvocationDescriptor::call(Address::derive(b"token"), b"burn".to_vec()),
            sample().with_mode(CallMode::ContextPreserving),
            sample().with_refund(RefundParams {
                gas_hint: 1,
                ..Default::default()
            }),
            sample().with_refund(RefundParams {
                base_fee: 1,
                ..Default::default()
            }),
            sample().with_refund(RefundParams {
                fee_ceiling: 1,
                ..Default::default()
            }),
            sample().with_refund(RefundParams {
                fee_asset: Some(Address::derive(b"usd")),
                ..Default::default()
            }),
            sample().with_refund(RefundParams {
                refund_recipient: Some(Address::derive(b"relayer")),
                ..Default::default()
            }),
        ];

        for variant in &variants {
            assert_ne!(request_hash(&domain(), variant, 0), base, "{:?}", variant);
        }
    }

    #[test]
    fn test_hash_binds_nonce_and_domain() {
        let d = sample();
        let base = request_hash(&domain(), &d, 0);

        assert_ne!(request_hash(&domain(), &d, 1), base);

        let other_chain = domain_separator(2, &Address::derive(b"gateway"));
        assert_ne!(request_hash(&other_chain, &d, 0), base);

        let other_gateway = domain_separator(1, &Address::derive(b"gateway-2"));
        assert_ne!(request_hash(&other_gateway, &d, 0), base);
    }

    #[test]
    fn test_zero_address_means_absent() {
        let absent = sample();
        let zeroed = sample().with_refund(RefundParams {
            fee_asset: Some(Address::ZERO),
            refund_recipient: Some(Address::ZERO),
            ..Default::default()
        });
        assert_eq!(
            request_hash(&domain(), &absent, 0),
            request_hash(&domain(), &zeroed, 0)
        );
    }

    #[test]
    fn test_refund_amount() {
        let refund = RefundParams {
            gas_hint: 21_000,
            base_fee: 4_000,
            fee_ceiling: 2,
            ..Default::default()
        };
        assert!(refund.is_active());
        assert_eq!(refund.amount(), 50_000);

        let saturating = RefundParams {
            gas_hint: u64::MAX,
            base_fee: u64::MAX,
            fee_ceiling: u128::MAX,
            ..Default::default()
        };
        assert_eq!(saturating.amount(), u128::MAX);

        assert!(!RefundParams::default().is_active());
    }

    #[test]
    fn test_descriptor_json() {
        let json = r#"{"target":"0x00000000000000000000000000000000000000aa","payload":"0x6d696e74"}"#;
        let d: InvocationDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.payload, b"mint".to_vec());
        assert_eq!(d.value, 0);
        assert_eq!(d.mode, CallMode::Direct);
        assert_eq!(d.refund, RefundParams::default());

        let encoded = serde_json::to_string(&d).unwrap();
        assert!(encoded.contains("\"payload\":\"0x6d696e74\""));
    }
}
