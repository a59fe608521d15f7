//! CLI commands for the gateway
//!
//! Implements all command handlers for the CLI interface.

use crate::crypto::{Address, Hash256, KeyPair};
use crate::invoke::CallMode;
use crate::multisig::{GatewayConfig, InvocationDescriptor, MultiSig, RefundOutcome, RefundParams};
use crate::storage::{DataDirLock, Storage, StorageConfig};
use crate::token::TokenManager;
use std::path::{Path, PathBuf};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
///
/// Holds the data directory lock for its whole lifetime, so a command's
/// load, mutation and save cannot interleave with another process.
pub struct AppState {
    pub storage: Storage,
    pub tokens: TokenManager,
    pub data_dir: PathBuf,
    _lock: DataDirLock,
}

impl AppState {
    /// Lock the data directory and load deployed tokens
    pub fn new(data_dir: PathBuf) -> CliResult<Self> {
        let storage_config = StorageConfig {
            data_dir: data_dir.clone(),
            ..Default::default()
        };

        let storage = Storage::new(storage_config)?;
        let lock = storage.lock()?;
        let tokens = storage.load_tokens()?;

        Ok(Self {
            storage,
            tokens,
            data_dir,
            _lock: lock,
        })
    }

    pub fn save_tokens(&self) -> CliResult<()> {
        self.storage.save_tokens(&self.tokens)?;
        Ok(())
    }

    /// Accept either a saved gateway name or a literal address
    pub fn resolve_address(&self, name_or_address: &str) -> CliResult<Address> {
        if self.storage.gateway_exists(name_or_address) {
            return Ok(self.storage.load_gateway(name_or_address)?.address());
        }
        Ok(name_or_address.parse()?)
    }
}

/// Call parameters shared by `hash`, `approve` and `execute`
#[derive(clap::Args, Debug, Clone)]
pub struct DescriptorArgs {
    /// Target address, or the name of a saved gateway
    #[arg(short, long)]
    pub target: String,

    /// Payload as hex
    #[arg(long, conflicts_with = "data")]
    pub payload: Option<String>,

    /// Payload as text (e.g. a JSON token or admin call)
    #[arg(long)]
    pub data: Option<String>,

    /// Value forwarded with the call
    #[arg(long, default_value = "0")]
    pub value: u128,

    /// Call mode: direct or context-preserving
    #[arg(long, default_value = "direct")]
    pub mode: CallMode,

    #[arg(long, default_value = "0")]
    pub gas_hint: u64,

    #[arg(long, default_value = "0")]
    pub base_fee: u64,

    /// Refund price per gas unit; 0 disables refunds
    #[arg(long, default_value = "0")]
    pub fee_ceiling: u128,

    /// Refund asset (token address); native if omitted
    #[arg(long)]
    pub fee_asset: Option<String>,

    /// Refund recipient; the executing caller if omitted
    #[arg(long)]
    pub refund_recipient: Option<String>,
}

impl DescriptorArgs {
    pub fn to_descriptor(&self, state: &AppState) -> CliResult<InvocationDescriptor> {
        let payload = match (&self.payload, &self.data) {
            (Some(hex_payload), _) => {
                hex::decode(hex_payload.strip_prefix("0x").unwrap_or(hex_payload))?
            }
            (None, Some(text)) => text.as_bytes().to_vec(),
            (None, None) => Vec::new(),
        };

        let refund = RefundParams {
            gas_hint: self.gas_hint,
            base_fee: self.base_fee,
            fee_ceiling: self.fee_ceiling,
            fee_asset: self.fee_asset.as_deref().map(str::parse).transpose()?,
            refund_recipient: self
                .refund_recipient
                .as_deref()
                .map(str::parse)
                .transpose()?,
        };

        Ok(
            InvocationDescriptor::call(state.resolve_address(&self.target)?, payload)
                .with_value(self.value)
                .with_mode(self.mode)
                .with_refund(refund),
        )
    }
}

/// Generate a new key pair
pub fn cmd_keygen() -> CliResult<()> {
    let keypair = KeyPair::generate();

    println!("🔐 New key pair generated!");
    println!("   📍 Address: {}", keypair.address());
    println!("   🔑 Public Key: {}", keypair.public_key_hex());
    println!("   🗝️  Private Key: {}", keypair.private_key_hex());
    println!("\n   ⚠️  IMPORTANT: Store the private key safely. It is not saved anywhere.");

    Ok(())
}

/// Sign a request hash for submission to the HTTP approve endpoint
pub fn cmd_sign(private_key: &str, hash: &str) -> CliResult<String> {
    let keypair = KeyPair::from_private_key_hex(private_key)?;
    let hash: Hash256 = hash.parse()?;
    let signature = hex::encode(keypair.sign(&hash));

    println!("✍️  Signed {}", hash);
    println!("   ├─ Signer: {}", keypair.address());
    println!("   ├─ signer_pubkey: {}", keypair.public_key_hex());
    println!("   └─ signature: {}", signature);

    Ok(signature)
}

/// Create and save a new gateway
pub fn cmd_init(
    data_dir: &Path,
    name: &str,
    owners: &[String],
    threshold: usize,
    chain_id: Option<u64>,
    label: Option<&str>,
) -> CliResult<()> {
    let storage = Storage::new(StorageConfig {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    })?;
    let _lock = storage.lock()?;

    if storage.gateway_exists(name) {
        println!("⚠️  Gateway '{}' already exists at {:?}", name, data_dir);
        return Ok(());
    }

    let owners = owners
        .iter()
        .map(|o| o.parse::<Address>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut config = GatewayConfig::new(owners, threshold).with_label(label.unwrap_or(name));
    if let Some(chain_id) = chain_id {
        config = config.with_chain_id(chain_id);
    }

    let mut gateway = MultiSig::new(config)?;
    storage.save_gateway(name, &mut gateway)?;

    println!("✅ Gateway '{}' initialized!", name);
    println!("   📍 Address: {}", gateway.address());
    println!("   🔐 Policy: {}", gateway.owner_set().description());
    println!("   🌐 Chain ID: {}", gateway.chain_id());
    println!("   📁 Data directory: {:?}", data_dir);

    Ok(())
}

/// Show gateway state
pub fn cmd_status(state: &AppState, name: &str) -> CliResult<()> {
    let gateway = state.storage.load_gateway(name)?;

    println!("🏛️  Gateway '{}'", name);
    println!("   ├─ Address: {}", gateway.address());
    println!("   ├─ Chain ID: {}", gateway.chain_id());
    println!("   ├─ Policy: {}", gateway.owner_set().description());
    println!("   ├─ Nonce: {}", gateway.nonce());
    println!("   └─ Owners:");
    for owner in gateway.owners() {
        println!("      └─ {}", owner);
    }

    let pending = gateway.ledger().pending_at(gateway.nonce());
    if !pending.is_empty() {
        println!("\n   ⏳ Pending at nonce {}:", gateway.nonce());
        for (hash, _) in pending {
            println!(
                "   └─ {} ({}/{})",
                hash,
                gateway.approval_count(hash),
                gateway.threshold()
            );
        }
    }

    Ok(())
}

/// Print the hash owners must approve
pub fn cmd_hash(state: &AppState, name: &str, args: &DescriptorArgs, nonce: Option<u64>) -> CliResult<()> {
    let gateway = state.storage.load_gateway(name)?;
    let descriptor = args.to_descriptor(state)?;
    let nonce = nonce.unwrap_or(gateway.nonce());

    println!("🧾 Request hash at nonce {}:", nonce);
    println!("   {}", gateway.compute_hash(&descriptor, nonce));

    Ok(())
}

/// Approve a request as the owner holding `private_key`
pub fn cmd_approve(
    state: &AppState,
    name: &str,
    private_key: &str,
    args: &DescriptorArgs,
    nonce: Option<u64>,
    expected_hash: Option<&str>,
) -> CliResult<()> {
    let keypair = KeyPair::from_private_key_hex(private_key)?;
    let mut gateway = state.storage.load_gateway(name)?;
    let descriptor = args.to_descriptor(state)?;
    let nonce = nonce.unwrap_or(gateway.nonce());

    let expected = match expected_hash {
        Some(h) => h.parse()?,
        None => gateway.compute_hash(&descriptor, nonce),
    };

    let hash = gateway.approve(keypair.address(), &descriptor, nonce, expected)?;
    state.storage.save_gateway(name, &mut gateway)?;

    println!("✍️  Approved by {}", keypair.address());
    println!("   ├─ Hash: {}", hash);
    println!(
        "   └─ Approvals: {}/{}",
        gateway.approval_count(&hash),
        gateway.threshold()
    );

    Ok(())
}

/// Execute an approved request against the local token set
pub fn cmd_execute(state: &mut AppState, name: &str, caller: &str, args: &DescriptorArgs) -> CliResult<()> {
    let caller: Address = caller.parse()?;
    let mut gateway = state.storage.load_gateway(name)?;
    let descriptor = args.to_descriptor(state)?;

    let receipt = match gateway.execute(caller, &descriptor, &mut state.tokens) {
        Ok(receipt) => receipt,
        Err(e) => {
            println!("❌ Execution failed: {}", e);
            return Err(e.into());
        }
    };

    state.storage.save_gateway(name, &mut gateway)?;
    state.save_tokens()?;

    println!("✅ Executed at nonce {}", receipt.nonce);
    println!("   ├─ Hash: {}", receipt.hash);
    println!("   ├─ Target: {}", receipt.target);
    println!("   ├─ Returned: {} bytes", receipt.return_data.len());
    match &receipt.refund {
        RefundOutcome::Skipped => println!("   └─ Refund: none"),
        RefundOutcome::Paid { request } => {
            println!("   └─ Refund: {} paid to {}", request.amount, request.recipient)
        }
        RefundOutcome::Failed { reason, .. } => println!("   └─ Refund failed: {}", reason),
    }

    Ok(())
}

/// Deploy a managed token
pub fn cmd_token_deploy(
    state: &mut AppState,
    name: &str,
    symbol: &str,
    decimals: u8,
    creator: &str,
    admin: &str,
    compliance: &str,
) -> CliResult<()> {
    let creator: Address = creator.parse()?;
    let admin = state.resolve_address(admin)?;
    let compliance = state.resolve_address(compliance)?;

    let address = state.tokens.deploy(
        name.to_string(),
        symbol.to_string(),
        decimals,
        &creator,
        admin,
        compliance,
    )?;
    state.save_tokens()?;

    println!("🪙 Token {} deployed!", symbol);
    println!("   ├─ Address: {}", address);
    println!("   ├─ Admin: {}", admin);
    println!("   └─ Compliance: {}", compliance);

    Ok(())
}

/// Show token info
pub fn cmd_token_info(state: &AppState, address: &str) -> CliResult<()> {
    let address: Address = address.parse()?;
    let token = state
        .tokens
        .get(&address)
        .ok_or_else(|| format!("Token not found: {}", address))?;

    println!("🪙 {} ({})", token.name(), token.symbol());
    println!("   ├─ Address: {}", token.address);
    println!("   ├─ Decimals: {}", token.decimals());
    println!("   ├─ Total supply: {}", token.total_supply());
    println!("   ├─ Holders: {}", token.holder_count());
    println!("   ├─ Transfer fee: {} bps", token.transfer_fee());
    println!("   ├─ Paused: {}", token.is_paused());
    println!("   ├─ Admin: {}", token.admin());
    println!("   └─ Compliance: {}", token.compliance());

    Ok(())
}

/// Show a holder's token balance
pub fn cmd_token_balance(state: &AppState, address: &str, holder: &str) -> CliResult<()> {
    let address: Address = address.parse()?;
    let holder = state.resolve_address(holder)?;
    let balance = state.tokens.balance_of(&address, &holder)?;

    println!("💰 Balance of {} in {}: {}", holder, address, balance);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenCall;

    fn descriptor_args(target: &str, data: Option<String>) -> DescriptorArgs {
        DescriptorArgs {
            target: target.to_string(),
            payload: None,
            data,
            value: 0,
            mode: CallMode::Direct,
            gas_hint: 0,
            base_fee: 0,
            fee_ceiling: 0,
            fee_asset: None,
            refund_recipient: None,
        }
    }

    #[test]
    fn test_init_approve_execute() {
        let temp_dir = tempfile::tempdir().unwrap();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let owners = vec![alice.address().to_string(), bob.address().to_string()];

        cmd_init(temp_dir.path(), "treasury", &owners, 2, None, None).unwrap();
        let mut state = AppState::new(temp_dir.path().to_path_buf()).unwrap();

        // Gateway names resolve to addresses
        let gateway = state.storage.load_gateway("treasury").unwrap();
        assert_eq!(state.resolve_address("treasury").unwrap(), gateway.address());

        cmd_token_deploy(
            &mut state,
            "Gold",
            "XAU",
            6,
            &alice.address().to_string(),
            "treasury",
            "treasury",
        )
        .unwrap();
        let token = state.tokens.list()[0].address;

        let mint = TokenCall::Mint {
            to: alice.address(),
            amount: 10,
        }
        .encode()
        .unwrap();
        let args = descriptor_args(&token.to_string(), Some(String::from_utf8(mint).unwrap()));

        cmd_approve(&state, "treasury", &alice.private_key_hex(), &args, None, None).unwrap();
        let relayer = Address::derive(b"relayer").to_string();
        assert!(cmd_execute(&mut state, "treasury", &relayer, &args).is_err());

        cmd_approve(&state, "treasury", &bob.private_key_hex(), &args, None, None).unwrap();
        cmd_execute(&mut state, "treasury", &relayer, &args).unwrap();
        drop(state);

        let reloaded = AppState::new(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(reloaded.storage.load_gateway("treasury").unwrap().nonce(), 1);
        assert_eq!(reloaded.tokens.balance_of(&token, &alice.address()).unwrap(), 10);
    }

    #[test]
    fn test_approve_with_wrong_hash_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let alice = KeyPair::generate();
        cmd_init(
            temp_dir.path(),
            "solo",
            &[alice.address().to_string()],
            1,
            Some(7),
            None,
        )
        .unwrap();
        let state = AppState::new(temp_dir.path().to_path_buf()).unwrap();
        let args = descriptor_args(&Address::derive(b"t").to_string(), None);

        let wrong = Hash256::digest(b"other").to_hex();
        assert!(cmd_approve(&state, "solo", &alice.private_key_hex(), &args, None, Some(&wrong)).is_err());
        assert_eq!(state.storage.load_gateway("solo").unwrap().chain_id(), 7);
    }

    #[test]
    fn test_sign_produces_verifiable_signature() {
        let alice = KeyPair::generate();
        let hash = Hash256::digest(b"request");

        let signature = cmd_sign(&alice.private_key_hex(), &hash.to_hex()).unwrap();
        let bytes = hex::decode(signature).unwrap();
        assert!(crate::crypto::verify_signature(&alice.public_key, &hash, &bytes).unwrap());

        assert!(cmd_sign(&alice.private_key_hex(), "0x1234").is_err());
    }

    #[test]
    fn test_app_state_holds_data_dir_lock() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = AppState::new(temp_dir.path().to_path_buf()).unwrap();

        // Another process (here: another handle) cannot take the directory
        assert!(matches!(
            state.storage.clone().try_lock(),
            Err(crate::storage::StorageError::Locked(_))
        ));

        drop(state);
        let again = AppState::new(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(again.tokens.count(), 0);
    }

    #[test]
    fn test_descriptor_args_payload_forms() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = AppState::new(temp_dir.path().to_path_buf()).unwrap();
        let target = Address::derive(b"t").to_string();

        let mut args = descriptor_args(&target, None);
        args.payload = Some("0xdeadbeef".to_string());
        args.fee_ceiling = 3;
        let d = args.to_descriptor(&state).unwrap();
        assert_eq!(d.payload, vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(d.refund.is_active());

        let d = descriptor_args(&target, Some("hi".to_string()))
            .to_descriptor(&state)
            .unwrap();
        assert_eq!(d.payload, b"hi".to_vec());

        assert!(descriptor_args("not-an-address", None)
            .to_descriptor(&state)
            .is_err());
    }
}
