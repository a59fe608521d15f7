//! REST API handlers for gateway operations
//!
//! Every mutating handler holds the gateway map's write guard for the whole
//! operation, so approvals and executions on one host never interleave.
//! State is written through [`Storage`] after each successful mutation; if the
//! write fails the in-memory state is rolled back and the request fails.
//!
//! Approvals are authenticated: the approving owner is the address of the
//! public key whose signature over the request hash accompanies the request.

use crate::api::websocket::{WsBroadcaster, WsEvent};
use crate::crypto::{public_key_from_hex, public_key_to_address, verify_signature, Address, Hash256};
use crate::multisig::{ExecutionReceipt, InvocationDescriptor, MultiSig, MultisigError};
use crate::storage::Storage;
use crate::token::TokenManager;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Gateways by name
    pub gateways: Arc<RwLock<HashMap<String, MultiSig>>>,
    pub token_manager: Arc<RwLock<TokenManager>>,
    pub storage: Arc<Storage>,
    pub ws_broadcaster: Arc<WsBroadcaster>,
}

impl ApiState {
    pub fn new(gateways: HashMap<String, MultiSig>, tokens: TokenManager, storage: Storage) -> Self {
        Self {
            gateways: Arc::new(RwLock::new(gateways)),
            token_manager: Arc::new(RwLock::new(tokens)),
            storage: Arc::new(storage),
            ws_broadcaster: Arc::new(WsBroadcaster::new()),
        }
    }
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayInfo {
    pub name: String,
    pub address: Address,
    pub chain_id: u64,
    pub label: Option<String>,
    pub owners: Vec<Address>,
    pub threshold: usize,
    pub nonce: u64,
    /// Hashes with approvals at the current nonce
    pub pending: usize,
}

impl GatewayInfo {
    fn new(name: &str, gateway: &MultiSig) -> Self {
        Self {
            name: name.to_string(),
            address: gateway.address(),
            chain_id: gateway.chain_id(),
            label: gateway.label().map(str::to_string),
            owners: gateway.owners().to_vec(),
            threshold: gateway.threshold(),
            nonce: gateway.nonce(),
            pending: gateway.ledger().pending_at(gateway.nonce()).len(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OwnerResponse {
    pub address: Address,
    pub is_owner: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HashResponse {
    pub hash: Hash256,
    pub nonce: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApprovalsResponse {
    pub hash: Hash256,
    /// Everyone who approved, including since-removed owners
    pub approvers: Vec<Address>,
    /// Approvals from current owners
    pub count: usize,
    pub threshold: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: String,
    pub admin: Address,
    pub compliance: Address,
    pub paused: bool,
    pub transfer_fee_bps: u16,
    pub holder_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HashRequest {
    pub descriptor: InvocationDescriptor,
    /// Defaults to the gateway's current nonce
    pub nonce: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub descriptor: InvocationDescriptor,
    pub nonce: u64,
    pub hash: Hash256,
    /// Hex compressed public key of the approving owner
    pub signer_pubkey: String,
    /// Hex compact signature over `hash`
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    /// Anyone may execute; defaults the refund recipient
    pub caller: Address,
    pub descriptor: InvocationDescriptor,
}

// ============================================================================
// Errors
// ============================================================================

fn api_error(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: error.into(),
        }),
    )
}

fn gateway_not_found(name: &str) -> (StatusCode, Json<ApiError>) {
    api_error(
        StatusCode::NOT_FOUND,
        format!("Gateway not found: {}", name),
    )
}

fn multisig_error(e: MultisigError) -> (StatusCode, Json<ApiError>) {
    let status = match &e {
        MultisigError::NotAnOwner(_) => StatusCode::FORBIDDEN,
        MultisigError::InsufficientApprovals { .. } => StatusCode::CONFLICT,
        MultisigError::InvocationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_REQUEST,
    };
    api_error(status, e.to_string())
}

fn storage_error(e: crate::storage::StorageError) -> (StatusCode, Json<ApiError>) {
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Failed to persist state: {}", e),
    )
}

/// Resolve the approving owner from the request's signature
fn authenticate(req: &ApproveRequest) -> Result<Address, (StatusCode, Json<ApiError>)> {
    let public_key = public_key_from_hex(&req.signer_pubkey)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    let signature = hex::decode(req.signature.strip_prefix("0x").unwrap_or(&req.signature))
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid signature: {}", e)))?;

    match verify_signature(&public_key, &req.hash, &signature) {
        Ok(true) => Ok(public_key_to_address(&public_key)),
        Ok(false) => Err(api_error(
            StatusCode::UNAUTHORIZED,
            "Signature does not match signer and hash",
        )),
        Err(e) => Err(api_error(StatusCode::BAD_REQUEST, e.to_string())),
    }
}

fn parse_address(s: &str) -> Result<Address, (StatusCode, Json<ApiError>)> {
    s.parse()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid address: {}", e)))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Health check
pub async fn health_check() -> &'static str {
    "OK"
}

/// GET /api/gateways - List gateways
pub async fn list_gateways(State(state): State<ApiState>) -> Json<Vec<GatewayInfo>> {
    let gateways = state.gateways.read().await;

    let mut infos: Vec<GatewayInfo> = gateways
        .iter()
        .map(|(name, gw)| GatewayInfo::new(name, gw))
        .collect();
    infos.sort_by(|a, b| a.name.cmp(&b.name));

    Json(infos)
}

/// GET /api/gateways/{name} - Gateway status
pub async fn get_gateway(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<GatewayInfo> {
    let gateways = state.gateways.read().await;

    match gateways.get(&name) {
        Some(gw) => Ok(Json(GatewayInfo::new(&name, gw))),
        None => Err(gateway_not_found(&name)),
    }
}

/// GET /api/gateways/{name}/owners/{address} - Ownership check
pub async fn check_owner(
    State(state): State<ApiState>,
    Path((name, address)): Path<(String, String)>,
) -> ApiResult<OwnerResponse> {
    let address = parse_address(&address)?;
    let gateways = state.gateways.read().await;
    let gw = gateways.get(&name).ok_or_else(|| gateway_not_found(&name))?;

    Ok(Json(OwnerResponse {
        address,
        is_owner: gw.is_owner(&address),
    }))
}

/// POST /api/gateways/{name}/hash - Compute a request hash
pub async fn compute_hash(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(req): Json<HashRequest>,
) -> ApiResult<HashResponse> {
    let gateways = state.gateways.read().await;
    let gw = gateways.get(&name).ok_or_else(|| gateway_not_found(&name))?;

    let nonce = req.nonce.unwrap_or(gw.nonce());
    Ok(Json(HashResponse {
        hash: gw.compute_hash(&req.descriptor, nonce),
        nonce,
    }))
}

/// POST /api/gateways/{name}/approve - Record an owner approval
pub async fn approve(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> ApiResult<ApprovalsResponse> {
    let caller = authenticate(&req)?;

    let mut gateways = state.gateways.write().await;
    let gw = gateways
        .get_mut(&name)
        .ok_or_else(|| gateway_not_found(&name))?;

    let before = gw.clone();
    let hash = gw
        .approve(caller, &req.descriptor, req.nonce, req.hash)
        .map_err(multisig_error)?;

    if let Err(e) = state.storage.save_gateway(&name, gw) {
        log::error!("Failed to save gateway '{}': {}", name, e);
        *gw = before;
        return Err(storage_error(e));
    }

    let count = gw.approval_count(&hash);
    let threshold = gw.threshold();
    state.ws_broadcaster.broadcast(WsEvent::Approved {
        gateway: name.clone(),
        hash,
        approver: caller,
        approvals: count,
        threshold,
    });

    Ok(Json(ApprovalsResponse {
        hash,
        approvers: gw.approvals_for(&hash),
        count,
        threshold,
    }))
}

/// POST /api/gateways/{name}/execute - Execute an approved request
pub async fn execute(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(req): Json<ExecuteRequest>,
) -> ApiResult<ExecutionReceipt> {
    // Lock order: gateways, then tokens
    let mut gateways = state.gateways.write().await;
    let gw = gateways
        .get_mut(&name)
        .ok_or_else(|| gateway_not_found(&name))?;
    let mut tokens = state.token_manager.write().await;
    let (gw_before, tokens_before) = (gw.clone(), tokens.clone());

    match gw.execute(req.caller, &req.descriptor, &mut *tokens) {
        Ok(receipt) => {
            // The advanced nonce must reach disk before the call's effects do
            if let Err(e) = state.storage.save_gateway(&name, gw) {
                log::error!("Failed to save gateway '{}': {}", name, e);
                *gw = gw_before;
                *tokens = tokens_before;
                return Err(storage_error(e));
            }
            if let Err(e) = state.storage.save_tokens(&tokens) {
                log::error!("Failed to save tokens: {}", e);
                *gw = gw_before;
                *tokens = tokens_before;
                if let Err(e) = state.storage.save_gateway(&name, gw) {
                    log::error!("Failed to restore gateway '{}': {}", name, e);
                }
                return Err(storage_error(e));
            }

            state.ws_broadcaster.broadcast(WsEvent::Executed {
                gateway: name,
                hash: receipt.hash,
                nonce: receipt.nonce,
                target: receipt.target,
            });
            Ok(Json(receipt))
        }
        Err(e) => {
            state.ws_broadcaster.broadcast(WsEvent::ExecutionFailed {
                gateway: name,
                hash: gw.compute_hash(&req.descriptor, gw.nonce()),
                error: e.to_string(),
            });
            Err(multisig_error(e))
        }
    }
}

/// GET /api/gateways/{name}/approvals/{hash} - Approvals for a hash
pub async fn get_approvals(
    State(state): State<ApiState>,
    Path((name, hash)): Path<(String, String)>,
) -> ApiResult<ApprovalsResponse> {
    let hash: Hash256 = hash
        .parse()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid hash: {}", e)))?;
    let gateways = state.gateways.read().await;
    let gw = gateways.get(&name).ok_or_else(|| gateway_not_found(&name))?;

    Ok(Json(ApprovalsResponse {
        hash,
        approvers: gw.approvals_for(&hash),
        count: gw.approval_count(&hash),
        threshold: gw.threshold(),
    }))
}

/// GET /api/tokens/{address} - Token info
pub async fn get_token(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<TokenInfo> {
    let address = parse_address(&address)?;
    let manager = state.token_manager.read().await;

    match manager.get(&address) {
        Some(token) => Ok(Json(TokenInfo {
            address: token.address,
            name: token.name().to_string(),
            symbol: token.symbol().to_string(),
            decimals: token.decimals(),
            total_supply: token.total_supply().to_string(),
            admin: token.admin(),
            compliance: token.compliance(),
            paused: token.is_paused(),
            transfer_fee_bps: token.transfer_fee(),
            holder_count: token.holder_count(),
        })),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Token not found: {}", address),
        )),
    }
}
