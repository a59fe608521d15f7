//! REST API module
//!
//! Provides HTTP access to a host's gateways.
//!
//! # Endpoints
//!
//! ## Gateways
//! - `GET /api/gateways` - List gateways
//! - `GET /api/gateways/{name}` - Owners, threshold and nonce
//! - `GET /api/gateways/{name}/owners/{address}` - Ownership check
//! - `POST /api/gateways/{name}/hash` - Compute a request hash
//! - `POST /api/gateways/{name}/approve` - Record an approval signed by an owner
//! - `POST /api/gateways/{name}/execute` - Execute an approved request
//! - `GET /api/gateways/{name}/approvals/{hash}` - Approvals for a hash
//!
//! ## Tokens
//! - `GET /api/tokens/{address}` - Token info
//!
//! ## WebSocket
//! - `GET /ws` - Real-time updates (Approved, Executed, ExecutionFailed)

pub mod handlers;
pub mod routes;
pub mod websocket;

pub use handlers::ApiState;
pub use routes::create_router;
pub use websocket::{WsBroadcaster, WsEvent};
