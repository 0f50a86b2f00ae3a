//! HTTP adapter.
//!
//! Translates requests into calls on the node [`Runtime`] and formats the
//! answers. Field presence is checked here so the ledger only ever sees
//! complete transactions.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::net::TcpListener;

use crate::peers::PeerAddr;
use crate::runtime::{Runtime, RuntimeError};
use crate::sync::ChainSnapshot;
use crate::types::{Block, Transaction};

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    Runtime(RuntimeError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Runtime(RuntimeError::PeerError(e)) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Runtime(e) => {
                tracing::error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        ApiError::Runtime(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct MineResponse {
    pub message: String,
    pub index: u64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

impl From<Block> for MineResponse {
    fn from(block: Block) -> Self {
        MineResponse {
            message: "New Block Forged".to_string(),
            index: block.index,
            transactions: block.transactions,
            proof: block.proof,
            previous_hash: block.previous_hash,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewTransactionRequest {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub amount: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterNodesRequest {
    pub nodes: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterNodesResponse {
    pub message: String,
    pub total_nodes: Vec<PeerAddr>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub message: String,
    pub chain: Vec<Block>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn mine(State(node): State<Runtime>) -> Result<Json<MineResponse>, ApiError> {
    let block = node.mine().await?;
    Ok(Json(block.into()))
}

async fn new_transaction(
    State(node): State<Runtime>,
    Json(request): Json<NewTransactionRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let (sender, recipient, amount) = match request {
        NewTransactionRequest {
            sender: Some(sender),
            recipient: Some(recipient),
            amount: Some(amount),
        } => (sender, recipient, amount),
        _ => return Err(ApiError::InvalidInput("Missing values".to_string())),
    };

    let index = node.submit_transaction(&sender, &recipient, amount).await;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: format!("Transaction will be added to Block {}", index),
        }),
    ))
}

async fn full_chain(State(node): State<Runtime>) -> Json<ChainSnapshot> {
    Json(node.chain().await)
}

async fn register_nodes(
    State(node): State<Runtime>,
    Json(request): Json<RegisterNodesRequest>,
) -> Result<(StatusCode, Json<RegisterNodesResponse>), ApiError> {
    let nodes = match request.nodes {
        Some(nodes) if !nodes.is_empty() => nodes,
        _ => {
            return Err(ApiError::InvalidInput(
                "Please supply a valid list of nodes".to_string(),
            ))
        }
    };

    let total_nodes = node.register_peers(nodes.as_slice()).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterNodesResponse {
            message: "New nodes have been added".to_string(),
            total_nodes,
        }),
    ))
}

async fn list_nodes(State(node): State<Runtime>) -> Json<Vec<PeerAddr>> {
    Json(node.peers().await)
}

async fn consensus(State(node): State<Runtime>) -> Result<Json<ResolveResponse>, ApiError> {
    let (resolution, snapshot) = node.resolve().await?;
    let message = if resolution.is_replaced() {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };
    Ok(Json(ResolveResponse {
        message: message.to_string(),
        chain: snapshot.chain,
    }))
}

// ============================================================================
// Middleware
// ============================================================================

async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );
    response
}

// ============================================================================
// API Server
// ============================================================================

pub fn build_router(node: Runtime) -> Router {
    Router::new()
        .route("/mine", get(mine))
        .route("/transactions/new", post(new_transaction))
        .route("/chain", get(full_chain))
        .route("/nodes", get(list_nodes))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/resolve", get(consensus))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(node)
}

pub async fn serve(node: Runtime, addr: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("HTTP API listening on {}", listener.local_addr()?);
    axum::serve(listener, build_router(node)).await
}
