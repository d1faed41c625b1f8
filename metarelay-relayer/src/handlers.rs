//! Axum route handlers for the relay service.

use std::collections::BTreeMap;

use alloy_primitives::{Address, TxHash, U256};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use metarelay::encoding::{decimal_u256, lowercase_address};
use metarelay::{
    ChainRpc, DeploymentConfig, RegistrationEvent, RelayReceipt, RelayStatus, SignedRequest,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::RelayerState;

/// `GET /deployments/{tag}/nonce/{owner}` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceResponse {
    /// Account queried.
    #[serde(with = "lowercase_address")]
    pub owner: Address,
    /// Forwarder queried.
    #[serde(with = "lowercase_address")]
    pub forwarder: Address,
    /// Nonce the next request from `owner` must carry.
    #[serde(with = "decimal_u256")]
    pub nonce: U256,
}

/// Filter for `GET /deployments/{tag}/registrations`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RegistrationQuery {
    /// Only events registered by this account.
    pub who: Option<Address>,
}

/// `GET /health`
pub async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /deployments` - configured deployments by tag.
pub async fn get_deployments<R>(
    State(relayer): State<RelayerState<R>>,
) -> Json<BTreeMap<String, DeploymentConfig>> {
    Json(
        relayer
            .iter()
            .map(|(tag, d)| (tag.to_owned(), d.config.clone()))
            .collect(),
    )
}

/// `GET /deployments/{tag}/nonce/{owner}`
///
/// # Errors
///
/// 404 for unknown tags, 503 when the node is unreachable.
pub async fn get_nonce<R: ChainRpc>(
    State(relayer): State<RelayerState<R>>,
    Path((tag, owner)): Path<(String, Address)>,
) -> Result<Json<NonceResponse>, ApiError> {
    let deployment = relayer.get(&tag)?;
    let forwarder = deployment.config.forwarder;
    let nonce = deployment.nonces.current_nonce(forwarder, owner).await?;
    Ok(Json(NonceResponse {
        owner,
        forwarder,
        nonce,
    }))
}

/// `POST /deployments/{tag}/relay` - submits a signed request.
///
/// Answers 200 with the receipt once mined (successfully or not) and 202
/// when the receipt deadline passed first; poll the receipts endpoint then.
///
/// # Errors
///
/// 400 for bad signatures, 409 for stale nonces or while the holder's
/// previous broadcast is unresolved, 422 when simulation reverts.
pub async fn post_relay<R: ChainRpc>(
    State(relayer): State<RelayerState<R>>,
    Path(tag): Path<String>,
    Json(signed): Json<SignedRequest>,
) -> Result<(StatusCode, Json<RelayReceipt>), ApiError> {
    let deployment = relayer.get(&tag)?;
    let receipt = deployment.submitter.submit(signed).await?;
    let status = match receipt.status {
        RelayStatus::Success | RelayStatus::Reverted => StatusCode::OK,
        RelayStatus::Pending | RelayStatus::Unknown => StatusCode::ACCEPTED,
    };
    tracing::info!(
        deployment = %tag,
        tx_hash = %receipt.transaction_hash,
        status = ?receipt.status,
        "relayed"
    );
    Ok((status, Json(receipt)))
}

/// `GET /deployments/{tag}/receipts/{tx_hash}`
///
/// # Errors
///
/// 404 for unknown tags, 503 when the node is unreachable.
pub async fn get_receipt<R: ChainRpc>(
    State(relayer): State<RelayerState<R>>,
    Path((tag, tx_hash)): Path<(String, TxHash)>,
) -> Result<Json<RelayReceipt>, ApiError> {
    let deployment = relayer.get(&tag)?;
    Ok(Json(deployment.submitter.poll_receipt(tx_hash).await?))
}

/// `GET /deployments/{tag}/registrations[?who=0x..]` - the reconciled
/// projection in chain order.
///
/// # Errors
///
/// 404 for unknown tags.
pub async fn get_registrations<R>(
    State(relayer): State<RelayerState<R>>,
    Path(tag): Path<String>,
    Query(query): Query<RegistrationQuery>,
) -> Result<Json<Vec<RegistrationEvent>>, ApiError> {
    let deployment = relayer.get(&tag)?;
    let ledger = deployment.ledger.read().await;
    let events = match query.who {
        Some(who) => ledger.by_account(who).cloned().collect(),
        None => ledger.events().cloned().collect(),
    };
    Ok(Json(events))
}

/// Builds the relay service router.
///
/// Endpoints:
/// - `GET /health`
/// - `GET /deployments`
/// - `GET /deployments/{tag}/nonce/{owner}`
/// - `POST /deployments/{tag}/relay`
/// - `GET /deployments/{tag}/receipts/{tx_hash}`
/// - `GET /deployments/{tag}/registrations`
pub fn relayer_router<R>(state: RelayerState<R>) -> Router
where
    R: ChainRpc + Clone + 'static,
{
    Router::new()
        .route("/health", get(get_health))
        .route("/deployments", get(get_deployments::<R>))
        .route("/deployments/{tag}/nonce/{owner}", get(get_nonce::<R>))
        .route("/deployments/{tag}/relay", post(post_relay::<R>))
        .route("/deployments/{tag}/receipts/{tx_hash}", get(get_receipt::<R>))
        .route("/deployments/{tag}/registrations", get(get_registrations::<R>))
        .with_state(state)
}
