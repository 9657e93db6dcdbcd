//! HTTP API server for the Tierpay node.
//!
//! The acting node is named in the `x-tierpay-actor` header. Its capability
//! bits, and for node-scoped calls its place in the hierarchy, are checked
//! before the engine is called.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use tierpay_core::{
    Amount, Capabilities, ChannelId, GatewayId, NodeId, Outcome, Rate, TransactionId, TxnKind,
};
use tierpay_pricing::{
    EffectiveRate, HierarchyNode, NodeChannelOverride, PayoutChargeConfig, PayoutChargeRecord,
    PayoutScope, PricingError,
};
use tierpay_settlement::{
    EngineStats, LedgerEntry, LedgerError, SettleResult, SettlementError, Transaction,
    WalletBalance,
};

use crate::state::NodeState;

pub const ACTOR_HEADER: &str = "x-tierpay-actor";

// --- Request / response types ---

#[derive(Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub nodes: usize,
    pub channels: usize,
    pub engine: EngineStats,
}

#[derive(Deserialize)]
pub struct RateQuery {
    pub kind: Option<TxnKind>,
}

#[derive(Deserialize)]
pub struct AssignRateRequest {
    pub node: NodeId,
    pub channel: ChannelId,
    /// Decimal percent, e.g. `"1.65"`.
    pub rate: String,
}

#[derive(Deserialize)]
pub struct PayoutConfigRequest {
    pub scope: PayoutScope,
    pub gateway: GatewayId,
    pub config: PayoutChargeConfig,
}

#[derive(Deserialize)]
pub struct PayoutChargeRequest {
    pub config: PayoutChargeConfig,
    pub amount: Amount,
}

#[derive(Serialize, Deserialize)]
pub struct PayoutChargeResponse {
    pub amount: Amount,
    pub charge: Amount,
    pub total_debit: Amount,
}

#[derive(Deserialize)]
pub struct PayinRequest {
    /// Defaults to the actor.
    #[serde(default)]
    pub initiator: Option<NodeId>,
    pub channel: ChannelId,
    pub amount: Amount,
}

#[derive(Deserialize)]
pub struct PayoutRequest {
    #[serde(default)]
    pub initiator: Option<NodeId>,
    /// Defaults to the active payout routing version.
    #[serde(default)]
    pub gateway: Option<GatewayId>,
    pub amount: Amount,
}

#[derive(Deserialize)]
pub struct SettleRequest {
    pub outcome: Outcome,
}

#[derive(Serialize, Deserialize)]
pub struct SettleResponse {
    pub result: SettleResult,
    pub transaction: Transaction,
}

#[derive(Serialize, Deserialize)]
pub struct WalletResponse {
    pub node_id: NodeId,
    #[serde(flatten)]
    pub balance: WalletBalance,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustAction {
    Credit,
    Debit,
    Transfer,
}

#[derive(Deserialize)]
pub struct AdjustWalletRequest {
    pub action: AdjustAction,
    pub amount: Amount,
    /// Transfer destination.
    #[serde(default)]
    pub to: Option<NodeId>,
    /// Idempotency reference; a fresh one is generated when absent.
    #[serde(default)]
    pub reference: Option<TransactionId>,
}

#[derive(Serialize, Deserialize)]
pub struct AdjustWalletResponse {
    pub reference: TransactionId,
    pub duplicate: bool,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

fn status_for(e: &SettlementError) -> StatusCode {
    match e {
        SettlementError::Pricing(p) => match p {
            PricingError::UnknownNode(_)
            | PricingError::UnknownChannel(_)
            | PricingError::UnknownPlan(_) => StatusCode::NOT_FOUND,
            PricingError::Forbidden(_) | PricingError::NotDescendant { .. } => StatusCode::FORBIDDEN,
            PricingError::LockPoisoned => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        },
        SettlementError::Ledger(LedgerError::LockPoisoned) => StatusCode::INTERNAL_SERVER_ERROR,
        SettlementError::Ledger(_) | SettlementError::AlreadyExists(_) => StatusCode::CONFLICT,
        SettlementError::Core(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SettlementError::TransactionNotFound(_) | SettlementError::SourceNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        SettlementError::Source(_)
        | SettlementError::InvalidSnapshot(_)
        | SettlementError::Journal(_)
        | SettlementError::LockPoisoned => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn engine_error(e: impl Into<SettlementError>) -> ApiError {
    let e = e.into();
    api_error(status_for(&e), e.to_string())
}

// --- Access checks ---

fn actor(state: &NodeState, headers: &HeaderMap, required: Capabilities) -> Result<HierarchyNode, ApiError> {
    let id = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, format!("missing {ACTOR_HEADER} header")))?;

    let node = state.directory().node(&NodeId::new(id)).map_err(|e| match e {
        PricingError::UnknownNode(_) => api_error(StatusCode::FORBIDDEN, format!("unknown actor {id}")),
        other => engine_error(other),
    })?;

    if !node.capabilities.contains(required) {
        tracing::warn!(actor = %node.id, required = ?required.names(), "capability check failed");
        return Err(api_error(
            StatusCode::FORBIDDEN,
            format!("{} lacks {}", node.id, required.names().join(", ")),
        ));
    }
    Ok(node)
}

/// The actor may act on itself and on anything below it.
fn require_scope(state: &NodeState, actor: &HierarchyNode, node: &NodeId) -> Result<(), ApiError> {
    if &actor.id == node {
        return Ok(());
    }
    let below = state
        .directory()
        .with_state(|s| s.hierarchy().is_descendant(&actor.id, node))
        .and_then(|r| r)
        .map_err(engine_error)?;
    if below {
        Ok(())
    } else {
        Err(api_error(
            StatusCode::FORBIDDEN,
            format!("{node} is outside the hierarchy of {}", actor.id),
        ))
    }
}

// --- Handlers ---

async fn handle_status(State(state): State<Arc<NodeState>>) -> ApiResult<StatusResponse> {
    let nodes = state.directory().node_count().map_err(engine_error)?;
    let channels = state.directory().channels().map_err(engine_error)?.len();
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        nodes,
        channels,
        engine: state.engine.stats(),
    }))
}

async fn handle_resolve_rate(
    State(state): State<Arc<NodeState>>,
    Path((node, channel)): Path<(String, String)>,
    Query(query): Query<RateQuery>,
    headers: HeaderMap,
) -> ApiResult<EffectiveRate> {
    let actor = actor(&state, &headers, Capabilities::NONE)?;
    let node = NodeId::new(node);
    let channel = ChannelId::new(channel);
    require_scope(&state, &actor, &node)?;

    let kind = match query.kind {
        Some(kind) => kind,
        None => state
            .directory()
            .with_state(|s| s.require_channel(&channel).map(|c| c.kind))
            .and_then(|r| r)
            .map_err(engine_error)?,
    };
    state
        .engine
        .resolve_effective_rate(&node, &channel, kind)
        .map(Json)
        .map_err(engine_error)
}

async fn handle_assign_rate(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
    Json(req): Json<AssignRateRequest>,
) -> ApiResult<NodeChannelOverride> {
    let actor = actor(&state, &headers, Capabilities::ASSIGN_RATES)?;
    let rate = Rate::parse_percent(&req.rate).map_err(engine_error)?;
    state
        .engine
        .assign_rate(&actor.id, &req.node, &req.channel, rate)
        .map(Json)
        .map_err(engine_error)
}

async fn handle_assign_payout_config(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
    Json(req): Json<PayoutConfigRequest>,
) -> ApiResult<PayoutChargeRecord> {
    let actor = actor(&state, &headers, Capabilities::MANAGE_PAYOUT_CHARGES)?;
    state
        .engine
        .assign_payout_config(&actor.id, req.scope, &req.gateway, req.config)
        .map(Json)
        .map_err(engine_error)
}

async fn handle_payout_charge(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<PayoutChargeRequest>,
) -> ApiResult<PayoutChargeResponse> {
    let charge = state
        .engine
        .payout_charge(&req.config, req.amount)
        .map_err(engine_error)?;
    let total_debit = req
        .amount
        .checked_add(charge)
        .ok_or_else(|| api_error(StatusCode::UNPROCESSABLE_ENTITY, "amount plus charge overflows"))?;
    Ok(Json(PayoutChargeResponse {
        amount: req.amount,
        charge,
        total_debit,
    }))
}

async fn handle_create_payin(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
    Json(req): Json<PayinRequest>,
) -> ApiResult<Transaction> {
    let actor = actor(&state, &headers, Capabilities::NONE)?;
    let initiator = req.initiator.unwrap_or_else(|| actor.id.clone());
    require_scope(&state, &actor, &initiator)?;
    state
        .engine
        .create_payin(&initiator, &req.channel, req.amount)
        .map(Json)
        .map_err(engine_error)
}

async fn handle_create_payout(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
    Json(req): Json<PayoutRequest>,
) -> ApiResult<Transaction> {
    let actor = actor(&state, &headers, Capabilities::NONE)?;
    let initiator = req.initiator.unwrap_or_else(|| actor.id.clone());
    require_scope(&state, &actor, &initiator)?;
    state
        .engine
        .create_payout(&initiator, req.gateway.as_ref(), req.amount)
        .map(Json)
        .map_err(engine_error)
}

fn parse_txn_id(id: &str) -> Result<TransactionId, ApiError> {
    id.parse::<TransactionId>()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))
}

async fn handle_get_transaction(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Transaction> {
    let actor = actor(&state, &headers, Capabilities::NONE)?;
    let txn = state
        .engine
        .transaction(&parse_txn_id(&id)?)
        .map_err(engine_error)?;
    require_scope(&state, &actor, &txn.initiator)?;
    Ok(Json(txn))
}

async fn handle_settle(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SettleRequest>,
) -> ApiResult<SettleResponse> {
    let actor = actor(&state, &headers, Capabilities::SETTLE_TRANSACTIONS)?;
    let id = parse_txn_id(&id)?;
    tracing::info!(actor = %actor.id, txn_id = %id, outcome = %req.outcome, "settlement requested");

    let result = state.engine.settle(id, req.outcome).map_err(engine_error)?;
    let transaction = state.engine.transaction(&id).map_err(engine_error)?;
    Ok(Json(SettleResponse { result, transaction }))
}

async fn handle_get_wallet(
    State(state): State<Arc<NodeState>>,
    Path(node): Path<String>,
    headers: HeaderMap,
) -> ApiResult<WalletResponse> {
    let actor = actor(&state, &headers, Capabilities::VIEW_WALLETS)?;
    let node = NodeId::new(node);
    require_scope(&state, &actor, &node)?;
    state.directory().node(&node).map_err(engine_error)?;

    let balance = state.engine.wallet_balance(&node).map_err(engine_error)?;
    let entries = state.engine.ledger_entries(&node);
    Ok(Json(WalletResponse {
        node_id: node,
        balance,
        entries,
    }))
}

async fn handle_adjust_wallet(
    State(state): State<Arc<NodeState>>,
    Path(node): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AdjustWalletRequest>,
) -> ApiResult<AdjustWalletResponse> {
    let actor = actor(&state, &headers, Capabilities::ADJUST_WALLETS)?;
    let node = NodeId::new(node);
    require_scope(&state, &actor, &node)?;
    let reference = req.reference.unwrap_or_default();

    let applied = match req.action {
        AdjustAction::Credit => state.engine.credit_wallet(reference, &node, req.amount),
        AdjustAction::Debit => state.engine.debit_wallet(reference, &node, req.amount),
        AdjustAction::Transfer => {
            let to = req
                .to
                .ok_or_else(|| api_error(StatusCode::UNPROCESSABLE_ENTITY, "transfer needs a destination"))?;
            require_scope(&state, &actor, &to)?;
            state.engine.transfer(reference, &node, &to, req.amount)
        }
    }
    .map_err(engine_error)?;

    tracing::info!(actor = %actor.id, node = %node, action = ?req.action, %reference, "wallet adjusted");
    Ok(Json(AdjustWalletResponse {
        reference,
        duplicate: applied.is_duplicate(),
        entries: applied.entries().to_vec(),
    }))
}

// --- Server ---

pub fn build_router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/api/v1/status", get(handle_status))
        .route("/api/v1/rates", post(handle_assign_rate))
        .route("/api/v1/rates/{node}/{channel}", get(handle_resolve_rate))
        .route("/api/v1/payout-configs", post(handle_assign_payout_config))
        .route("/api/v1/payout-charge", post(handle_payout_charge))
        .route("/api/v1/transactions/payin", post(handle_create_payin))
        .route("/api/v1/transactions/payout", post(handle_create_payout))
        .route("/api/v1/transactions/{id}", get(handle_get_transaction))
        .route("/api/v1/transactions/{id}/settle", post(handle_settle))
        .route("/api/v1/wallets/{node}", get(handle_get_wallet))
        .route("/api/v1/wallets/{node}/adjust", post(handle_adjust_wallet))
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: Arc<NodeState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP API server started");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
