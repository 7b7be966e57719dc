//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the vault over HTTP. All endpoints
//! share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Description                          |
//! |--------|-----------------------------|--------------------------------------|
//! | GET    | `/health`                   | Liveness probe                       |
//! | GET    | `/status`                   | Aggregate solvency snapshot          |
//! | POST   | `/faucet`                   | Mint test assets to a participant    |
//! | POST   | `/deposit`                  | Deposit collateral                   |
//! | POST   | `/borrow`                   | Queue a gated borrow                 |
//! | POST   | `/withdraw`                 | Queue a gated withdrawal             |
//! | POST   | `/repay`                    | Queue a clamped repayment            |
//! | POST   | `/relay`                    | Answer queued decryptions now        |
//! | GET    | `/positions/:address`       | Encrypted slots and wallet balances  |
//! | GET    | `/pending`                  | In-flight operations                 |
//! | GET    | `/pending/:id`              | One in-flight operation              |
//! | GET    | `/events`                   | Recently published vault events      |
//! | GET    | `/ws`                       | WebSocket for live vault events      |
//! | POST   | `/admin/pause`              | Pause (owner only)                   |
//! | POST   | `/admin/unpause`            | Unpause (owner only)                 |
//! | POST   | `/admin/transfer-ownership` | Hand over ownership (owner only)     |
//!
//! Encrypted inputs are produced server-side on the participant's behalf
//! with the node's local backend. The API never decrypts a stored balance:
//! positions expose handles and ACLs only, and a holder on the ACL decrypts
//! through its own client.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use umbra_adapters::{Deployment, RelayReport};
use umbra_protocol::collaborators::FungibleToken;
use umbra_protocol::fhe::{EncryptedU64, FheError};
use umbra_protocol::vault::{CorrelationId, OperationKind, PendingOperation, VaultStatus};
use umbra_protocol::{Address, Settlement, VaultError, VaultEvent};

use crate::metrics::SharedMetrics;
use crate::relayer;

/// How many published events `/events` keeps.
pub const RECENT_EVENTS_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The vault and its collaborators.
    pub deployment: Arc<Deployment>,
    /// Live vault events for WebSocket subscribers.
    pub event_tx: broadcast::Sender<VaultEvent>,
    /// Bounded history served by `/events`.
    pub recent_events: Arc<Mutex<VecDeque<VaultEvent>>>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    pub fn new(
        version: String,
        deployment: Arc<Deployment>,
        metrics: SharedMetrics,
        event_tx: broadcast::Sender<VaultEvent>,
    ) -> Self {
        Self {
            version,
            deployment,
            event_tx,
            recent_events: Arc::new(Mutex::new(VecDeque::with_capacity(
                RECENT_EVENTS_CAPACITY,
            ))),
            metrics,
        }
    }

    /// Moves everything in the vault's event log to metrics, the live
    /// channel and the `/events` history. Returns how many were moved.
    pub fn publish_events(&self) -> usize {
        let events = self.deployment.vault.drain_events();
        let count = events.len();
        if count == 0 {
            return 0;
        }

        let mut recent = self.recent_events.lock();
        for event in events {
            self.metrics.record_event(&event);
            // No subscribers is fine.
            let _ = self.event_tx.send(event.clone());
            if recent.len() == RECENT_EVENTS_CAPACITY {
                recent.pop_front();
            }
            recent.push_back(event);
        }
        count
    }

    /// Copies the vault's aggregate state into the gauges.
    pub fn refresh_gauges(&self) {
        match self.deployment.vault.status() {
            Ok(status) => self.metrics.record_status(&status),
            Err(e) => tracing::warn!(error = %e, "failed to read vault status"),
        }
    }

    fn after_write(&self) {
        self.publish_events();
        self.refresh_gauges();
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/faucet", post(faucet_handler))
        .route("/deposit", post(deposit_handler))
        .route("/borrow", post(borrow_handler))
        .route("/withdraw", post(withdraw_handler))
        .route("/repay", post(repay_handler))
        .route("/relay", post(relay_handler))
        .route("/positions/:address", get(position_handler))
        .route("/pending", get(pending_list_handler))
        .route("/pending/:id", get(pending_handler))
        .route("/events", get(events_handler))
        .route("/ws", get(ws_handler))
        .route("/admin/pause", post(pause_handler))
        .route("/admin/unpause", post(unpause_handler))
        .route("/admin/transfer-ownership", post(transfer_ownership_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable label.
    pub kind: String,
}

/// Anything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    Vault(VaultError),
    BadRequest(String),
    NotFound(String),
}

impl From<VaultError> for ApiError {
    fn from(e: VaultError) -> Self {
        ApiError::Vault(e)
    }
}

/// HTTP status for a vault error.
fn vault_status_code(e: &VaultError) -> StatusCode {
    match e {
        VaultError::ZeroAmount | VaultError::NothingMinted { .. } | VaultError::InvalidConfig(_) => {
            StatusCode::BAD_REQUEST
        }
        VaultError::Unauthorized(_)
        | VaultError::NotOracle
        | VaultError::Fhe(FheError::AccessDenied { .. }) => StatusCode::FORBIDDEN,
        VaultError::Paused => StatusCode::SERVICE_UNAVAILABLE,
        VaultError::Oracle(_) => StatusCode::BAD_GATEWAY,
        VaultError::SolvencyViolation { .. } | VaultError::CapacityExceeded { .. } => {
            StatusCode::CONFLICT
        }
        VaultError::MintFailed(_)
        | VaultError::RedeemFailed(_)
        | VaultError::BorrowFailed(_)
        | VaultError::RepayFailed(_)
        | VaultError::TransferFailed(_)
        | VaultError::Fhe(_) => StatusCode::UNPROCESSABLE_ENTITY,
        VaultError::Overflow(_) | VaultError::LedgerUnderflow { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, error) = match self {
            ApiError::Vault(e) => {
                let status = vault_status_code(&e);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %e, "vault invariant failure");
                }
                (status, e.kind(), e.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
        };
        (
            status,
            Json(ErrorResponse {
                error,
                kind: kind.to_string(),
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Body of `/deposit`, `/borrow`, `/withdraw` and `/repay`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AmountRequest {
    pub participant: Address,
    pub amount: u64,
}

/// Which of the two test assets the faucet mints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Collateral,
    Debt,
}

/// Body of `/faucet`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetRequest {
    pub participant: Address,
    pub asset: Asset,
    pub amount: u64,
}

/// Body of `/admin/pause` and `/admin/unpause`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminRequest {
    pub caller: Address,
}

/// Body of `/admin/transfer-ownership`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransferOwnershipRequest {
    pub caller: Address,
    pub new_owner: Address,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Return at most this many of the newest events.
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    pub vault: VaultStatus,
    pub collateral_symbol: String,
    pub debt_symbol: String,
    /// Decryption requests waiting for the relayer.
    pub oracle_queue: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetResponse {
    pub participant: Address,
    pub asset: Asset,
    /// Wallet balance after minting.
    pub balance: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DepositResponse {
    pub participant: Address,
    pub amount: u64,
    pub shares: u64,
}

/// A request was gated and queued.
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestAccepted {
    pub correlation_id: CorrelationId,
    pub kind: OperationKind,
    pub participant: Address,
}

/// One encrypted balance slot.
#[derive(Debug, Serialize)]
pub struct SlotView {
    /// Hex-encoded ciphertext handle.
    pub handle: String,
    /// Principals allowed to use or decrypt the slot.
    pub acl: Vec<Address>,
}

#[derive(Debug, Serialize)]
pub struct WalletView {
    pub collateral: u64,
    pub debt: u64,
}

/// Response payload for `GET /positions/:address`.
#[derive(Debug, Serialize)]
pub struct PositionResponse {
    pub address: Address,
    pub collateral: Option<SlotView>,
    pub debt: Option<SlotView>,
    pub wallet: WalletView,
    pub pending: Vec<PendingView>,
}

#[derive(Debug, Serialize)]
pub struct PendingView {
    pub correlation_id: CorrelationId,
    pub participant: Address,
    pub kind: OperationKind,
    /// Hex-encoded handle of the gated amount.
    pub ciphertext: String,
    pub declared_amount: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub overdue: bool,
}

impl PendingView {
    fn new(op: &PendingOperation, now: DateTime<Utc>) -> Self {
        Self {
            correlation_id: op.correlation_id,
            participant: op.participant.clone(),
            kind: op.kind,
            ciphertext: op.encrypted_amount.handle().to_hex(),
            declared_amount: op.declared_amount,
            created_at: op.created_at,
            deadline: op.deadline,
            overdue: op.is_overdue(now),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FailureView {
    pub correlation_id: CorrelationId,
    pub kind: String,
    pub error: String,
    pub requeued: bool,
}

/// Response payload for `POST /relay`.
#[derive(Debug, Serialize)]
pub struct RelayResponse {
    pub settlements: Vec<Settlement>,
    pub failures: Vec<FailureView>,
}

impl From<RelayReport> for RelayResponse {
    fn from(report: RelayReport) -> Self {
        Self {
            settlements: report.settlements,
            failures: report
                .failures
                .into_iter()
                .map(|f| FailureView {
                    correlation_id: f.correlation_id,
                    kind: f.error.kind().to_string(),
                    error: f.error.to_string(),
                    requeued: f.requeued,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminResponse {
    pub paused: bool,
    pub owner: Address,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: aggregate ledger, valuation and lifecycle state.
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let d = &state.deployment;
    let pool = d.pool.config();
    Ok(Json(StatusResponse {
        version: state.version.clone(),
        vault: d.vault.status()?,
        collateral_symbol: pool.collateral_symbol.clone(),
        debt_symbol: pool.debt_symbol.clone(),
        oracle_queue: d.oracle.queued(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// `POST /faucet`: mints test assets. Devnet only.
async fn faucet_handler(
    State(state): State<AppState>,
    Json(req): Json<FaucetRequest>,
) -> Result<Json<FaucetResponse>, ApiError> {
    let token = match req.asset {
        Asset::Collateral => &state.deployment.collateral,
        Asset::Debt => &state.deployment.debt,
    };
    token
        .mint(&req.participant, req.amount)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    tracing::debug!(participant = %req.participant, asset = ?req.asset, amount = req.amount, "faucet");
    Ok(Json(FaucetResponse {
        balance: token.balance_of(&req.participant),
        participant: req.participant,
        asset: req.asset,
    }))
}

/// `POST /deposit`: approves the vault and deposits. Settles immediately.
async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<DepositResponse>, ApiError> {
    let result = state.deployment.deposit_for(&req.participant, req.amount);
    state.after_write();
    Ok(Json(DepositResponse {
        shares: result?,
        participant: req.participant,
        amount: req.amount,
    }))
}

/// `POST /borrow`: encrypts the amount as the participant and queues it.
async fn borrow_handler(
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<RequestAccepted>, ApiError> {
    let d = &state.deployment;
    let input = d.encrypt(&req.participant, req.amount);
    let correlation_id = d.vault.request_borrow(&req.participant, &input)?;
    state.after_write();
    Ok(Json(RequestAccepted {
        correlation_id,
        kind: OperationKind::Borrow,
        participant: req.participant,
    }))
}

/// `POST /withdraw`: `amount` is in pool shares.
async fn withdraw_handler(
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<RequestAccepted>, ApiError> {
    let d = &state.deployment;
    let input = d.encrypt(&req.participant, req.amount);
    let correlation_id = d.vault.request_withdraw(&req.participant, &input)?;
    state.after_write();
    Ok(Json(RequestAccepted {
        correlation_id,
        kind: OperationKind::Withdraw,
        participant: req.participant,
    }))
}

/// `POST /repay`: approves the vault for `amount` and queues the repay.
async fn repay_handler(
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<RequestAccepted>, ApiError> {
    let correlation_id = state.deployment.repay_for(&req.participant, req.amount)?;
    state.after_write();
    Ok(Json(RequestAccepted {
        correlation_id,
        kind: OperationKind::Repay,
        participant: req.participant,
    }))
}

/// `POST /relay`: runs one relay pass without waiting for the interval.
async fn relay_handler(State(state): State<AppState>) -> Json<RelayResponse> {
    Json(relayer::relay_once(&state).into())
}

/// `GET /positions/:address`: encrypted slots, wallet balances and pending
/// operations of one participant.
async fn position_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Json<PositionResponse> {
    let d = &state.deployment;
    let address = Address::new(address);
    let now = Utc::now();

    let collateral = d.vault.encrypted_collateral_of(&address).map(SlotView::from);
    let debt = d.vault.encrypted_debt_of(&address).map(SlotView::from);
    let pending = d
        .vault
        .pending_for(&address)
        .iter()
        .map(|op| PendingView::new(op, now))
        .collect();

    Json(PositionResponse {
        wallet: WalletView {
            collateral: d.collateral.balance_of(&address),
            debt: d.debt.balance_of(&address),
        },
        address,
        collateral,
        debt,
        pending,
    })
}

impl From<EncryptedU64> for SlotView {
    fn from(slot: EncryptedU64) -> Self {
        Self {
            handle: slot.handle().to_hex(),
            acl: slot.acl().principals().cloned().collect(),
        }
    }
}

/// `GET /pending`: every in-flight operation, oldest first.
async fn pending_list_handler(State(state): State<AppState>) -> Json<Vec<PendingView>> {
    let now = Utc::now();
    Json(
        state
            .deployment
            .vault
            .pending_operations()
            .iter()
            .map(|op| PendingView::new(op, now))
            .collect(),
    )
}

/// `GET /pending/:id`
async fn pending_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PendingView>, ApiError> {
    let correlation_id = CorrelationId::parse(&id)
        .ok_or_else(|| ApiError::BadRequest(format!("malformed correlation id: {}", id)))?;
    state
        .deployment
        .vault
        .pending_operation(&correlation_id)
        .map(|op| Json(PendingView::new(&op, Utc::now())))
        .ok_or_else(|| ApiError::NotFound(format!("no pending operation {}", correlation_id)))
}

/// `GET /events`: newest published events, oldest first.
async fn events_handler(
    Query(query): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Json<Vec<VaultEvent>> {
    let recent = state.recent_events.lock();
    let skip = query
        .limit
        .map(|limit| recent.len().saturating_sub(limit))
        .unwrap_or(0);
    Json(recent.iter().skip(skip).cloned().collect())
}

/// `GET /ws`: upgrades to a WebSocket that streams vault events.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    // Push-only channel.
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

/// `POST /admin/pause`
async fn pause_handler(
    State(state): State<AppState>,
    Json(req): Json<AdminRequest>,
) -> Result<Json<AdminResponse>, ApiError> {
    state.deployment.vault.pause(&req.caller)?;
    state.after_write();
    Ok(Json(admin_response(&state)))
}

/// `POST /admin/unpause`
async fn unpause_handler(
    State(state): State<AppState>,
    Json(req): Json<AdminRequest>,
) -> Result<Json<AdminResponse>, ApiError> {
    state.deployment.vault.unpause(&req.caller)?;
    state.after_write();
    Ok(Json(admin_response(&state)))
}

/// `POST /admin/transfer-ownership`
async fn transfer_ownership_handler(
    State(state): State<AppState>,
    Json(req): Json<TransferOwnershipRequest>,
) -> Result<Json<AdminResponse>, ApiError> {
    state
        .deployment
        .vault
        .transfer_ownership(&req.caller, req.new_owner)?;
    state.after_write();
    Ok(Json(admin_response(&state)))
}

fn admin_response(state: &AppState) -> AdminResponse {
    AdminResponse {
        paused: state.deployment.vault.is_paused(),
        owner: state.deployment.vault.owner(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
