//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the escrow engine over HTTP. All
//! endpoints share application state through axum's `State` extractor.
//! Authenticated endpoints expect `Authorization: Bearer <token>` with a
//! token issued by `POST /accounts` or `POST /sessions`.
//!
//! ## Endpoints
//!
//! | Method | Path                                  | Description                  |
//! |--------|---------------------------------------|------------------------------|
//! | GET    | `/health`                             | Liveness probe               |
//! | POST   | `/accounts`                           | Register                     |
//! | POST   | `/sessions`                           | Log in                       |
//! | DELETE | `/sessions`                           | Log out                      |
//! | GET    | `/me`                                 | Own account                  |
//! | PATCH  | `/me`                                 | Update profile               |
//! | GET    | `/me/trust`                           | Own trust report             |
//! | GET    | `/accounts/:vault_id`                 | Public profile + trust       |
//! | POST   | `/transactions`                       | Open an escrow               |
//! | GET    | `/transactions?direction=`            | History, newest first        |
//! | GET    | `/transactions/:id`                   | One transaction              |
//! | POST   | `/transactions/:id/accept`            | Receiver accepts             |
//! | POST   | `/transactions/:id/conditions/:index` | Sender toggles a condition   |
//! | POST   | `/transactions/:id/order-received`    | Sender confirms delivery     |
//! | POST   | `/transactions/:id/cancel`            | Sender reclaims after expiry |
//! | POST   | `/transactions/:id/read`              | Mark as read                 |
//! | GET    | `/ws`                                 | Live escrow events           |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use vaultpay_contracts::{
    EngineError, EngineResult, EscrowEngine, PublicAccount, SendRequest, StepOutcome,
    TransactionView,
};
use vaultpay_protocol::account::{Account, ProfileUpdate, Signup};
use vaultpay_protocol::money::Amount;
use vaultpay_protocol::session::{Session, SessionRegistry};
use vaultpay_protocol::storage::StoreError;
use vaultpay_protocol::transaction::{
    Direction, EscrowStatus, EscrowTransaction, LifecycleError, Party, Release,
};
use vaultpay_protocol::trust::TrustReport;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    pub engine: Arc<EscrowEngine>,
    /// Bearer token → session.
    pub sessions: Arc<SessionRegistry>,
    /// Broadcast channel for live escrow notifications.
    pub event_tx: broadcast::Sender<NodeEvent>,
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Runs an engine call under a latency timer and counts failures.
    fn call<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&EscrowEngine) -> EngineResult<T>,
    ) -> Result<T, ApiError> {
        let _timer = self.metrics.time(operation);
        f(&self.engine).map_err(|e| {
            let err = ApiError::from(e);
            self.metrics
                .api_errors_total
                .with_label_values(&[err.status().as_str()])
                .inc();
            err
        })
    }

    /// Resolves the bearer token on the request to a session.
    fn authenticate(&self, headers: &HeaderMap) -> Result<Session, ApiError> {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| self.sessions.get(token.trim()))
            .ok_or(ApiError::Unauthorized)
    }

    fn open_session(&self, session: Session) -> String {
        let token = session.token.clone();
        self.sessions.insert(session);
        self.metrics.active_sessions.set(self.sessions.len() as i64);
        token
    }

    /// Publishes a freshly held escrow.
    fn publish_opened(&self, tx: &EscrowTransaction) {
        self.metrics.escrows_opened_total.inc();
        self.metrics.escrowed_minor_units.add(minor_units(tx.amount));
        let _ = self.event_tx.send(NodeEvent::EscrowOpened {
            id: tx.id.clone(),
            reference: tx.reference.clone(),
            amount: tx.amount,
        });
    }

    /// Publishes the outcome of a lifecycle step.
    fn publish_step(&self, outcome: &StepOutcome) {
        let tx = &outcome.transaction;
        let event = match &outcome.release {
            Some(release) => {
                self.metrics.escrowed_minor_units.sub(minor_units(release.amount));
                match tx.status {
                    EscrowStatus::Completed => self.metrics.escrows_completed_total.inc(),
                    _ => self.metrics.escrows_cancelled_total.inc(),
                }
                NodeEvent::EscrowSettled {
                    id: tx.id.clone(),
                    reference: tx.reference.clone(),
                    status: tx.status,
                    beneficiary: release.beneficiary,
                    amount: release.amount,
                }
            }
            None => NodeEvent::EscrowUpdated {
                id: tx.id.clone(),
                reference: tx.reference.clone(),
                status: tx.status,
            },
        };
        // No subscribers is not an error.
        let _ = self.event_tx.send(event);
    }
}

fn minor_units(amount: Amount) -> i64 {
    i64::try_from(amount.minor()).unwrap_or(i64::MAX)
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeEvent {
    /// A sender placed funds in escrow.
    EscrowOpened {
        id: String,
        reference: String,
        amount: Amount,
    },
    /// A non-terminal change (accepted, condition toggled, order received).
    EscrowUpdated {
        id: String,
        reference: String,
        status: EscrowStatus,
    },
    /// Funds left escrow.
    EscrowSettled {
        id: String,
        reference: String,
        status: EscrowStatus,
        beneficiary: Party,
        amount: Amount,
    },
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/accounts", post(register_handler))
        .route("/accounts/:vault_id", get(public_profile_handler))
        .route("/sessions", post(login_handler).delete(logout_handler))
        .route("/me", get(me_handler).patch(update_profile_handler))
        .route("/me/trust", get(my_trust_handler))
        .route("/transactions", post(send_handler).get(history_handler))
        .route("/transactions/:id", get(transaction_handler))
        .route("/transactions/:id/accept", post(accept_handler))
        .route(
            "/transactions/:id/conditions/:index",
            post(toggle_condition_handler),
        )
        .route("/transactions/:id/order-received", post(order_received_handler))
        .route("/transactions/:id/cancel", post(cancel_handler))
        .route("/transactions/:id/read", post(mark_read_handler))
        .route("/ws", get(ws_handler))
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
}

/// Everything a handler can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing or invalid session token")]
    Unauthorized,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        let engine = match self {
            Self::Unauthorized => return StatusCode::UNAUTHORIZED,
            Self::Engine(e) => e,
        };
        match engine {
            EngineError::MissingField(_)
            | EngineError::Amount(_)
            | EngineError::Draft(_)
            | EngineError::Lifecycle(LifecycleError::ConditionOutOfRange { .. }) => {
                StatusCode::BAD_REQUEST
            }
            EngineError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            EngineError::NotAParty | EngineError::Lifecycle(LifecycleError::WrongParty { .. }) => {
                StatusCode::FORBIDDEN
            }
            EngineError::UserNotFound
            | EngineError::AccountNotFound(_)
            | EngineError::RecipientNotFound
            | EngineError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::EmailTaken
            | EngineError::InsufficientBalance { .. }
            | EngineError::Lifecycle(LifecycleError::InvalidState { .. })
            | EngineError::Lifecycle(LifecycleError::TimeLimitNotExpired { .. })
            | EngineError::Store(StoreError::AlreadySettled(_))
            | EngineError::Store(StoreError::Duplicate { .. }) => StatusCode::CONFLICT,
            EngineError::CodeExhausted(_)
            | EngineError::Credentials(_)
            | EngineError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// An account as its owner sees it. Never carries the password hash.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: String,
    pub vault_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    /// Minor units.
    pub balance: Amount,
    /// e.g. `KSH 1,000.00`.
    pub balance_display: String,
    pub created_at: DateTime<Utc>,
    pub unread_transactions: Vec<String>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            balance_display: account.balance.to_string(),
            id: account.id,
            vault_id: account.vault_id,
            name: account.name,
            email: account.email,
            phone: account.phone,
            location: account.location,
            balance: account.balance,
            created_at: account.created_at,
            unread_transactions: account.unread_transactions,
        }
    }
}

/// Response to register and login.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub account: AccountResponse,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /transactions`. The amount is a decimal string in KSH.
#[derive(Debug, Deserialize)]
pub struct SendBody {
    pub recipient_vault_id: String,
    pub amount: String,
    pub conditions: Vec<String>,
    #[serde(default)]
    pub time_limit_hours: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub direction: Option<Direction>,
}

/// A transaction after a lifecycle step.
#[derive(Debug, Serialize)]
pub struct StepResponse {
    #[serde(flatten)]
    pub view: TransactionView,
    /// Present when the step moved funds out of escrow.
    pub release: Option<Release>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "ok", "version": state.version })),
    )
}

/// `POST /accounts` — registers and logs in.
async fn register_handler(
    State(state): State<AppState>,
    Json(signup): Json<Signup>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let (account, session) = state.call("register", |engine| engine.register(signup))?;
    state.metrics.accounts_registered_total.inc();
    let token = state.open_session(session);
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            account: account.into(),
        }),
    ))
}

/// `POST /sessions` — logs in.
async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let (account, session) =
        state.call("login", |engine| engine.login(&req.email, &req.password))?;
    state.metrics.logins_total.inc();
    let token = state.open_session(session);
    Ok(Json(SessionResponse {
        token,
        account: account.into(),
    }))
}

/// `DELETE /sessions` — revokes the caller's token.
async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let session = state.authenticate(&headers)?;
    state.sessions.revoke(&session.token);
    state.metrics.active_sessions.set(state.sessions.len() as i64);
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /me`
async fn me_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AccountResponse>, ApiError> {
    let session = state.authenticate(&headers)?;
    let account = state.call("account", |engine| engine.account(&session))?;
    Ok(Json(account.into()))
}

/// `PATCH /me`
async fn update_profile_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<AccountResponse>, ApiError> {
    let session = state.authenticate(&headers)?;
    let account = state.call("update_profile", |engine| {
        engine.update_profile(&session, &update)
    })?;
    Ok(Json(account.into()))
}

/// `GET /me/trust`
async fn my_trust_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TrustReport>, ApiError> {
    let session = state.authenticate(&headers)?;
    let report = state.call("trust_report", |engine| {
        engine.trust_report(&session.account_id)
    })?;
    Ok(Json(report))
}

/// `GET /accounts/:vault_id` — public, no session required.
async fn public_profile_handler(
    State(state): State<AppState>,
    Path(vault_id): Path<String>,
) -> Result<Json<PublicAccount>, ApiError> {
    let profile = state.call("public_profile", |engine| engine.public_profile(&vault_id))?;
    Ok(Json(profile))
}

/// `POST /transactions` — opens an escrow.
async fn send_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SendBody>,
) -> Result<(StatusCode, Json<TransactionView>), ApiError> {
    let session = state.authenticate(&headers)?;
    let tx = state.call("send", |engine| {
        let amount = body.amount.parse::<Amount>()?;
        engine.send(
            &session,
            SendRequest {
                recipient_vault_id: body.recipient_vault_id,
                amount,
                conditions: body.conditions,
                time_limit_hours: body.time_limit_hours,
            },
        )
    })?;
    state.publish_opened(&tx);

    let view = state.call("transaction", |engine| engine.transaction(&session, &tx.id))?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /transactions?direction=sent|received`
async fn history_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TransactionView>>, ApiError> {
    let session = state.authenticate(&headers)?;
    let history = state.call("history", |engine| engine.history(&session, query.direction))?;
    Ok(Json(history))
}

/// `GET /transactions/:id`
async fn transaction_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<TransactionView>, ApiError> {
    let session = state.authenticate(&headers)?;
    let view = state.call("transaction", |engine| engine.transaction(&session, &id))?;
    Ok(Json(view))
}

/// Shared tail of every lifecycle endpoint.
fn step_response(
    state: &AppState,
    session: &Session,
    operation: &str,
    step: impl FnOnce(&EscrowEngine) -> EngineResult<StepOutcome>,
) -> Result<Json<StepResponse>, ApiError> {
    let outcome = state.call(operation, step)?;
    state.publish_step(&outcome);

    let view = state.call("transaction", |engine| {
        engine.transaction(session, &outcome.transaction.id)
    })?;
    Ok(Json(StepResponse {
        view,
        release: outcome.release,
    }))
}

/// `POST /transactions/:id/accept`
async fn accept_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<StepResponse>, ApiError> {
    let session = state.authenticate(&headers)?;
    step_response(&state, &session, "accept", |engine| engine.accept(&session, &id))
}

/// `POST /transactions/:id/conditions/:index`
async fn toggle_condition_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<StepResponse>, ApiError> {
    let session = state.authenticate(&headers)?;
    step_response(&state, &session, "toggle_condition", |engine| {
        engine.toggle_condition(&session, &id, index)
    })
}

/// `POST /transactions/:id/order-received`
async fn order_received_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<StepResponse>, ApiError> {
    let session = state.authenticate(&headers)?;
    step_response(&state, &session, "mark_order_received", |engine| {
        engine.mark_order_received(&session, &id)
    })
}

/// `POST /transactions/:id/cancel`
async fn cancel_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<StepResponse>, ApiError> {
    let session = state.authenticate(&headers)?;
    step_response(&state, &session, "cancel", |engine| engine.cancel(&session, &id))
}

/// `POST /transactions/:id/read`
async fn mark_read_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let session = state.authenticate(&headers)?;
    let account = state.call("mark_read", |engine| engine.mark_read(&session, &id))?;
    Ok(Json(account.into()))
}

/// `GET /ws` — WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`NodeEvent`] messages. The connection is
/// push-only; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();
    state.metrics.ws_subscribers.inc();

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
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }

    state.metrics.ws_subscribers.dec();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
