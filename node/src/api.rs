//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the chain to a browser front end.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                     | Description                           |
//! |--------|--------------------------|---------------------------------------|
//! | GET    | `/health`                | Liveness probe                        |
//! | GET    | `/status`                | Chain summary                         |
//! | GET    | `/chain`                 | Every block with its validity flag    |
//! | GET    | `/blocks/:index`         | One block                             |
//! | GET    | `/ledger`                | Data of every mined block             |
//! | GET    | `/difficulty`            | Current difficulty and target         |
//! | PUT    | `/difficulty`            | Change the difficulty                 |
//! | POST   | `/mine`                  | Mine a block onto the tip             |
//! | POST   | `/mine/cancel`           | Stop the running search               |
//! | POST   | `/auto-mine`             | Mine the sample transactions          |
//! | POST   | `/blocks/:index/tamper`  | Overwrite a block's data              |
//! | POST   | `/blocks/:index/repair`  | Recompute a block's hash              |
//! | GET    | `/ws`                    | WebSocket for live chain events       |

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use chainlab_protocol::config::{
    is_selectable_difficulty, MAX_SELECTABLE_DIFFICULTY, MIN_SELECTABLE_DIFFICULTY,
    SAMPLE_TRANSACTIONS,
};
use chainlab_protocol::mining::{
    difficulty_target, BlockProducer, MinedBlock, MiningError, MiningEvent, ProductionError,
};
use chainlab_protocol::storage::{Block, ChainError, LedgerEntry};

use crate::metrics::SharedMetrics;

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
    /// Owns the chain and serializes mining.
    pub producer: Arc<BlockProducer>,
    /// Difficulty used by `/mine` and `/auto-mine` when none is given.
    pub difficulty: Arc<AtomicU32>,
    /// Validity at the last published check, for `validity_changed`.
    pub last_valid: Arc<AtomicBool>,
    /// Broadcast channel for live chain events.
    pub event_tx: broadcast::Sender<ChainEvent>,
    pub metrics: SharedMetrics,
}

impl AppState {
    pub fn new(
        version: String,
        producer: Arc<BlockProducer>,
        difficulty: u32,
        event_tx: broadcast::Sender<ChainEvent>,
        metrics: SharedMetrics,
    ) -> Self {
        let valid = producer.is_valid();
        metrics.observe_chain(producer.len(), valid);
        Self {
            version,
            producer,
            difficulty: Arc::new(AtomicU32::new(difficulty)),
            last_valid: Arc::new(AtomicBool::new(valid)),
            event_tx,
            metrics,
        }
    }

    fn difficulty(&self) -> u32 {
        self.difficulty.load(Ordering::Relaxed)
    }

    /// Best-effort broadcast. No subscribers is not an error.
    fn emit(&self, event: ChainEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Re-validates the chain, refreshes the gauges, and announces a flip
    /// in validity.
    fn publish_validity(&self) {
        let report = self.producer.validate();
        let valid = report.is_valid();
        self.metrics.observe_chain(self.producer.len(), valid);

        if self.last_valid.swap(valid, Ordering::Relaxed) != valid {
            tracing::info!(valid, "chain validity changed");
            self.emit(ChainEvent::ValidityChanged {
                valid,
                invalid_indices: report.invalid_indices().into_iter().collect(),
            });
        }
    }

    /// Forwards a producer event to metrics and subscribers as it happens.
    fn observe(&self, event: MiningEvent<'_>) {
        match event {
            MiningEvent::Progress(p) => self.emit(ChainEvent::AutoMineProgress {
                current: p.current,
                total: p.total,
            }),
            MiningEvent::Started { index, difficulty } => {
                self.emit(ChainEvent::MiningStarted { index, difficulty })
            }
            MiningEvent::Mined(mined) => {
                self.record_mined(mined);
                self.publish_validity();
            }
        }
    }

    /// Records one appended block in metrics and on the event bus.
    fn record_mined(&self, mined: &MinedBlock) {
        self.metrics.blocks_mined_total.inc();
        self.metrics.mining_attempts_total.inc_by(mined.attempts);
        self.metrics
            .mining_duration_seconds
            .observe(mined.elapsed.as_secs_f64());
        self.emit(ChainEvent::BlockMined {
            block: mined.block.clone(),
            attempts: mined.attempts,
            elapsed_ms: mined.elapsed.as_millis() as u64,
        });
    }

    fn record_failure(&self, err: &ProductionError) {
        if let ProductionError::Mining(MiningError::Cancelled { index, attempts }) = err {
            self.metrics.mining_cancelled_total.inc();
            self.emit(ChainEvent::MiningCancelled {
                index: *index,
                attempts: *attempts,
            });
        }
    }
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEvent {
    /// A search for the block at `index` began.
    MiningStarted { index: u64, difficulty: u32 },
    /// A block was mined and appended.
    BlockMined {
        block: Block,
        attempts: u64,
        elapsed_ms: u64,
    },
    MiningCancelled { index: u64, attempts: u64 },
    /// Auto-mine is about to mine block `current` of `total`.
    AutoMineProgress { current: usize, total: usize },
    BlockTampered { index: usize, rehashed: bool },
    BlockRepaired { index: usize, hash: String },
    /// The chain went from valid to invalid or back.
    ValidityChanged {
        valid: bool,
        invalid_indices: Vec<usize>,
    },
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/chain", get(chain_handler))
        .route("/blocks/:index", get(block_handler))
        .route("/blocks/:index/tamper", post(tamper_handler))
        .route("/blocks/:index/repair", post(repair_handler))
        .route("/ledger", get(ledger_handler))
        .route("/difficulty", get(difficulty_handler).put(set_difficulty_handler))
        .route("/mine", post(mine_handler))
        .route("/mine/cancel", post(cancel_handler))
        .route("/auto-mine", post(auto_mine_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /mine`.
#[derive(Debug, Deserialize)]
pub struct MineRequest {
    pub data: String,
    /// Overrides the node difficulty for this block only.
    #[serde(default)]
    pub difficulty: Option<u32>,
}

/// Body of `POST /auto-mine`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct AutoMineRequest {
    #[serde(default)]
    pub difficulty: Option<u32>,
}

/// Body of `POST /blocks/:index/tamper`.
#[derive(Debug, Deserialize)]
pub struct TamperRequest {
    pub data: String,
    /// Also recompute the block's hash.
    #[serde(default)]
    pub rehash: bool,
}

/// Body of `PUT /difficulty`.
#[derive(Debug, Deserialize)]
pub struct SetDifficultyRequest {
    pub difficulty: u32,
}

/// A block as shown to the front end.
#[derive(Debug, Serialize)]
pub struct BlockView {
    #[serde(flatten)]
    pub block: Block,
    pub short_hash: String,
    pub short_previous_hash: String,
    /// `"Genesis"` or an RFC 3339 time.
    pub display_timestamp: String,
    /// True if this position failed validation.
    pub invalid: bool,
}

impl BlockView {
    fn new(block: Block, invalid: bool) -> Self {
        Self {
            short_hash: block.short_hash(),
            short_previous_hash: block.short_previous_hash(),
            display_timestamp: block.display_timestamp(),
            invalid,
            block,
        }
    }
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub algorithm: String,
    pub length: usize,
    pub difficulty: u32,
    pub valid: bool,
    pub mining: bool,
    /// RFC 3339 time of the response.
    pub timestamp: String,
}

/// Response payload for `GET /chain`.
#[derive(Debug, Serialize)]
pub struct ChainResponse {
    pub length: usize,
    pub valid: bool,
    pub invalid_indices: Vec<usize>,
    pub blocks: Vec<BlockView>,
}

/// Response payload for `GET /difficulty` and `PUT /difficulty`.
#[derive(Debug, Serialize)]
pub struct DifficultyResponse {
    pub difficulty: u32,
    pub target: String,
    pub min: u32,
    pub max: u32,
}

impl DifficultyResponse {
    fn new(difficulty: u32) -> Self {
        Self {
            difficulty,
            target: difficulty_target(difficulty),
            min: MIN_SELECTABLE_DIFFICULTY,
            max: MAX_SELECTABLE_DIFFICULTY,
        }
    }
}

/// Response payload for `POST /mine`.
#[derive(Debug, Serialize)]
pub struct MineResponse {
    pub block: BlockView,
    pub attempts: u64,
    pub elapsed_ms: u64,
}

impl From<MinedBlock> for MineResponse {
    fn from(mined: MinedBlock) -> Self {
        Self {
            attempts: mined.attempts,
            elapsed_ms: mined.elapsed.as_millis() as u64,
            block: BlockView::new(mined.block, false),
        }
    }
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A failed request: status code plus message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ProductionError> for ApiError {
    fn from(err: ProductionError) -> Self {
        let status = match &err {
            ProductionError::Busy => StatusCode::CONFLICT,
            ProductionError::EmptyData | ProductionError::DifficultyTooHigh { .. } => {
                StatusCode::BAD_REQUEST
            }
            ProductionError::Chain(ChainError::BlockNotFound(_)) => StatusCode::NOT_FOUND,
            ProductionError::Chain(ChainError::GenesisLocked) => StatusCode::FORBIDDEN,
            // The chain moved under an in-flight search.
            ProductionError::Chain(
                ChainError::StaleTip { .. } | ChainError::IndexMismatch { .. },
            ) => StatusCode::CONFLICT,
            ProductionError::Mining(MiningError::Cancelled { .. }) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — chain summary.
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: state.version.clone(),
        algorithm: state.producer.algorithm().to_string(),
        length: state.producer.len(),
        difficulty: state.difficulty(),
        valid: state.producer.is_valid(),
        mining: state.producer.is_mining(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /chain` — every block, validated on the spot.
async fn chain_handler(State(state): State<AppState>) -> Json<ChainResponse> {
    let (blocks, invalid) = {
        let chain = state.producer.chain();
        let chain = chain.read();
        (chain.blocks().to_vec(), chain.invalid_indices())
    };

    Json(ChainResponse {
        length: blocks.len(),
        valid: invalid.is_empty(),
        invalid_indices: invalid.iter().copied().collect(),
        blocks: blocks
            .into_iter()
            .enumerate()
            .map(|(i, block)| BlockView::new(block, invalid.contains(&i)))
            .collect(),
    })
}

/// `GET /blocks/:index` — one block, 404 if absent.
async fn block_handler(
    Path(index): Path<usize>,
    State(state): State<AppState>,
) -> ApiResult<BlockView> {
    let block = state.producer.block(index).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            ChainError::BlockNotFound(index).to_string(),
        )
    })?;
    let invalid = state.producer.invalid_indices().contains(&index);
    Ok(Json(BlockView::new(block, invalid)))
}

/// `GET /ledger` — the data of every mined block.
async fn ledger_handler(State(state): State<AppState>) -> Json<Vec<LedgerEntry>> {
    Json(state.producer.ledger())
}

/// `GET /difficulty`
async fn difficulty_handler(State(state): State<AppState>) -> Json<DifficultyResponse> {
    Json(DifficultyResponse::new(state.difficulty()))
}

/// `PUT /difficulty` — accepts only the selectable range.
async fn set_difficulty_handler(
    State(state): State<AppState>,
    Json(req): Json<SetDifficultyRequest>,
) -> ApiResult<DifficultyResponse> {
    let max = state.producer.config().max_difficulty;
    if !is_selectable_difficulty(req.difficulty) || req.difficulty > max {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!(
                "difficulty must be between {} and {}",
                MIN_SELECTABLE_DIFFICULTY,
                MAX_SELECTABLE_DIFFICULTY.min(max)
            ),
        ));
    }

    state.difficulty.store(req.difficulty, Ordering::Relaxed);
    tracing::info!(difficulty = req.difficulty, "difficulty changed");
    Ok(Json(DifficultyResponse::new(req.difficulty)))
}

/// `POST /mine` — mines one block; 409 if a search is already running.
async fn mine_handler(
    State(state): State<AppState>,
    Json(req): Json<MineRequest>,
) -> ApiResult<MineResponse> {
    let difficulty = req.difficulty.unwrap_or_else(|| state.difficulty());

    match state
        .producer
        .try_mine_next_observed(&req.data, difficulty, |event| state.observe(event))
        .await
    {
        Ok(mined) => Ok(Json(mined.into())),
        Err(err) => {
            state.record_failure(&err);
            Err(err.into())
        }
    }
}

/// `POST /mine/cancel` — stops the running search, if any.
async fn cancel_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cancelled = state.producer.cancel();
    Json(serde_json::json!({ "cancelled": cancelled }))
}

/// `POST /auto-mine` — mines the sample transactions in order.
///
/// Progress goes out over `/ws` before each block, and each block is
/// announced as soon as it is appended.
async fn auto_mine_handler(
    State(state): State<AppState>,
    body: Option<Json<AutoMineRequest>>,
) -> ApiResult<Vec<MineResponse>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let difficulty = req.difficulty.unwrap_or_else(|| state.difficulty());

    match state
        .producer
        .auto_mine(&SAMPLE_TRANSACTIONS[..], difficulty, |event| {
            state.observe(event)
        })
        .await
    {
        Ok(mined) => Ok(Json(mined.into_iter().map(MineResponse::from).collect())),
        Err(err) => {
            state.record_failure(&err);
            Err(err.into())
        }
    }
}

/// `POST /blocks/:index/tamper` — overwrite data, optionally re-signing.
async fn tamper_handler(
    Path(index): Path<usize>,
    State(state): State<AppState>,
    Json(req): Json<TamperRequest>,
) -> ApiResult<BlockView> {
    let block = if req.rehash {
        state.producer.tamper_and_rehash(index, &req.data)?
    } else {
        state.producer.tamper(index, &req.data)?
    };

    state.metrics.tamper_events_total.inc();
    state.emit(ChainEvent::BlockTampered {
        index,
        rehashed: req.rehash,
    });
    state.publish_validity();

    let invalid = state.producer.invalid_indices().contains(&index);
    Ok(Json(BlockView::new(block, invalid)))
}

/// `POST /blocks/:index/repair` — recompute the stored hash.
async fn repair_handler(
    Path(index): Path<usize>,
    State(state): State<AppState>,
) -> ApiResult<BlockView> {
    let block = state.producer.repair(index)?;

    state.emit(ChainEvent::BlockRepaired {
        index,
        hash: block.hash.clone(),
    });
    state.publish_validity();

    let invalid = state.producer.invalid_indices().contains(&index);
    Ok(Json(BlockView::new(block, invalid)))
}

/// `GET /ws` — WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`ChainEvent`]s. Client messages are
/// ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Forwards broadcast events until the client disconnects or the channel
/// closes.
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
                                tracing::warn!(error = %e, "failed to serialize ws event");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "ws subscriber lagged");
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
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
