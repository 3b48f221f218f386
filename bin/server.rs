// Wealth Ledger - Web Server
// REST API with Axum over the ledger controller

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use wealth_ledger::{
    Account, AccountHistory, AccountSummary, HistoryFilter, HistoryView, Ledger, LedgerConfig,
    LedgerError, LedgerResult, NewEntry,
};

/// Shared application state
///
/// Each request opens its own connection: reads run concurrently under WAL,
/// writes serialize on SQLite's write lock inside the ledger.
#[derive(Clone)]
struct AppState {
    config: Arc<LedgerConfig>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<serde_json::Value>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
enum ApiError {
    Ledger(LedgerError),
    Internal(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Ledger(err) if err.is_business_rule() => {
                // Field attribution: { "value": "insufficient balance: ..." }
                let mut fields = serde_json::Map::new();
                fields.insert(err.field().to_string(), serde_json::Value::String(err.to_string()));
                (StatusCode::BAD_REQUEST, serde_json::Value::Object(fields))
            }
            ApiError::Ledger(err @ LedgerError::NotFound { .. }) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "detail": err.to_string() }),
            ),
            ApiError::Ledger(err @ LedgerError::Contention { .. }) => {
                error!(error = %err, "request failed on store contention");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    serde_json::json!({ "detail": "ledger is busy, try again" }),
                )
            }
            ApiError::Ledger(err) => {
                error!(error = %err, "ledger failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "detail": "internal error" }),
                )
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "detail": "internal error" }),
                )
            }
        };

        let response: ApiResponse<()> = ApiResponse {
            success: false,
            data: None,
            error: Some(body),
        };
        (status, Json(response)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Run a ledger operation on a blocking thread with its own connection.
async fn with_ledger<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut Ledger) -> LedgerResult<T> + Send + 'static,
    T: Send + 'static,
{
    let config = state.config.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut ledger = Ledger::open(&config)?.with_actor("api");
        op(&mut ledger)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(result?)
}

/// Only close/reactivate reach closed accounts; every other account route
/// treats them as missing.
fn require_visible(ledger: &Ledger, id: i64) -> LedgerResult<Account> {
    let account = ledger.account(id)?;
    if !account.is_active {
        return Err(LedgerError::NotFound {
            entity: "account",
            id,
        });
    }
    Ok(account)
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Deserialize)]
struct CreateAccountRequest {
    name: String,
    #[serde(default)]
    initial_value: Option<Decimal>,
}

#[derive(Deserialize)]
struct RenameAccountRequest {
    name: String,
}

#[derive(Serialize)]
struct LifecycleResponse {
    status: String,
    entry: AccountHistory,
}

#[derive(Serialize)]
struct TotalWealthResponse {
    total_wealth: Decimal,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/accounts - Active accounts with balance and yield
async fn list_accounts(State(state): State<AppState>) -> ApiResult<Vec<AccountSummary>> {
    let accounts = with_ledger(&state, |ledger| ledger.list_accounts(false)).await?;
    Ok(Json(ApiResponse::ok(accounts)))
}

/// POST /api/accounts - Open an account
async fn create_account(
    State(state): State<AppState>,
    Json(body): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AccountSummary>>), ApiError> {
    let summary = with_ledger(&state, move |ledger| {
        let account = ledger.open_account(&body.name, body.initial_value.unwrap_or(Decimal::ZERO))?;
        ledger.account_summary(account.id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(summary))))
}

/// GET /api/accounts/:id
async fn get_account(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<AccountSummary> {
    let summary = with_ledger(&state, move |ledger| {
        require_visible(ledger, id)?;
        ledger.account_summary(id)
    })
    .await?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// PUT/PATCH /api/accounts/:id - Rename
async fn update_account(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<RenameAccountRequest>,
) -> ApiResult<AccountSummary> {
    let summary = with_ledger(&state, move |ledger| {
        require_visible(ledger, id)?;
        ledger.rename_account(id, &body.name)?;
        ledger.account_summary(id)
    })
    .await?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// DELETE /api/accounts/:id
async fn delete_account(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    with_ledger(&state, move |ledger| {
        require_visible(ledger, id)?;
        ledger.delete_account(id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/accounts/:id/close
async fn close_account(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<LifecycleResponse> {
    let (name, entry) = with_ledger(&state, move |ledger| {
        let entry = ledger.close_account(id)?;
        Ok((ledger.account(id)?.name, entry))
    })
    .await?;

    Ok(Json(ApiResponse::ok(LifecycleResponse {
        status: format!("Account \"{}\" closed", name),
        entry,
    })))
}

/// POST /api/accounts/:id/reactivate
async fn reactivate_account(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<LifecycleResponse> {
    let (name, entry) = with_ledger(&state, move |ledger| {
        let entry = ledger.reactivate_account(id)?;
        Ok((ledger.account(id)?.name, entry))
    })
    .await?;

    Ok(Json(ApiResponse::ok(LifecycleResponse {
        status: format!("Account \"{}\" reactivated", name),
        entry,
    })))
}

/// GET /api/accounts/total_wealth
async fn total_wealth(State(state): State<AppState>) -> ApiResult<TotalWealthResponse> {
    let total_wealth = with_ledger(&state, |ledger| ledger.total_wealth()).await?;
    Ok(Json(ApiResponse::ok(TotalWealthResponse { total_wealth })))
}

/// GET /api/account-history?account=&type=&date=
async fn list_history(
    State(state): State<AppState>,
    Query(filter): Query<HistoryFilter>,
) -> ApiResult<Vec<HistoryView>> {
    let rows = with_ledger(&state, move |ledger| ledger.history(&filter)).await?;
    Ok(Json(ApiResponse::ok(rows)))
}

/// POST /api/account-history - Append an entry
async fn create_history_entry(
    State(state): State<AppState>,
    Json(body): Json<NewEntry>,
) -> Result<(StatusCode, Json<ApiResponse<HistoryView>>), ApiError> {
    let view = with_ledger(&state, move |ledger| {
        let entry = ledger.append_entry(&body)?;
        ledger.history_entry(entry.id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

/// GET /api/account-history/:id
async fn get_history_entry(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<HistoryView> {
    let view = with_ledger(&state, move |ledger| ledger.history_entry(id)).await?;
    Ok(Json(ApiResponse::ok(view)))
}

fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/accounts", get(list_accounts).post(create_account))
        .route("/accounts/total_wealth", get(total_wealth))
        .route(
            "/accounts/:id",
            get(get_account)
                .put(update_account)
                .patch(update_account)
                .delete(delete_account),
        )
        .route("/accounts/:id/close", post(close_account))
        .route("/accounts/:id/reactivate", post(reactivate_account))
        .route("/account-history", get(list_history).post(create_history_entry))
        .route("/account-history/:id", get(get_history_entry))
        .with_state(state)
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wealth_ledger::init_tracing();

    let config = LedgerConfig::load()?;

    // Create the schema once up front; request connections reuse it
    Ledger::open(&config)?;
    info!(database = %config.database_path.display(), "ledger opened");

    let state = AppState {
        config: Arc::new(config.clone()),
    };

    let app = Router::new().nest("/api", api_routes(state)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
