//! HTTP/JSON surface for the wallet service.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use wallet_common::{monetary, AccountId, EntryId, WalletError};
use wallet_ledger::{Account, LedgerEntry, PageRequest, SortDirection, SortKey};

use crate::config::QueryConfig;
use crate::coordinator::TransactionCoordinator;
use crate::query::QueryService;

/// Shared handler state.
pub struct AppState {
    pub coordinator: Arc<TransactionCoordinator>,
    pub queries: QueryService,
}

impl AppState {
    /// Wire a query service to the coordinator's storage and metrics.
    pub fn new(coordinator: Arc<TransactionCoordinator>, query_config: QueryConfig) -> Self {
        let queries = QueryService::new(
            coordinator.storage().clone(),
            query_config,
            coordinator.metrics().clone(),
        );
        Self {
            coordinator,
            queries,
        }
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/setup", post(setup_wallet))
        .route("/transact/:wallet_id", post(transact))
        .route("/transactions", get(list_transactions))
        .route("/wallet/:id", get(get_wallet))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Error returned from a handler, rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError(WalletError);

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(WalletError::Validation {
            message: rejection.body_text(),
            field: None,
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            WalletError::Validation { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
            WalletError::AccountNotFound(_) => {
                (StatusCode::NOT_FOUND, "Wallet not found".to_string())
            }
            WalletError::InsufficientBalance { .. } => {
                (StatusCode::BAD_REQUEST, "Insufficient balance".to_string())
            }
            WalletError::Unavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service is shutting down".to_string(),
            ),
            other => {
                error!(error = %other, code = other.error_code(), "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// --- Request bodies ---
//
// Fields stay untyped so a wrong JSON type yields the field's own message
// rather than a generic deserialization error.

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub name: Option<Value>,
    pub balance: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct TransactRequest {
    pub amount: Option<Value>,
    pub description: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub wallet_id: Option<String>,
    pub skip: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

// --- Response bodies ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupResponse {
    pub id: AccountId,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub transaction_id: EntryId,
    pub name: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub transaction_id: EntryId,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub id: AccountId,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub name: String,
    pub date: DateTime<Utc>,
}

impl From<Account> for WalletResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            balance: account.balance,
            name: account.name,
            date: account.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    pub id: EntryId,
    pub wallet_id: AccountId,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub description: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl From<LedgerEntry> for EntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            kind: entry.kind().as_str(),
            id: entry.id,
            wallet_id: entry.account_id,
            amount: entry.amount,
            balance: entry.resulting_balance,
            description: entry.description,
            date: entry.occurred_at,
        }
    }
}

// --- Handlers ---

async fn setup_wallet(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SetupRequest>, JsonRejection>,
) -> ApiResult<SetupResponse> {
    let Json(request) = payload?;

    let name = match request.name {
        Some(Value::String(name)) if !name.is_empty() => name,
        _ => {
            return Err(
                WalletError::validation("Name is required and must be a string", "name").into(),
            )
        }
    };
    let balance = number_field(
        request.balance,
        "balance",
        "Balance is required and must be a number",
    )?;

    let opening = state.coordinator.open_account(&name, balance).await?;

    Ok(Json(SetupResponse {
        id: opening.account.id,
        balance: opening.account.balance,
        transaction_id: opening.entry.id,
        name: opening.account.name,
        date: opening.account.created_at,
    }))
}

async fn transact(
    State(state): State<Arc<AppState>>,
    Path(wallet_id): Path<String>,
    payload: Result<Json<TransactRequest>, JsonRejection>,
) -> ApiResult<TransactResponse> {
    let account_id = parse_wallet_id(&wallet_id)?;
    let Json(request) = payload?;

    let amount = number_field(
        request.amount,
        "amount",
        "Amount is required and must be a number",
    )?;
    let description = match request.description {
        Some(Value::String(description)) => description,
        _ => {
            return Err(WalletError::validation(
                "Description is required and must be a string",
                "description",
            )
            .into())
        }
    };

    let receipt = state
        .coordinator
        .execute(account_id, amount, &description)
        .await?;

    Ok(Json(TransactResponse {
        balance: receipt.new_balance,
        transaction_id: receipt.entry.id,
    }))
}

async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Vec<EntryResponse>> {
    let wallet_id = params
        .wallet_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| WalletError::validation("walletId is required", "walletId"))?;
    let account_id = parse_wallet_id(wallet_id)?;

    let page = page_request(&params, &state.queries)?;
    let entries = state.queries.list_transactions(&account_id, &page).await?;

    Ok(Json(entries.into_iter().map(EntryResponse::from).collect()))
}

async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<WalletResponse> {
    let account_id = parse_wallet_id(&id)?;
    let account = state.queries.get_account(&account_id).await?;
    Ok(Json(WalletResponse::from(account)))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "Wallet service is running",
        "state": format!("{:?}", state.coordinator.state()),
        "backend": state.coordinator.storage().backend(),
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.coordinator.metrics().to_prometheus(),
    )
}

// --- Input parsing ---

fn parse_wallet_id(raw: &str) -> Result<AccountId, ApiError> {
    AccountId::parse(raw)
        .map_err(|_| WalletError::validation("Invalid wallet ID", "walletId").into())
}

fn number_field(value: Option<Value>, field: &str, message: &str) -> Result<Decimal, ApiError> {
    let number = match value {
        Some(Value::Number(number)) => number.as_f64(),
        _ => None,
    };
    let number = number.ok_or_else(|| WalletError::validation(message, field))?;
    Ok(monetary::from_f64(number, field)?)
}

fn page_request(params: &HistoryParams, queries: &QueryService) -> Result<PageRequest, WalletError> {
    let skip = match params.skip.as_deref() {
        None => 0,
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| WalletError::validation("Skip must be a non-negative number", "skip"))?,
    };

    let limit_error = || {
        WalletError::validation(
            format!("Limit must be between 1 and {}", queries.max_limit()),
            "limit",
        )
    };
    let limit = match params.limit.as_deref() {
        None => queries.default_limit(),
        Some(raw) => raw.trim().parse::<u32>().map_err(|_| limit_error())?,
    };

    let sort_key = match params.sort_by.as_deref() {
        None => SortKey::default(),
        Some(raw) => raw.parse()?,
    };
    let direction = match params.order.as_deref() {
        None => SortDirection::default(),
        Some(raw) => raw.parse()?,
    };

    let page = PageRequest::new(skip, limit, sort_key, direction);
    page.validate(queries.max_limit())?;
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use wallet_ledger::MemoryStorage;

    use crate::config::ServiceConfig;

    async fn test_app() -> Router {
        let config = ServiceConfig::default();
        let coordinator = Arc::new(TransactionCoordinator::new(
            config.clone(),
            Arc::new(MemoryStorage::new()),
        ));
        coordinator.start().await.unwrap();
        router(Arc::new(AppState::new(coordinator, config.query_config)))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn setup(app: &Router, name: &str, balance: f64) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/setup",
            Some(json!({ "name": name, "balance": balance })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_setup_and_transact() {
        let app = test_app().await;

        let (status, body) = send(
            &app,
            "POST",
            "/setup",
            Some(json!({ "name": "Alice", "balance": 100.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Alice");
        assert_eq!(body["balance"], 100.0);
        assert!(body["transactionId"].is_string());
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/transact/{id}"),
            Some(json!({ "amount": -30.0001, "description": "coffee" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], 69.9999);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/transact/{id}"),
            Some(json!({ "amount": -100, "description": "rent" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Insufficient balance");

        let (status, body) = send(&app, "GET", &format!("/wallet/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], 69.9999);
    }

    #[tokio::test]
    async fn test_setup_validation_messages() {
        let app = test_app().await;

        let (status, body) = send(&app, "POST", "/setup", Some(json!({ "balance": 10 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Name is required and must be a string");

        let (_, body) = send(
            &app,
            "POST",
            "/setup",
            Some(json!({ "name": "Bob", "balance": "10" })),
        )
        .await;
        assert_eq!(body["error"], "Balance is required and must be a number");

        let (status, body) = send(
            &app,
            "POST",
            "/setup",
            Some(json!({ "name": "Bob", "balance": -1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Balance cannot be negative");
    }

    #[tokio::test]
    async fn test_transact_validation_messages() {
        let app = test_app().await;
        let id = setup(&app, "Carol", 5.0).await;

        let (status, body) = send(
            &app,
            "POST",
            "/transact/not-a-uuid",
            Some(json!({ "amount": 1, "description": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid wallet ID");

        let (_, body) = send(
            &app,
            "POST",
            &format!("/transact/{id}"),
            Some(json!({ "description": "x" })),
        )
        .await;
        assert_eq!(body["error"], "Amount is required and must be a number");

        let (_, body) = send(
            &app,
            "POST",
            &format!("/transact/{id}"),
            Some(json!({ "amount": 1, "description": "  " })),
        )
        .await;
        assert_eq!(body["error"], "Description is required and must be a string");

        let missing = AccountId::new();
        let (status, body) = send(
            &app,
            "POST",
            &format!("/transact/{missing}"),
            Some(json!({ "amount": 1, "description": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Wallet not found");
    }

    #[tokio::test]
    async fn test_huge_amounts_are_bad_requests() {
        let app = test_app().await;

        let (status, _) = send(
            &app,
            "POST",
            "/setup",
            Some(json!({ "name": "Whale", "balance": 7e28 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let id = setup(&app, "Whale", 1e20).await;
        let (status, _) = send(
            &app,
            "POST",
            &format!("/transact/{id}"),
            Some(json!({ "amount": 7e28, "description": "more" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "GET", &format!("/wallet/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], 1e20);
    }

    #[tokio::test]
    async fn test_list_transactions() {
        let app = test_app().await;
        let id = setup(&app, "Dave", 10.0).await;

        for amount in [1.5, -2.25, 3.0] {
            send(
                &app,
                "POST",
                &format!("/transact/{id}"),
                Some(json!({ "amount": amount, "description": "move" })),
            )
            .await;
        }

        let (status, body) = send(&app, "GET", &format!("/transactions?walletId={id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0]["amount"], 3.0);
        assert_eq!(entries[0]["balance"], 12.25);
        assert_eq!(entries[0]["walletId"], id.as_str());
        assert_eq!(entries[3]["description"], "Setup");
        assert_eq!(entries[3]["type"], "CREDIT");

        let (_, body) = send(
            &app,
            "GET",
            &format!("/transactions?walletId={id}&sortBy=amount&order=asc&limit=1"),
            None,
        )
        .await;
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["amount"], -2.25);
        assert_eq!(entries[0]["type"], "DEBIT");
    }

    #[tokio::test]
    async fn test_list_transactions_validation() {
        let app = test_app().await;
        let id = setup(&app, "Erin", 1.0).await;

        let (status, body) = send(&app, "GET", "/transactions", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "walletId is required");

        let (_, body) = send(&app, "GET", &format!("/transactions?walletId={id}&skip=-1"), None).await;
        assert_eq!(body["error"], "Skip must be a non-negative number");

        let (_, body) = send(&app, "GET", &format!("/transactions?walletId={id}&limit=0"), None).await;
        assert_eq!(body["error"], "Limit must be between 1 and 100");

        let (_, body) = send(&app, "GET", &format!("/transactions?walletId={id}&limit=101"), None).await;
        assert_eq!(body["error"], "Limit must be between 1 and 100");

        let missing = AccountId::new();
        let (status, _) = send(&app, "GET", &format!("/transactions?walletId={missing}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let app = test_app().await;

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
        assert_eq!(body["backend"], "memory");

        setup(&app, "Frank", 1.0).await;
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("wallet_accounts_opened 1"));
    }
}
