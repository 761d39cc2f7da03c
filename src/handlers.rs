use std::sync::Arc;

use crate::{
    AppState, auth,
    auth::Claims,
    db::{
        budget_entry_exists, delete_budget_entries, delete_expense_entries, insert_account,
        insert_budget_entry, insert_expense_entry, query_account_by_username,
        query_budget_entries, query_expense_entries,
    },
    domain::{BudgetEntry, ExpenseEntry},
};
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    Invalid(&'static str),
    Field {
        message: &'static str,
        field: &'static str,
    },
    SqlxError,
    InternalServerError,
}

impl From<sqlx::Error> for AppError {
    fn from(_err: sqlx::Error) -> Self {
        AppError::SqlxError
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(_err: jsonwebtoken::errors::Error) -> Self {
        AppError::InternalServerError
    }
}

impl From<argon2::password_hash::Error> for AppError {
    fn from(_err: argon2::password_hash::Error) -> Self {
        AppError::InternalServerError
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "You must be logged in." })),
            )
                .into_response(),
            AppError::Invalid(msg) => {
                tracing::info!("Bad request: {}", msg);
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": msg })),
                )
                    .into_response()
            }
            AppError::Field { message, field } => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "message": message, "field": field })),
            )
                .into_response(),
            AppError::SqlxError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Database error" })),
            )
                .into_response(),
            AppError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Internal server error" })),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct BudgetRow {
    pub id: i64,
    pub name: String,
    pub amount: f64,
}

impl From<BudgetEntry> for BudgetRow {
    fn from(entry: BudgetEntry) -> Self {
        BudgetRow {
            id: entry.id,
            name: entry.name,
            amount: entry.amount.to_f64().unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExpenseRow {
    pub id: i64,
    pub name: String,
    pub amount: f64,
    pub budget: i64,
    pub date: String,
}

impl From<ExpenseEntry> for ExpenseRow {
    fn from(entry: ExpenseEntry) -> Self {
        ExpenseRow {
            id: entry.id,
            name: entry.name,
            amount: entry.amount.to_f64().unwrap_or(0.0),
            budget: entry.budget,
            date: entry.date,
        }
    }
}

/// Pulls the bearer token from the Authorization header and verifies it.
/// Missing header, malformed token and bad signature all come back as the
/// same `Unauthorized`.
fn authenticate(token_secret: &str, headers: &HeaderMap) -> Result<Claims, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    // Clients send "Bearer <token>"; a bare token is accepted as-is.
    let token = value.strip_prefix("Bearer ").unwrap_or(value);

    auth::verify_token(token, token_secret).map_err(|_err| AppError::Unauthorized)
}

fn parse_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

fn non_empty_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

/// JSON numbers are doubles on the client, so a row id may arrive as `2` or
/// `2.0`; both address bigserial id 2. Fractional values match nothing.
fn whole_number_id(value: &Value) -> Option<i64> {
    let number = value.as_f64()?;
    if number.fract() == 0.0 {
        Some(number as i64)
    } else {
        None
    }
}

/// A zero amount fails the presence check, matching the deployed behavior
/// of the original service.
fn parse_amount(payload: &Value) -> Result<Decimal, AppError> {
    payload
        .get("amount")
        .and_then(Value::as_f64)
        .filter(|amount| *amount != 0.0)
        .and_then(Decimal::from_f64)
        .map(|amount| amount.round_dp(2))
        .ok_or(AppError::Invalid("Invalid amount"))
}

fn parse_budget_entry(payload: &Value) -> Result<(String, Decimal), AppError> {
    let name = non_empty_str(payload, "name").ok_or(AppError::Invalid("Invalid name"))?;
    let amount = parse_amount(payload)?;
    Ok((name.to_string(), amount))
}

#[derive(Debug)]
struct ExpenseDraft {
    name: String,
    amount: Decimal,
    budget: i64,
    date: String,
}

fn parse_expense_entry(payload: &Value) -> Result<ExpenseDraft, AppError> {
    let name = non_empty_str(payload, "name").ok_or(AppError::Invalid("Invalid name"))?;
    let amount = parse_amount(payload)?;

    let budget = payload
        .get("budget")
        .and_then(whole_number_id)
        .filter(|budget| *budget != 0)
        .ok_or(AppError::Invalid("Invalid budget"))?;

    // The original service reuses the budget error message for a bad date.
    let date = non_empty_str(payload, "date").ok_or(AppError::Invalid("Invalid budget"))?;

    Ok(ExpenseDraft {
        name: name.to_string(),
        amount,
        budget,
        date: date.to_string(),
    })
}

fn parse_entries(payload: &Value) -> Result<Vec<i64>, AppError> {
    let entries = payload
        .get("entries")
        .and_then(Value::as_array)
        .ok_or(AppError::Invalid("Invalid entries"))?;

    let mut ids = Vec::with_capacity(entries.len());
    for value in entries {
        if value.as_f64().is_none() {
            return Err(AppError::Invalid("Invalid entries"));
        }
        // A fractional id can never match a bigserial key, so it is dropped
        // rather than failing the whole request.
        if let Some(id) = whole_number_id(value) {
            ids.push(id);
        }
    }

    Ok(ids)
}

fn parse_registration(payload: &Value) -> Result<(&str, &str), AppError> {
    let username = non_empty_str(payload, "username").ok_or(AppError::Field {
        message: "Username required.",
        field: "username",
    })?;

    // Length is counted in UTF-16 code units, the way the web client's
    // `.length` counts it.
    if username.encode_utf16().count() < 3 {
        return Err(AppError::Field {
            message: "Username must be atleast 3 characters.",
            field: "username",
        });
    }

    let password = non_empty_str(payload, "password").ok_or(AppError::Field {
        message: "Password required.",
        field: "password",
    })?;

    let confirm_password = non_empty_str(payload, "confirm_password").ok_or(AppError::Field {
        message: "Confirm password required.",
        field: "confirm_password",
    })?;

    if password != confirm_password {
        return Err(AppError::Field {
            message: "Passwords must match",
            field: "confirm_password",
        });
    }

    Ok((username, password))
}

fn parse_credentials(payload: &Value) -> Result<(&str, &str), AppError> {
    let username = non_empty_str(payload, "username").ok_or(AppError::Field {
        message: "Username required.",
        field: "username",
    })?;

    let password = non_empty_str(payload, "password").ok_or(AppError::Field {
        message: "Password required.",
        field: "password",
    })?;

    Ok((username, password))
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TokenResponse>, AppError> {
    let payload = parse_body(&body);
    let (username, password) = parse_registration(&payload)?;

    if query_account_by_username(&state.pool, username)
        .await?
        .is_some()
    {
        return Err(AppError::Field {
            message: "Username taken.",
            field: "username",
        });
    }

    let password_hash = auth::hash_password(password)?;
    let uid = insert_account(&state.pool, username, &password_hash).await?;

    tracing::info!("Registered account uid={} username={}", uid, username);

    let token = auth::issue_token(uid, username, &state.token_secret)?;
    Ok(Json(TokenResponse { token }))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TokenResponse>, AppError> {
    let payload = parse_body(&body);
    let (username, password) = parse_credentials(&payload)?;

    let account = query_account_by_username(&state.pool, username)
        .await?
        .ok_or(AppError::Field {
            message: "Account not found.",
            field: "username",
        })?;

    if !auth::verify_password(&account.password, password) {
        return Err(AppError::Field {
            message: "Incorrect password.",
            field: "password",
        });
    }

    tracing::info!("Logged in account uid={}", account.id);

    let token = auth::issue_token(account.id, &account.username, &state.token_secret)?;
    Ok(Json(TokenResponse { token }))
}

/// POST inserts, DELETE removes owned rows, and every verb (supported or
/// not) responds with the caller's full current budget list.
#[axum::debug_handler]
pub async fn budget(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<BudgetRow>>, AppError> {
    let user = authenticate(&state.token_secret, &headers)?;
    let payload = parse_body(&body);

    if method == Method::POST {
        let (name, amount) = parse_budget_entry(&payload)?;
        insert_budget_entry(&state.pool, user.uid, &name, amount).await?;
    } else if method == Method::DELETE {
        let entries = parse_entries(&payload)?;
        delete_budget_entries(&state.pool, user.uid, &entries).await?;
    }

    let rows = query_budget_entries(&state.pool, user.uid).await?;
    Ok(Json(rows.into_iter().map(BudgetRow::from).collect()))
}

#[axum::debug_handler]
pub async fn expense(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<ExpenseRow>>, AppError> {
    let user = authenticate(&state.token_secret, &headers)?;
    let payload = parse_body(&body);

    if method == Method::POST {
        let draft = parse_expense_entry(&payload)?;

        // The referenced category must belong to the caller right now;
        // deleting it later leaves the expense behind.
        if !budget_entry_exists(&state.pool, user.uid, draft.budget).await? {
            return Err(AppError::Invalid("Invalid budget"));
        }

        insert_expense_entry(
            &state.pool,
            user.uid,
            &draft.name,
            draft.amount,
            draft.budget,
            &draft.date,
        )
        .await?;
    } else if method == Method::DELETE {
        let entries = parse_entries(&payload)?;
        delete_expense_entries(&state.pool, user.uid, &entries).await?;
    }

    let rows = query_expense_entries(&state.pool, user.uid).await?;
    Ok(Json(rows.into_iter().map(ExpenseRow::from).collect()))
}
