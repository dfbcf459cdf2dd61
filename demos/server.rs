// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! REST API server exposing the wallet engine.
//!
//! Run with: `cargo run --example server`
//!
//! The caller is identified by an `x-user-id` header carrying their user id,
//! standing in for a real token layer.
//!
//! ## Endpoints
//!
//! - `POST /users` - Register a user
//! - `GET /users/me` - The caller's profile
//! - `GET /users?page=1&limit=10` - Other users, newest first
//! - `GET /wallet/transactions` - The caller's transaction history
//! - `POST /wallet/deposit` - Credit the caller
//! - `POST /wallet/transfer` - Pay another user
//! - `POST /wallet/reverse` - Reverse a transaction the caller took part in
//!
//! ## Example Usage
//!
//! ```bash
//! # Register
//! curl -X POST http://localhost:3000/users \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Alice", "email": "alice@example.com", "passwordHash": "x"}'
//!
//! # Deposit
//! curl -X POST http://localhost:3000/wallet/deposit \
//!   -H "Content-Type: application/json" -H "x-user-id: $ALICE" \
//!   -d '{"amount": "100.00"}'
//!
//! # Transfer
//! curl -X POST http://localhost:3000/wallet/transfer \
//!   -H "Content-Type: application/json" -H "x-user-id: $ALICE" \
//!   -d '{"toUserId": "'$BOB'", "amount": "25.00"}'
//! ```

use axum::{
    Json, Router,
    extract::{FromRequestParts, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wallet_ledger::{
    Engine, NewUser, Page, PageRequest, Transaction, TransactionId, User, UserId, UserSummary,
    WalletError,
};

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub to_user_id: UserId,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseRequest {
    pub transaction_id: TransactionId,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the wallet engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Authentication ===

/// Caller identity taken from the `x-user-id` header.
pub struct Caller(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .map(Caller)
            .ok_or(AppError::Unauthenticated)
    }
}

// === Error Handling ===

/// Converts wallet errors into HTTP responses.
pub enum AppError {
    Wallet(WalletError),
    Unauthenticated,
}

impl From<WalletError> for AppError {
    fn from(err: WalletError) -> Self {
        AppError::Wallet(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, code) = match self {
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "missing or invalid x-user-id header".to_string(),
                "UNAUTHENTICATED",
            ),
            AppError::Wallet(err) => {
                let status = match &err {
                    WalletError::DepositBlocked(_)
                    | WalletError::InsufficientBalance { .. }
                    | WalletError::TransferBlocked(_)
                    | WalletError::NoPermission { .. } => StatusCode::FORBIDDEN,
                    WalletError::EmailTaken(_) => StatusCode::CONFLICT,
                    WalletError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
                    WalletError::UserNotFound(_)
                    | WalletError::TransactionNotFound(_)
                    | WalletError::AlreadyReversed(_)
                    | WalletError::NotReversible(_)
                    | WalletError::SelfTransfer
                    | WalletError::InvalidAmount
                    | WalletError::InvalidUser(_) => StatusCode::BAD_REQUEST,
                };
                (status, err.to_string(), err.code())
            }
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /users - Register a user.
async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let new_user = NewUser::new(request.name, request.email, request.password_hash)?;
    let user = state.engine.register_user(new_user)?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /users/me - The caller's profile.
async fn me(State(state): State<AppState>, Caller(caller): Caller) -> Result<Json<User>, AppError> {
    Ok(Json(state.engine.profile(caller)?))
}

/// GET /users - Every other user, paginated.
async fn list_users(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(request): Query<PageRequest>,
) -> Result<Json<Page<UserSummary>>, AppError> {
    Ok(Json(state.engine.list_users(caller, request)?))
}

/// GET /wallet/transactions - The caller's history.
async fn history(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(state.engine.history(caller)?))
}

/// POST /wallet/deposit - Credit the caller.
async fn deposit(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<DepositRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let tx = state.engine.deposit(caller, request.amount)?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// POST /wallet/transfer - Pay another user.
async fn transfer(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<TransferRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let tx = state
        .engine
        .transfer(caller, request.to_user_id, request.amount)?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// POST /wallet/reverse - Reverse a transaction.
async fn reverse(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<ReverseRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let tx = state.engine.reverse(caller, request.transaction_id)?;
    Ok((StatusCode::CREATED, Json(tx)))
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(register).get(list_users))
        .route("/users/me", get(me))
        .route("/wallet/transactions", get(history))
        .route("/wallet/deposit", post(deposit))
        .route("/wallet/transfer", post(transfer))
        .route("/wallet/reverse", post(reverse))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let state = AppState {
        engine: Arc::new(Engine::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    info!("wallet API server running on http://127.0.0.1:3000");

    axum::serve(listener, app).await.unwrap();
}
