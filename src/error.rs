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

//! Error types for wallet operations.
//!
//! Every failure maps to a stable [`ErrorKind`] and [`WalletError::code`], so
//! boundary layers can translate errors without inspecting messages.

use crate::base::{TransactionId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Broad classification of a [`WalletError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Referenced user or transaction does not exist.
    NotFound,
    /// A balance or authorization rule blocks the operation.
    PolicyViolation,
    /// The payload is malformed (non-positive amount, bad registration data).
    InvalidInput,
    /// The underlying unit of work could not commit.
    StoreFailure,
}

/// Failures raised by the store while staging or committing a unit of work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row read by the unit of work changed before commit.
    #[error("concurrent modification detected")]
    Conflict,

    /// Commit kept conflicting and the store gave up.
    #[error("commit failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("user {0} does not exist in the store")]
    MissingUser(UserId),

    #[error("transaction {0} does not exist in the store")]
    MissingTransaction(TransactionId),

    /// Applying the staged delta would overflow the user's balance.
    #[error("balance of user {0} would overflow")]
    BalanceOverflow(UserId),
}

/// Wallet operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    /// Accounts with a negative balance may not receive deposits.
    #[error("deposit blocked: balance of user {0} is negative")]
    DepositBlocked(UserId),

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    /// Accounts with a negative balance may not send transfers.
    #[error("transfer blocked: balance of user {0} is negative")]
    TransferBlocked(UserId),

    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    #[error("transaction {0} already reversed")]
    AlreadyReversed(TransactionId),

    #[error("user {user} may not reverse transaction {transaction}")]
    NoPermission {
        user: UserId,
        transaction: TransactionId,
    },

    /// Reversal records are terminal and cannot themselves be reversed.
    #[error("transaction {0} is a reversal and cannot be reversed")]
    NotReversible(TransactionId),

    #[error("transfers to oneself are not allowed")]
    SelfTransfer,

    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    #[error("invalid user: {0}")]
    InvalidUser(String),

    #[error("email {0} is already registered")]
    EmailTaken(String),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl From<validator::ValidationErrors> for WalletError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidUser(errors.to_string())
    }
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UserNotFound(_) | Self::TransactionNotFound(_) => ErrorKind::NotFound,
            Self::DepositBlocked(_)
            | Self::InsufficientBalance { .. }
            | Self::TransferBlocked(_)
            | Self::AlreadyReversed(_)
            | Self::NoPermission { .. }
            | Self::NotReversible(_)
            | Self::SelfTransfer
            | Self::EmailTaken(_) => ErrorKind::PolicyViolation,
            Self::InvalidAmount | Self::InvalidUser(_) => ErrorKind::InvalidInput,
            Self::Store(_) => ErrorKind::StoreFailure,
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::DepositBlocked(_) => "DEPOSIT_BLOCKED",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::TransferBlocked(_) => "TRANSFER_BLOCKED",
            Self::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            Self::AlreadyReversed(_) => "ALREADY_REVERSED",
            Self::NoPermission { .. } => "NO_PERMISSION",
            Self::NotReversible(_) => "NOT_REVERSIBLE",
            Self::SelfTransfer => "SELF_TRANSFER",
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::InvalidUser(_) => "INVALID_USER",
            Self::EmailTaken(_) => "EMAIL_TAKEN",
            Self::Store(_) => "STORE_FAILURE",
        }
    }
}
