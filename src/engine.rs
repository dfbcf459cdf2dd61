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

//! Wallet transaction engine.
//!
//! The [`Engine`] is the only writer of user balances and of the transaction
//! log. It handles deposits, peer-to-peer transfers, and reversals.
//!
//! # Operations
//!
//! - **Deposit**: Credits a user, unless their balance is negative.
//! - **Transfer**: Moves funds between two users (fails on insufficient or negative balance).
//! - **Reverse**: Undoes a deposit or transfer by appending a compensating record.
//!
//! # Atomicity
//!
//! Each operation runs its read-check-mutate-append sequence inside one
//! [`Store::with_transaction`] unit. A rejected operation leaves the store
//! untouched; the engine never retries and never compensates by hand.

use crate::base::{TransactionId, UserId};
use crate::config::EngineConfig;
use crate::error::{ErrorKind, WalletError};
use crate::store::{MemoryStore, Store};
use crate::transaction::{NewTransaction, Transaction, TransactionKind, TransactionStatus};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

/// Wallet engine over a transactional [`Store`].
///
/// # Invariants
///
/// - Transaction amounts are strictly positive.
/// - A user with a negative balance cannot deposit or send transfers.
/// - A transaction is reversed at most once, and reversals are never reversed.
/// - Only the payer or payee of a transaction may reverse it.
pub struct Engine<S = MemoryStore> {
    pub(crate) store: S,
    config: EngineConfig,
}

impl Engine<MemoryStore> {
    /// Creates an engine over an empty in-memory store with default settings.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(), EngineConfig::default())
    }
}

impl Default for Engine<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> Engine<S> {
    pub fn with_store(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Credits `amount` to `user_id`.
    ///
    /// # Errors
    ///
    /// - [`WalletError::InvalidAmount`] - `amount` is not positive.
    /// - [`WalletError::UserNotFound`] - No such user.
    /// - [`WalletError::DepositBlocked`] - The user's balance is negative.
    /// - [`WalletError::Store`] - The unit of work failed to commit.
    pub fn deposit(&self, user_id: UserId, amount: Decimal) -> Result<Transaction, WalletError> {
        info!(user = %user_id, %amount, "deposit requested");
        ensure_positive(amount)?;

        let result = self.store.with_transaction(|unit| {
            let user = unit
                .get_user(user_id)?
                .ok_or(WalletError::UserNotFound(user_id))?;

            if user.balance < Decimal::ZERO {
                return Err(WalletError::DepositBlocked(user_id));
            }

            unit.update_user_balance(user_id, amount)?;
            unit.create_transaction(NewTransaction::deposit(user_id, amount)?)
        });

        Self::log_result("deposit", user_id, &result);
        result
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// The insufficient-balance check runs before the negative-balance check,
    /// so for positive amounts a negative payer always sees
    /// [`WalletError::InsufficientBalance`].
    ///
    /// # Errors
    ///
    /// - [`WalletError::InvalidAmount`] - `amount` is not positive.
    /// - [`WalletError::SelfTransfer`] - `from == to` and self-transfers are disabled.
    /// - [`WalletError::UserNotFound`] - Either user does not exist.
    /// - [`WalletError::InsufficientBalance`] - The payer's balance is below `amount`.
    /// - [`WalletError::TransferBlocked`] - The payer's balance is negative.
    /// - [`WalletError::Store`] - The unit of work failed to commit.
    pub fn transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: Decimal,
    ) -> Result<Transaction, WalletError> {
        info!(user = %from, %to, %amount, "transfer requested");
        ensure_positive(amount)?;
        if from == to && !self.config.allow_self_transfer {
            warn!(user = %from, "self-transfer rejected");
            return Err(WalletError::SelfTransfer);
        }

        let result = self.store.with_transaction(|unit| {
            let payer = unit
                .get_user(from)?
                .ok_or(WalletError::UserNotFound(from))?;
            if unit.get_user(to)?.is_none() {
                return Err(WalletError::UserNotFound(to));
            }

            if payer.balance < amount {
                return Err(WalletError::InsufficientBalance {
                    available: payer.balance,
                    requested: amount,
                });
            }
            if payer.balance < Decimal::ZERO {
                return Err(WalletError::TransferBlocked(from));
            }

            unit.update_user_balance(from, -amount)?;
            unit.update_user_balance(to, amount)?;
            unit.create_transaction(NewTransaction::transfer(from, to, amount)?)
        });

        Self::log_result("transfer", from, &result);
        result
    }

    /// Reverses `transaction_id` on behalf of `caller`, returning the new
    /// reversal record.
    ///
    /// The original is marked [`TransactionStatus::Reversed`] and its balance
    /// effect is undone, even if that drives a balance negative.
    ///
    /// # Errors
    ///
    /// - [`WalletError::TransactionNotFound`] - No such transaction.
    /// - [`WalletError::AlreadyReversed`] - The transaction was already reversed.
    /// - [`WalletError::NoPermission`] - `caller` is neither payer nor payee.
    /// - [`WalletError::NotReversible`] - The transaction is itself a reversal.
    /// - [`WalletError::Store`] - The unit of work failed to commit.
    pub fn reverse(
        &self,
        caller: UserId,
        transaction_id: TransactionId,
    ) -> Result<Transaction, WalletError> {
        info!(user = %caller, transaction = %transaction_id, "reversal requested");

        let result = self.store.with_transaction(|unit| {
            let original = unit
                .get_transaction(transaction_id)?
                .ok_or(WalletError::TransactionNotFound(transaction_id))?;

            if original.status() == TransactionStatus::Reversed {
                return Err(WalletError::AlreadyReversed(transaction_id));
            }
            if !original.involves(caller) {
                return Err(WalletError::NoPermission {
                    user: caller,
                    transaction: transaction_id,
                });
            }

            let amount = original.amount();
            match original.kind() {
                TransactionKind::Deposit { to } => {
                    unit.update_user_balance(to, -amount)?;
                }
                TransactionKind::Transfer { from, to } => {
                    unit.update_user_balance(from, amount)?;
                    unit.update_user_balance(to, -amount)?;
                }
                TransactionKind::Reversal { .. } => {
                    return Err(WalletError::NotReversible(transaction_id));
                }
            }

            unit.update_transaction_status(
                transaction_id,
                TransactionStatus::Reversed,
                Some(Utc::now()),
            )?;
            unit.create_transaction(NewTransaction::reversal_of(&original)?)
        });

        Self::log_result("reversal", caller, &result);
        result
    }

    /// Logs the outcome of a wallet operation at a level matching its kind.
    fn log_result(operation: &str, user: UserId, result: &Result<Transaction, WalletError>) {
        match result {
            Ok(transaction) => info!(
                user = %user,
                transaction = %transaction.id(),
                amount = %transaction.amount(),
                "{operation} completed"
            ),
            Err(e) if e.kind() == ErrorKind::StoreFailure => {
                error!(user = %user, error = %e, "{operation} failed")
            }
            Err(e) => warn!(user = %user, code = e.code(), error = %e, "{operation} rejected"),
        }
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), WalletError> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::InvalidAmount);
    }
    Ok(())
}
