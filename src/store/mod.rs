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

//! Storage collaborator consumed by the engine.
//!
//! The engine never touches balances or the log directly. It asks a [`Store`]
//! for a unit of work and performs every read and write of one operation
//! through it; the store commits all of them together or none of them.

pub mod memory;

use crate::base::{TransactionId, UserId};
use crate::error::WalletError;
use crate::transaction::{NewTransaction, Transaction, TransactionStatus};
use crate::user::{NewUser, User};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub use memory::MemoryStore;

/// Handle to an open atomic unit of work.
///
/// Reads observe the unit's own staged writes. Nothing is visible to other
/// units until the store commits.
pub trait UnitOfWork {
    fn get_user(&mut self, id: UserId) -> Result<Option<User>, WalletError>;

    /// Adds `delta` (possibly negative) to the user's balance.
    fn update_user_balance(&mut self, id: UserId, delta: Decimal) -> Result<(), WalletError>;

    /// Appends a new record to the log and returns it as it will be committed.
    fn create_transaction(&mut self, new: NewTransaction) -> Result<Transaction, WalletError>;

    fn get_transaction(&mut self, id: TransactionId) -> Result<Option<Transaction>, WalletError>;

    fn update_transaction_status(
        &mut self,
        id: TransactionId,
        status: TransactionStatus,
        reversed_at: Option<DateTime<Utc>>,
    ) -> Result<(), WalletError>;
}

/// Transactional data store holding user balances and the transaction log.
pub trait Store: Send + Sync {
    /// Runs `f` inside one atomic unit of work.
    ///
    /// If `f` returns an error (or panics) nothing it staged is applied. A
    /// store may run `f` more than once when a commit conflicts with a
    /// concurrent unit, so `f` must not have side effects outside the unit.
    fn with_transaction<T, F>(&self, f: F) -> Result<T, WalletError>
    where
        F: FnMut(&mut dyn UnitOfWork) -> Result<T, WalletError>;

    /// # Errors
    ///
    /// Returns [`WalletError::EmailTaken`] if the email is already registered.
    fn insert_user(&self, new_user: NewUser) -> Result<User, WalletError>;

    fn find_user(&self, id: UserId) -> Option<User>;

    fn find_transaction(&self, id: TransactionId) -> Option<Transaction>;

    /// Snapshot of every user, in no particular order.
    fn users(&self) -> Vec<User>;

    /// Snapshot of the log in append order.
    fn transactions(&self) -> Vec<Transaction>;

    /// Overwrites a balance outside the engine's rules.
    fn set_balance(&self, id: UserId, balance: Decimal) -> Result<(), WalletError>;
}
