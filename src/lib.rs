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

//! # Wallet Ledger
//!
//! This library provides a multi-tenant wallet engine: users hold a balance
//! and perform deposits, peer-to-peer transfers, and reversals of earlier
//! transactions, all recorded in an append-only, auditable transaction log.
//!
//! ## Core Components
//!
//! - [`Engine`]: Wallet transaction engine, the sole writer of balances and the log
//! - [`Store`] / [`UnitOfWork`]: Transactional storage contract consumed by the engine
//! - [`MemoryStore`]: Concurrent in-memory store with optimistic row versioning
//! - [`Transaction`]: Log record (deposit, transfer, or reversal)
//! - [`WalletError`]: Error types with stable kinds and codes
//!
//! ## Example
//!
//! ```
//! use wallet_ledger::{Engine, NewUser, Store, TransactionStatus};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! let alice = engine.register_user(NewUser::new("Alice", "alice@example.com", "hash").unwrap()).unwrap();
//! let bob = engine.register_user(NewUser::new("Bob", "bob@example.com", "hash").unwrap()).unwrap();
//!
//! engine.deposit(alice.id, dec!(200)).unwrap();
//! let transfer = engine.transfer(alice.id, bob.id, dec!(50)).unwrap();
//! assert_eq!(engine.profile(bob.id).unwrap().balance, dec!(50));
//!
//! // Either party may reverse it.
//! engine.reverse(bob.id, transfer.id()).unwrap();
//! assert_eq!(engine.profile(alice.id).unwrap().balance, dec!(200));
//! assert_eq!(
//!     engine.store().find_transaction(transfer.id()).unwrap().status(),
//!     TransactionStatus::Reversed
//! );
//! ```
//!
//! ## Thread Safety
//!
//! The engine is `Sync`: operations on different users run in parallel, and
//! operations touching the same user are serialized by the store.

mod base;
pub mod config;
mod directory;
mod engine;
pub mod error;
pub mod store;
mod transaction;
mod user;

pub use base::{TransactionId, UserId};
pub use config::{Config, EngineConfig, StoreConfig};
pub use engine::Engine;
pub use error::{ErrorKind, StoreError, WalletError};
pub use store::{MemoryStore, Store, UnitOfWork};
pub use transaction::{
    NewTransaction, Transaction, TransactionKind, TransactionStatus, TransactionType,
};
pub use user::{NewUser, Page, PageRequest, Pagination, User, UserStatus, UserSummary};
