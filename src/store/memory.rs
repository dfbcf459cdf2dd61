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

//! In-memory [`Store`] with row-level optimistic concurrency.
//!
//! Every user and every log record lives in its own [`Mutex`]-guarded row
//! carrying a version. A unit of work reads rows without holding their locks,
//! remembers the versions it saw and stages its writes. Commit then:
//!
//! 1. locks every touched row in canonical order (log rows, then user rows,
//!    each ascending by id),
//! 2. checks that no row it read has changed since,
//! 3. applies staged balance deltas, status updates and new records.
//!
//! A changed row means another unit committed first; the whole closure is
//! re-run on a fresh unit, up to [`StoreConfig::max_commit_attempts`] times.
//! The fixed lock order means two transfers A→B and B→A can never deadlock.

use crate::base::{TransactionId, UserId};
use crate::config::StoreConfig;
use crate::error::{StoreError, WalletError};
use crate::store::{Store, UnitOfWork};
use crate::transaction::{NewTransaction, Transaction, TransactionStatus};
use crate::user::{NewUser, User};
use chrono::{DateTime, Utc};
use crossbeam::utils::Backoff;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug)]
struct Versioned<T> {
    value: T,
    version: u64,
}

impl<T> Versioned<T> {
    fn new(value: T) -> Self {
        Self { value, version: 0 }
    }
}

type Row<T> = Arc<Mutex<Versioned<T>>>;

fn row<T>(value: T) -> Row<T> {
    Arc::new(Mutex::new(Versioned::new(value)))
}

/// A log record plus its position in append order.
#[derive(Debug, Clone)]
struct LogEntry {
    sequence: u64,
    row: Row<Transaction>,
}

/// Thread-safe in-memory store.
#[derive(Debug)]
pub struct MemoryStore {
    users: DashMap<UserId, Row<User>>,
    /// Lowercased email to owner, for uniqueness.
    emails: DashMap<String, UserId>,
    transactions: DashMap<TransactionId, LogEntry>,
    sequence: AtomicU64,
    config: StoreConfig,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            users: DashMap::new(),
            emails: DashMap::new(),
            transactions: DashMap::new(),
            sequence: AtomicU64::new(0),
            config,
        }
    }

    // Map guards are released before any row is locked.
    fn user_row(&self, id: UserId) -> Option<Row<User>> {
        self.users.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    fn log_entry(&self, id: TransactionId) -> Option<LogEntry> {
        self.transactions.get(&id).map(|entry| entry.value().clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn with_transaction<T, F>(&self, mut f: F) -> Result<T, WalletError>
    where
        F: FnMut(&mut dyn UnitOfWork) -> Result<T, WalletError>,
    {
        let max_attempts = self.config.max_commit_attempts.max(1);
        let backoff = Backoff::new();

        for attempt in 1..=max_attempts {
            let mut unit = MemoryUnit::new(self);
            // Dropping an uncommitted unit discards everything it staged.
            let value = f(&mut unit)?;
            match unit.commit() {
                Ok(()) => return Ok(value),
                Err(StoreError::Conflict) => {
                    debug!(attempt, max_attempts, "commit conflicted, retrying");
                    backoff.snooze();
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::RetriesExhausted {
            attempts: max_attempts,
        }
        .into())
    }

    fn insert_user(&self, new_user: NewUser) -> Result<User, WalletError> {
        match self.emails.entry(new_user.email().to_ascii_lowercase()) {
            Entry::Occupied(_) => Err(WalletError::EmailTaken(new_user.email().to_string())),
            Entry::Vacant(entry) => {
                let id = UserId::new();
                let user = User::create(id, new_user, Utc::now());
                self.users.insert(id, row(user.clone()));
                entry.insert(id);
                Ok(user)
            }
        }
    }

    fn find_user(&self, id: UserId) -> Option<User> {
        self.user_row(id).map(|row| row.lock().value.clone())
    }

    fn find_transaction(&self, id: TransactionId) -> Option<Transaction> {
        self.log_entry(id).map(|entry| entry.row.lock().value.clone())
    }

    fn users(&self) -> Vec<User> {
        let rows: Vec<Row<User>> = self
            .users
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        rows.iter().map(|row| row.lock().value.clone()).collect()
    }

    fn transactions(&self) -> Vec<Transaction> {
        let mut entries: Vec<LogEntry> = self
            .transactions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries
            .iter()
            .map(|entry| entry.row.lock().value.clone())
            .collect()
    }

    fn set_balance(&self, id: UserId, balance: Decimal) -> Result<(), WalletError> {
        let row = self.user_row(id).ok_or(WalletError::UserNotFound(id))?;
        let mut guard = row.lock();
        guard.value.balance = balance;
        guard.version += 1;
        Ok(())
    }
}

/// Staged reads and writes of one attempt.
struct MemoryUnit<'a> {
    store: &'a MemoryStore,
    /// Version observed on first read of each row.
    user_reads: BTreeMap<UserId, u64>,
    transaction_reads: BTreeMap<TransactionId, u64>,
    balance_deltas: BTreeMap<UserId, Decimal>,
    status_updates: BTreeMap<TransactionId, Transaction>,
    created: Vec<Transaction>,
}

impl<'a> MemoryUnit<'a> {
    fn new(store: &'a MemoryStore) -> Self {
        Self {
            store,
            user_reads: BTreeMap::new(),
            transaction_reads: BTreeMap::new(),
            balance_deltas: BTreeMap::new(),
            status_updates: BTreeMap::new(),
            created: Vec::new(),
        }
    }

    fn commit(self) -> Result<(), StoreError> {
        let transaction_ids: BTreeSet<TransactionId> = self
            .transaction_reads
            .keys()
            .chain(self.status_updates.keys())
            .copied()
            .collect();
        let user_ids: BTreeSet<UserId> = self
            .user_reads
            .keys()
            .chain(self.balance_deltas.keys())
            .copied()
            .collect();

        let transaction_rows = transaction_ids
            .iter()
            .map(|&id| {
                self.store
                    .log_entry(id)
                    .map(|entry| (id, entry.row))
                    .ok_or(StoreError::MissingTransaction(id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let user_rows = user_ids
            .iter()
            .map(|&id| {
                self.store
                    .user_row(id)
                    .map(|row| (id, row))
                    .ok_or(StoreError::MissingUser(id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // BTreeSet iteration is ascending, so this is the canonical order.
        let mut transaction_guards: Vec<_> = transaction_rows
            .iter()
            .map(|(id, row)| (*id, row.lock()))
            .collect();
        let mut user_guards: Vec<_> = user_rows
            .iter()
            .map(|(id, row)| (*id, row.lock()))
            .collect();

        let stale_transaction = transaction_guards.iter().any(|(id, guard)| {
            self.transaction_reads
                .get(id)
                .is_some_and(|seen| *seen != guard.version)
        });
        let stale_user = user_guards.iter().any(|(id, guard)| {
            self.user_reads
                .get(id)
                .is_some_and(|seen| *seen != guard.version)
        });
        if stale_transaction || stale_user {
            return Err(StoreError::Conflict);
        }

        // Every new balance is computed before any row is written.
        let balances = user_guards
            .iter()
            .map(|(id, guard)| match self.balance_deltas.get(id) {
                Some(delta) => guard
                    .value
                    .balance
                    .checked_add(*delta)
                    .map(Some)
                    .ok_or(StoreError::BalanceOverflow(*id)),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (id, guard) in transaction_guards.iter_mut() {
            if let Some(staged) = self.status_updates.get(&*id) {
                guard.value = staged.clone();
                guard.version += 1;
            }
        }
        for ((_, guard), balance) in user_guards.iter_mut().zip(balances) {
            if let Some(balance) = balance {
                guard.value.balance = balance;
                guard.version += 1;
            }
        }
        // Sequenced while the touched rows are still locked, so the log
        // follows commit order.
        for transaction in self.created {
            let sequence = self.store.sequence.fetch_add(1, Ordering::Relaxed);
            self.store.transactions.insert(
                transaction.id(),
                LogEntry {
                    sequence,
                    row: row(transaction),
                },
            );
        }

        Ok(())
    }
}

impl UnitOfWork for MemoryUnit<'_> {
    fn get_user(&mut self, id: UserId) -> Result<Option<User>, WalletError> {
        let Some(row) = self.store.user_row(id) else {
            return Ok(None);
        };
        let (mut user, version) = {
            let guard = row.lock();
            (guard.value.clone(), guard.version)
        };
        self.user_reads.entry(id).or_insert(version);
        if let Some(delta) = self.balance_deltas.get(&id) {
            user.balance = user
                .balance
                .checked_add(*delta)
                .ok_or(StoreError::BalanceOverflow(id))?;
        }
        Ok(Some(user))
    }

    fn update_user_balance(&mut self, id: UserId, delta: Decimal) -> Result<(), WalletError> {
        if !self.store.users.contains_key(&id) {
            return Err(StoreError::MissingUser(id).into());
        }
        let staged = self.balance_deltas.entry(id).or_insert(Decimal::ZERO);
        *staged = staged
            .checked_add(delta)
            .ok_or(StoreError::BalanceOverflow(id))?;
        Ok(())
    }

    fn create_transaction(&mut self, new: NewTransaction) -> Result<Transaction, WalletError> {
        let transaction = Transaction::create(TransactionId::new(), new, Utc::now());
        self.created.push(transaction.clone());
        Ok(transaction)
    }

    fn get_transaction(&mut self, id: TransactionId) -> Result<Option<Transaction>, WalletError> {
        if let Some(created) = self.created.iter().find(|tx| tx.id() == id) {
            return Ok(Some(created.clone()));
        }
        if let Some(staged) = self.status_updates.get(&id) {
            return Ok(Some(staged.clone()));
        }
        let Some(entry) = self.store.log_entry(id) else {
            return Ok(None);
        };
        let (transaction, version) = {
            let guard = entry.row.lock();
            (guard.value.clone(), guard.version)
        };
        self.transaction_reads.entry(id).or_insert(version);
        Ok(Some(transaction))
    }

    fn update_transaction_status(
        &mut self,
        id: TransactionId,
        status: TransactionStatus,
        reversed_at: Option<DateTime<Utc>>,
    ) -> Result<(), WalletError> {
        if let Some(created) = self.created.iter_mut().find(|tx| tx.id() == id) {
            return created.transition(status, reversed_at);
        }
        let mut staged = self
            .get_transaction(id)?
            .ok_or(StoreError::MissingTransaction(id))?;
        staged.transition(status, reversed_at)?;
        self.status_updates.insert(id, staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    fn register(store: &MemoryStore, name: &str) -> User {
        let email = format!("{}@example.com", name.to_lowercase());
        store
            .insert_user(NewUser::new(name, email, "hash").unwrap())
            .unwrap()
    }

    #[test]
    fn insert_and_find_user() {
        let store = MemoryStore::new();
        let user = register(&store, "Alice");

        let found = store.find_user(user.id).unwrap();
        assert_eq!(found, user);
        assert_eq!(found.balance, Decimal::ZERO);
        assert_eq!(store.users().len(), 1);
    }

    #[test]
    fn duplicate_email_is_rejected_case_insensitively() {
        let store = MemoryStore::new();
        register(&store, "Alice");

        let result = store.insert_user(NewUser::new("Alice Two", "ALICE@example.com", "h").unwrap());
        assert_eq!(
            result,
            Err(WalletError::EmailTaken("ALICE@example.com".into()))
        );
        assert_eq!(store.users().len(), 1);
    }

    #[test]
    fn committed_unit_applies_all_writes() {
        let store = MemoryStore::new();
        let user = register(&store, "Alice");

        let tx = store
            .with_transaction(|unit| {
                unit.update_user_balance(user.id, dec!(100))?;
                unit.create_transaction(NewTransaction::deposit(user.id, dec!(100))?)
            })
            .unwrap();

        assert_eq!(store.find_user(user.id).unwrap().balance, dec!(100));
        assert_eq!(store.find_transaction(tx.id()), Some(tx));
    }

    #[test]
    fn failed_unit_applies_nothing() {
        let store = MemoryStore::new();
        let user = register(&store, "Alice");

        let result: Result<(), WalletError> = store.with_transaction(|unit| {
            unit.update_user_balance(user.id, dec!(100))?;
            unit.create_transaction(NewTransaction::deposit(user.id, dec!(100))?)?;
            Err(WalletError::DepositBlocked(user.id))
        });

        assert_eq!(result, Err(WalletError::DepositBlocked(user.id)));
        assert_eq!(store.find_user(user.id).unwrap().balance, Decimal::ZERO);
        assert!(store.transactions().is_empty());
    }

    #[test]
    fn panicking_unit_applies_nothing() {
        let store = MemoryStore::new();
        let user = register(&store, "Alice");

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), WalletError> = store.with_transaction(|unit| {
                unit.update_user_balance(user.id, dec!(100))?;
                panic!("boom");
            });
        }));

        assert!(result.is_err());
        assert_eq!(store.find_user(user.id).unwrap().balance, Decimal::ZERO);
        // Row locks were released on unwind.
        store.set_balance(user.id, dec!(1)).unwrap();
    }

    #[test]
    fn unit_reads_its_own_writes() {
        let store = MemoryStore::new();
        let user = register(&store, "Alice");

        store
            .with_transaction(|unit| {
                unit.update_user_balance(user.id, dec!(30))?;
                unit.update_user_balance(user.id, dec!(-5))?;
                let seen = unit.get_user(user.id)?.unwrap();
                assert_eq!(seen.balance, dec!(25));

                let tx = unit.create_transaction(NewTransaction::deposit(user.id, dec!(25))?)?;
                unit.update_transaction_status(tx.id(), TransactionStatus::Reversed, None)?;
                let staged = unit.get_transaction(tx.id())?.unwrap();
                assert_eq!(staged.status(), TransactionStatus::Reversed);
                Ok(())
            })
            .unwrap();

        // Staged writes are invisible to other readers only until commit.
        assert_eq!(store.find_user(user.id).unwrap().balance, dec!(25));
    }

    #[test]
    fn stale_read_conflicts_on_commit() {
        let store = MemoryStore::new();
        let user = register(&store, "Alice");

        let mut first = MemoryUnit::new(&store);
        first.get_user(user.id).unwrap();
        first.update_user_balance(user.id, dec!(10)).unwrap();

        let mut second = MemoryUnit::new(&store);
        second.get_user(user.id).unwrap();
        second.update_user_balance(user.id, dec!(20)).unwrap();
        second.commit().unwrap();

        assert_eq!(first.commit(), Err(StoreError::Conflict));
        assert_eq!(store.find_user(user.id).unwrap().balance, dec!(20));
    }

    #[test]
    fn blind_increments_do_not_conflict() {
        let store = MemoryStore::new();
        let user = register(&store, "Alice");

        let mut first = MemoryUnit::new(&store);
        first.update_user_balance(user.id, dec!(10)).unwrap();
        let mut second = MemoryUnit::new(&store);
        second.update_user_balance(user.id, dec!(20)).unwrap();

        second.commit().unwrap();
        first.commit().unwrap();
        assert_eq!(store.find_user(user.id).unwrap().balance, dec!(30));
    }

    #[test]
    fn conflicts_exhaust_retries() {
        let store = MemoryStore::with_config(StoreConfig {
            max_commit_attempts: 2,
        });
        let user = register(&store, "Alice");
        let mut runs = 0;

        let result = store.with_transaction(|unit| {
            runs += 1;
            let seen = unit.get_user(user.id)?.unwrap();
            // Another writer sneaks in between read and commit.
            store.set_balance(user.id, seen.balance + dec!(1))?;
            unit.update_user_balance(user.id, dec!(100))
        });

        assert_eq!(
            result,
            Err(WalletError::Store(StoreError::RetriesExhausted { attempts: 2 }))
        );
        assert_eq!(runs, 2);
        assert_eq!(store.find_user(user.id).unwrap().balance, dec!(2));
    }

    #[test]
    fn writes_to_missing_rows_fail() {
        let store = MemoryStore::new();
        let ghost = UserId::new();

        let result = store.with_transaction(|unit| unit.update_user_balance(ghost, dec!(1)));
        assert_eq!(result, Err(WalletError::Store(StoreError::MissingUser(ghost))));

        let missing = TransactionId::new();
        let result = store.with_transaction(|unit| {
            unit.update_transaction_status(missing, TransactionStatus::Reversed, None)
        });
        assert_eq!(
            result,
            Err(WalletError::Store(StoreError::MissingTransaction(missing)))
        );
    }

    #[test]
    fn log_preserves_append_order() {
        let store = MemoryStore::new();
        let user = register(&store, "Alice");

        let ids: Vec<TransactionId> = (1..=5)
            .map(|i| {
                store
                    .with_transaction(|unit| {
                        unit.create_transaction(NewTransaction::deposit(user.id, Decimal::from(i))?)
                    })
                    .unwrap()
                    .id()
            })
            .collect();

        let logged: Vec<TransactionId> = store.transactions().iter().map(Transaction::id).collect();
        assert_eq!(logged, ids);
    }

    #[test]
    fn overflowing_commit_applies_nothing() {
        let store = MemoryStore::new();
        let payer = register(&store, "Alice");
        let payee = register(&store, "Bob");
        store.set_balance(payer.id, dec!(10)).unwrap();
        store.set_balance(payee.id, Decimal::MAX).unwrap();
        let original = store
            .with_transaction(|unit| {
                unit.create_transaction(NewTransaction::deposit(payer.id, dec!(10))?)
            })
            .unwrap();

        // Status update, debit and credit staged together; only the credit overflows.
        let mut unit = MemoryUnit::new(&store);
        unit.update_transaction_status(
            original.id(),
            TransactionStatus::Reversed,
            Some(Utc::now()),
        )
        .unwrap();
        unit.update_user_balance(payer.id, dec!(-10)).unwrap();
        unit.update_user_balance(payee.id, dec!(10)).unwrap();
        unit.create_transaction(NewTransaction::deposit(payee.id, dec!(10)).unwrap())
            .unwrap();

        assert_eq!(unit.commit(), Err(StoreError::BalanceOverflow(payee.id)));
        assert_eq!(store.find_user(payer.id).unwrap().balance, dec!(10));
        assert_eq!(store.find_user(payee.id).unwrap().balance, Decimal::MAX);
        assert_eq!(
            store.find_transaction(original.id()).unwrap().status(),
            TransactionStatus::Completed
        );
        assert_eq!(store.transactions().len(), 1);
    }

    #[test]
    fn overflowing_stage_is_rejected() {
        let store = MemoryStore::new();
        let user = register(&store, "Alice");

        let result = store.with_transaction(|unit| {
            unit.update_user_balance(user.id, Decimal::MAX)?;
            unit.update_user_balance(user.id, Decimal::MAX)
        });
        assert_eq!(
            result,
            Err(WalletError::Store(StoreError::BalanceOverflow(user.id)))
        );

        store.set_balance(user.id, Decimal::MAX).unwrap();
        let result = store.with_transaction(|unit| {
            unit.update_user_balance(user.id, dec!(1))?;
            unit.get_user(user.id).map(|_| ())
        });
        assert_eq!(
            result,
            Err(WalletError::Store(StoreError::BalanceOverflow(user.id)))
        );
        assert_eq!(store.find_user(user.id).unwrap().balance, Decimal::MAX);
    }

    #[test]
    fn set_balance_requires_existing_user() {
        let store = MemoryStore::new();
        let ghost = UserId::new();
        assert_eq!(
            store.set_balance(ghost, dec!(-10)),
            Err(WalletError::UserNotFound(ghost))
        );
    }
}
