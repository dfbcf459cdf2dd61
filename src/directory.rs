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

//! User-facing reads and registration.
//!
//! These operations sit next to the wallet engine but never move money:
//! registering users, reading profiles and history, paging through other
//! users, and the administrative balance override.

use crate::base::UserId;
use crate::engine::Engine;
use crate::error::WalletError;
use crate::store::Store;
use crate::transaction::Transaction;
use crate::user::{NewUser, Page, PageRequest, User, UserSummary};
use rust_decimal::Decimal;
use tracing::{info, warn};
use validator::Validate;

impl<S: Store> Engine<S> {
    /// Registers a user with a zero balance.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::EmailTaken`] if the email is already registered.
    pub fn register_user(&self, new_user: NewUser) -> Result<User, WalletError> {
        info!(email = new_user.email(), "registration requested");
        match self.store.insert_user(new_user) {
            Ok(user) => {
                info!(user = %user.id, "user registered");
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "registration rejected");
                Err(e)
            }
        }
    }

    pub fn profile(&self, user_id: UserId) -> Result<User, WalletError> {
        self.store
            .find_user(user_id)
            .ok_or(WalletError::UserNotFound(user_id))
    }

    /// Pages through every user except `caller`, newest first.
    pub fn list_users(
        &self,
        caller: UserId,
        request: PageRequest,
    ) -> Result<Page<UserSummary>, WalletError> {
        request.validate()?;

        let mut others: Vec<User> = self
            .store
            .users()
            .into_iter()
            .filter(|user| user.id != caller)
            .collect();
        others.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let summaries = others.iter().map(User::summary).collect();
        Ok(Page::slice(summaries, request))
    }

    /// Every transaction `user_id` is party to, in log order.
    pub fn history(&self, user_id: UserId) -> Result<Vec<Transaction>, WalletError> {
        self.profile(user_id)?;
        Ok(self
            .store
            .transactions()
            .into_iter()
            .filter(|tx| tx.involves(user_id))
            .collect())
    }

    /// Overwrites a balance outside the wallet rules, e.g. after a dispute.
    pub fn set_balance(&self, user_id: UserId, balance: Decimal) -> Result<(), WalletError> {
        warn!(user = %user_id, %balance, "administrative balance override");
        self.store.set_balance(user_id, balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn register(engine: &Engine, name: &str) -> User {
        engine
            .register_user(
                NewUser::new(name, format!("{}@example.com", name.to_lowercase()), "hash")
                    .unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn profile_of_unknown_user_fails() {
        let engine = Engine::new();
        let ghost = UserId::new();
        assert_eq!(engine.profile(ghost), Err(WalletError::UserNotFound(ghost)));
    }

    #[test]
    fn listing_excludes_the_caller() {
        let engine = Engine::new();
        let me = register(&engine, "Me");
        for name in ["Ann", "Bob", "Cid"] {
            register(&engine, name);
        }

        let page = engine.list_users(me.id, PageRequest::default()).unwrap();
        assert_eq!(page.pagination.total, 3);
        assert!(page.items.iter().all(|summary| summary.id != me.id));
    }

    #[test]
    fn listing_pages_through_users() {
        let engine = Engine::new();
        let me = register(&engine, "Me");
        for i in 0..5 {
            register(&engine, &format!("Peer{i}"));
        }

        let first = engine
            .list_users(me.id, PageRequest { page: 1, limit: 2 })
            .unwrap();
        let third = engine
            .list_users(me.id, PageRequest { page: 3, limit: 2 })
            .unwrap();

        assert_eq!(first.items.len(), 2);
        assert!(first.pagination.has_next_page);
        assert!(!first.pagination.has_previous_page);
        assert_eq!(third.items.len(), 1);
        assert_eq!(third.pagination.total_pages, 3);
        assert!(!third.pagination.has_next_page);
    }

    #[test]
    fn listing_rejects_oversized_pages() {
        let engine = Engine::new();
        let result = engine.list_users(UserId::new(), PageRequest { page: 1, limit: 500 });
        assert!(matches!(result, Err(WalletError::InvalidUser(_))));
    }

    #[test]
    fn history_contains_only_own_transactions() {
        let engine = Engine::new();
        let (a, b, c) = (
            register(&engine, "Ann"),
            register(&engine, "Bob"),
            register(&engine, "Cid"),
        );

        let deposit = engine.deposit(a.id, dec!(100)).unwrap();
        let transfer = engine.transfer(a.id, b.id, dec!(30)).unwrap();
        engine.deposit(c.id, dec!(5)).unwrap();

        let ids: Vec<_> = engine
            .history(a.id)
            .unwrap()
            .iter()
            .map(Transaction::id)
            .collect();
        assert_eq!(ids, vec![deposit.id(), transfer.id()]);
        assert_eq!(engine.history(b.id).unwrap().len(), 1);
    }

    #[test]
    fn set_balance_overrides_and_blocks_deposits() {
        let engine = Engine::new();
        let user = register(&engine, "Ann");

        engine.set_balance(user.id, dec!(-10)).unwrap();
        assert_eq!(engine.profile(user.id).unwrap().balance, dec!(-10));
        assert_eq!(
            engine.deposit(user.id, dec!(50)),
            Err(WalletError::DepositBlocked(user.id))
        );
    }
}
