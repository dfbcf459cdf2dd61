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

//! User records and the registration/listing payloads around them.
//!
//! # Example
//!
//! ```
//! use wallet_ledger::NewUser;
//!
//! let new_user = NewUser::new("Ada Lovelace", "ada@example.com", "$argon2id$...").unwrap();
//! assert_eq!(new_user.email(), "ada@example.com");
//! ```

use crate::base::UserId;
use crate::error::WalletError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserStatus {
    Active,
}

/// A wallet holder.
///
/// The balance may be negative (after a reversal, or an administrative
/// override) but the engine refuses new deposits and outgoing transfers
/// while it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    /// Opaque credential from the identity provider. Never serialized.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub balance: Decimal,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Materializes a registered user with a zero balance.
    pub fn create(id: UserId, new_user: NewUser, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            balance: Decimal::ZERO,
            status: UserStatus::Active,
            created_at,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            created_at: self.created_at,
        }
    }
}

/// Validated registration payload.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct NewUser {
    #[validate(length(min = 2, max = 50, message = "name must be between 2 and 50 characters"))]
    name: String,
    #[validate(email(message = "invalid email"))]
    email: String,
    #[validate(length(min = 1, message = "missing credential"))]
    password_hash: String,
}

impl NewUser {
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidUser`] if the name is not 2 to 50
    /// characters, the email is malformed, or the credential is empty.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Result<Self, WalletError> {
        let new_user = Self {
            name: name.into().trim().to_string(),
            email: email.into().trim().to_string(),
            password_hash: password_hash.into(),
        };
        new_user.validate()?;
        Ok(new_user)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

/// Public view of another user, as returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Page selector for user listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Validate)]
#[serde(default)]
pub struct PageRequest {
    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: u32,
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: u32,
}

impl PageRequest {
    fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub total_pages: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    #[serde(rename = "users")]
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    /// Slices an already-ordered collection.
    pub fn slice(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let limit = request.limit as usize;
        let total_pages = total.div_ceil(limit);
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(limit)
            .collect();

        Self {
            items,
            pagination: Pagination {
                page: request.page,
                limit: request.limit,
                total,
                total_pages,
                has_next_page: (request.page as usize) < total_pages,
                has_previous_page: request.page > 1,
            },
        }
    }
}
