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

//! Transaction records.
//!
//! Every money movement is appended to the log as a [`Transaction`]. Records
//! are immutable except for one transition:
//! - [`Completed`] → [`Reversed`] (via reverse, exactly once)
//!
//! Reversing never deletes history. It appends a new [`TransactionKind::Reversal`]
//! record pointing back at the original.
//!
//! [`Completed`]: TransactionStatus::Completed
//! [`Reversed`]: TransactionStatus::Reversed

use crate::base::{TransactionId, UserId};
use crate::error::WalletError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, serde::Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Deposit,
    Transfer,
    Reversal,
}

#[derive(Debug, Clone, Copy, serde::Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Completed,
    Reversed,
}

/// Parties of a transaction, shaped by its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Deposit {
        to: UserId,
    },
    Transfer {
        from: UserId,
        to: UserId,
    },
    /// Money flowing back: `from` is the original payee, `to` the original
    /// payer (absent when a deposit is reversed).
    Reversal {
        from: UserId,
        to: Option<UserId>,
        reverses: TransactionId,
    },
}

impl TransactionKind {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Self::Deposit { .. } => TransactionType::Deposit,
            Self::Transfer { .. } => TransactionType::Transfer,
            Self::Reversal { .. } => TransactionType::Reversal,
        }
    }

    pub fn from_user_id(&self) -> Option<UserId> {
        match self {
            Self::Deposit { .. } => None,
            Self::Transfer { from, .. } | Self::Reversal { from, .. } => Some(*from),
        }
    }

    pub fn to_user_id(&self) -> Option<UserId> {
        match self {
            Self::Deposit { to } | Self::Transfer { to, .. } => Some(*to),
            Self::Reversal { to, .. } => *to,
        }
    }
}

/// A validated request to append a record to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewTransaction {
    kind: TransactionKind,
    amount: Decimal,
}

impl NewTransaction {
    fn new(kind: TransactionKind, amount: Decimal) -> Result<Self, WalletError> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::InvalidAmount);
        }
        Ok(Self { kind, amount })
    }

    pub fn deposit(to: UserId, amount: Decimal) -> Result<Self, WalletError> {
        Self::new(TransactionKind::Deposit { to }, amount)
    }

    pub fn transfer(from: UserId, to: UserId, amount: Decimal) -> Result<Self, WalletError> {
        Self::new(TransactionKind::Transfer { from, to }, amount)
    }

    /// Builds the compensating record for `original`, swapping its parties.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::NotReversible`] if `original` is itself a reversal.
    pub fn reversal_of(original: &Transaction) -> Result<Self, WalletError> {
        let kind = match original.kind {
            TransactionKind::Deposit { to } => TransactionKind::Reversal {
                from: to,
                to: None,
                reverses: original.id,
            },
            TransactionKind::Transfer { from, to } => TransactionKind::Reversal {
                from: to,
                to: Some(from),
                reverses: original.id,
            },
            TransactionKind::Reversal { .. } => {
                return Err(WalletError::NotReversible(original.id));
            }
        };
        Self::new(kind, original.amount)
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

/// A record in the transaction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: TransactionId,
    kind: TransactionKind,
    amount: Decimal,
    status: TransactionStatus,
    created_at: DateTime<Utc>,
    reversed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Materializes a new record. Called by stores when appending to the log.
    pub fn create(id: TransactionId, new: NewTransaction, created_at: DateTime<Utc>) -> Self {
        let transaction = Self {
            id,
            kind: new.kind,
            amount: new.amount,
            status: TransactionStatus::Completed,
            created_at,
            reversed_at: None,
        };
        transaction.assert_invariants();
        transaction
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.amount > Decimal::ZERO,
            "Invariant violated: non-positive transaction amount: {}",
            self.amount
        );
        debug_assert_eq!(
            self.status == TransactionStatus::Reversed,
            self.reversed_at.is_some(),
            "Invariant violated: reversed_at must be set exactly when reversed"
        );
    }

    /// Applies a status transition.
    ///
    /// The only legal transition is `Completed` → `Reversed`; setting the
    /// current status again is accepted only for `Completed`.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::AlreadyReversed`] if the record is already reversed.
    pub fn transition(
        &mut self,
        status: TransactionStatus,
        reversed_at: Option<DateTime<Utc>>,
    ) -> Result<(), WalletError> {
        if self.status == TransactionStatus::Reversed {
            return Err(WalletError::AlreadyReversed(self.id));
        }
        if status == TransactionStatus::Reversed {
            self.status = TransactionStatus::Reversed;
            self.reversed_at = Some(reversed_at.unwrap_or_else(Utc::now));
        }
        self.assert_invariants();
        Ok(())
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.kind.transaction_type()
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn reversed_at(&self) -> Option<DateTime<Utc>> {
        self.reversed_at
    }

    pub fn from_user_id(&self) -> Option<UserId> {
        self.kind.from_user_id()
    }

    pub fn to_user_id(&self) -> Option<UserId> {
        self.kind.to_user_id()
    }

    /// Id of the original transaction, set only on reversal records.
    pub fn reversal_reference_id(&self) -> Option<TransactionId> {
        match self.kind {
            TransactionKind::Reversal { reverses, .. } => Some(reverses),
            _ => None,
        }
    }

    /// Returns `true` if `user` is the payer or the payee.
    pub fn involves(&self, user: UserId) -> bool {
        self.from_user_id() == Some(user) || self.to_user_id() == Some(user)
    }
}

impl Serialize for Transaction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Transaction", 9)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("type", &self.transaction_type())?;
        state.serialize_field("amount", &self.amount)?;
        state.serialize_field("fromUserId", &self.from_user_id())?;
        state.serialize_field("toUserId", &self.to_user_id())?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field("createdAt", &self.created_at)?;
        state.serialize_field("reversedAt", &self.reversed_at)?;
        state.serialize_field("reversalReferenceId", &self.reversal_reference_id())?;
        state.end()
    }
}
