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

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use thiserror::Error;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use wallet_ledger::{
    Config, Engine, MemoryStore, NewUser, Store, TransactionId, UserId, UserStatus, WalletError,
};

/// Wallet Ledger - Replay wallet operations from a CSV file
///
/// Reads operations from a CSV file and outputs final user balances to stdout.
/// Supports registrations, deposits, transfers, and reversals.
#[derive(Parser, Debug)]
#[command(name = "wallet-ledger")]
#[command(about = "A wallet engine that replays operation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: type,user,target,amount,ref
    /// Example: cargo run -- operations.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Path to a TOML configuration file
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot load configuration");
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!(path = %args.input.display(), error = %e, "cannot open input");
            process::exit(1);
        }
    };

    let engine = Engine::with_store(MemoryStore::with_config(config.store), config.engine);
    let replay = match process_operations(BufReader::new(file), engine) {
        Ok(replay) => replay,
        Err(e) => {
            error!(error = %e, "cannot process operations");
            process::exit(1);
        }
    };

    if let Err(e) = write_balances(&replay.engine, std::io::stdout()) {
        error!(error = %e, "cannot write output");
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, user, target, amount, ref`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    op: String,
    user: String,
    /// Email for `register`, payee label for `transfer`.
    #[serde(default)]
    target: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    /// Row number of the operation a `reverse` undoes.
    #[serde(rename = "ref", default, deserialize_with = "csv::invalid_option")]
    reference: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operation {
    Register { user: String, email: String },
    Deposit { user: String, amount: Decimal },
    Transfer { user: String, payee: String, amount: Decimal },
    Reverse { user: String, row: usize },
}

impl CsvRecord {
    /// Returns `None` for unknown operation types or missing required fields.
    fn into_operation(self) -> Option<Operation> {
        let user = self.user;
        match self.op.to_lowercase().as_str() {
            "register" => Some(Operation::Register {
                user,
                email: self.target?,
            }),
            "deposit" => Some(Operation::Deposit {
                user,
                amount: self.amount?,
            }),
            "transfer" => Some(Operation::Transfer {
                user,
                payee: self.target?,
                amount: self.amount?,
            }),
            "reverse" => Some(Operation::Reverse {
                user,
                row: self.reference?,
            }),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
enum ReplayError {
    #[error("unknown user label {0:?}")]
    UnknownUser(String),

    #[error("user label {0:?} is already registered")]
    DuplicateUser(String),

    #[error("row {0} did not produce a transaction")]
    UnknownRow(usize),

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

/// Engine plus the label and row bookkeeping a replay needs.
struct Replay {
    engine: Engine,
    users: HashMap<String, UserId>,
    /// Transaction produced by each successful data row (1-based).
    transactions: HashMap<usize, TransactionId>,
}

impl Replay {
    fn new(engine: Engine) -> Self {
        Self {
            engine,
            users: HashMap::new(),
            transactions: HashMap::new(),
        }
    }

    fn user(&self, label: &str) -> Result<UserId, ReplayError> {
        self.users
            .get(label)
            .copied()
            .ok_or_else(|| ReplayError::UnknownUser(label.to_string()))
    }

    fn apply(&mut self, row: usize, operation: Operation) -> Result<(), ReplayError> {
        let transaction = match operation {
            Operation::Register { user, email } => {
                if self.users.contains_key(&user) {
                    return Err(ReplayError::DuplicateUser(user));
                }
                // Replayed users get an unusable credential.
                let new_user = NewUser::new(user.clone(), email, "!")?;
                let registered = self.engine.register_user(new_user)?;
                self.users.insert(user, registered.id);
                return Ok(());
            }
            Operation::Deposit { user, amount } => {
                self.engine.deposit(self.user(&user)?, amount)?
            }
            Operation::Transfer {
                user,
                payee,
                amount,
            } => self
                .engine
                .transfer(self.user(&user)?, self.user(&payee)?, amount)?,
            Operation::Reverse { user, row: target } => {
                let original = *self
                    .transactions
                    .get(&target)
                    .ok_or(ReplayError::UnknownRow(target))?;
                self.engine.reverse(self.user(&user)?, original)?
            }
        };
        self.transactions.insert(row, transaction.id());
        Ok(())
    }
}

/// Replays operations from a CSV reader.
///
/// Malformed rows and rejected operations are logged and skipped, so one bad
/// row never stops the replay.
///
/// # CSV Format
///
/// Expected columns: `type, user, target, amount, ref`
/// - `type`: Operation (register, deposit, transfer, reverse)
/// - `user`: Label of the acting user
/// - `target`: Email for register, payee label for transfer
/// - `amount`: Decimal amount for deposit and transfer
/// - `ref`: 1-based data row whose transaction a reverse undoes
///
/// # Example
///
/// ```csv
/// type,user,target,amount,ref
/// register,alice,alice@example.com,,
/// register,bob,bob@example.com,,
/// deposit,alice,,100.0,
/// transfer,alice,bob,40.0,
/// reverse,bob,,,4
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
fn process_operations<R: Read>(reader: R, engine: Engine) -> Result<Replay, csv::Error> {
    let mut replay = Replay::new(engine);

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (index, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let row = index + 1;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(row, error = %e, "skipping malformed row");
                continue;
            }
        };

        let Some(operation) = record.into_operation() else {
            warn!(row, "skipping invalid operation");
            continue;
        };

        if let Err(e) = replay.apply(row, operation) {
            warn!(row, error = %e, "skipping rejected operation");
        }
    }

    Ok(replay)
}

#[derive(Debug, Serialize)]
struct BalanceRecord {
    user: UserId,
    name: String,
    email: String,
    balance: Decimal,
    status: UserStatus,
}

const DECIMAL_PRECISION: u32 = 4;

/// Writes every user's balance as CSV, ordered by name.
///
/// # CSV Format
///
/// Columns: `user, name, email, balance, status`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
fn write_balances<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut users = engine.store().users();
    users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    let mut wtr = Writer::from_writer(writer);
    for user in users {
        wtr.serialize(BalanceRecord {
            user: user.id,
            name: user.name,
            email: user.email,
            balance: user.balance.round_dp(DECIMAL_PRECISION),
            status: user.status,
        })?;
    }

    wtr.flush()?;
    Ok(())
}
