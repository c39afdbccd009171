// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Database abstraction to manipulate users and operation logs.

use crate::model::{Extend, ListOptions};
#[cfg(feature = "postgres")]
use iii_iv_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use iii_iv_core::db::sqlite;
use iii_iv_core::db::{DbError, DbResult, Executor, Placeholder};

pub(crate) mod filter;
mod operation_logs;
pub(crate) use operation_logs::{create_operation_log, delete_operation_log, list_operation_logs};
mod users;
pub(crate) use users::{create_user, delete_user, delete_users, get_user, list_users, update_user};

#[cfg(test)]
mod tests;

/// Initializes the database schema.
///
/// The operation logs table is only created if `with_operation_logs` is true.
pub async fn init_schema(ex: &mut Executor, with_operation_logs: bool) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            postgres::run_schema(ex, include_str!("postgres.sql")).await?;
            if with_operation_logs {
                postgres::run_schema(ex, include_str!("postgres_operation_logs.sql")).await?;
            }
            Ok(())
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            sqlite::run_schema(ex, include_str!("sqlite.sql")).await?;
            if with_operation_logs {
                sqlite::run_schema(ex, include_str!("sqlite_operation_logs.sql")).await?;
            }
            Ok(())
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Serializes the free-form properties of an object for storage.
fn extend_to_shadow(extend: &Extend) -> DbResult<String> {
    if extend.is_empty() {
        return Ok(String::new());
    }
    serde_json::to_string(extend)
        .map_err(|e| DbError::DataIntegrityError(format!("Cannot serialize extend: {}", e)))
}

/// Deserializes the free-form properties of an object from storage.
fn extend_from_shadow(shadow: &str) -> DbResult<Extend> {
    if shadow.is_empty() {
        return Ok(Extend::default());
    }
    serde_json::from_str(shadow)
        .map_err(|e| DbError::DataIntegrityError(format!("Invalid extend '{}': {}", shadow, e)))
}

/// Converts the paging parameters in `opts` into the `(offset, limit)` pair used in queries.
fn page_bounds(opts: &ListOptions) -> DbResult<(i64, i64)> {
    let offset = i64::try_from(opts.offset)
        .map_err(|_| DbError::BackendError(format!("Offset {} is too large", opts.offset)))?;
    let limit = i64::try_from(opts.limit)
        .map_err(|_| DbError::BackendError(format!("Limit {} is too large", opts.limit)))?;
    Ok((offset, limit))
}

/// Generates a comma-separated list of `count` placeholders starting at the 1-based `first`.
fn list_placeholders(placeholder: Placeholder, first: usize, count: usize) -> String {
    (first..first + count).map(|i| placeholder.at(i)).collect::<Vec<String>>().join(", ")
}
