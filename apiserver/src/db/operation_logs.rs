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

//! Persistence of operation logs.

use crate::db::filter::{OPERATION_LOG_FIELDS, build_filter};
use crate::db::page_bounds;
use crate::model::{List, ListOptions, OperationLog, OperationLogList, OperationRecord};
#[cfg(feature = "postgres")]
use iii_iv_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use iii_iv_core::db::sqlite::{self, build_timestamp, unpack_timestamp};
use iii_iv_core::db::{DbError, DbResult, Executor, Placeholder};
use sqlx::Row;
#[cfg(feature = "postgres")]
use sqlx::postgres::PgRow;
#[cfg(any(feature = "sqlite", test))]
use sqlx::sqlite::SqliteRow;
use time::OffsetDateTime;

/// Converts a status code as stored in the database into its HTTP representation.
fn http_status_from_db(http_status: i32) -> DbResult<u16> {
    u16::try_from(http_status)
        .map_err(|_| DbError::DataIntegrityError(format!("Invalid HTTP status {}", http_status)))
}

#[cfg(feature = "postgres")]
impl TryFrom<PgRow> for OperationLog {
    type Error = DbError;

    fn try_from(row: PgRow) -> DbResult<Self> {
        let id: i64 = row.try_get("id").map_err(postgres::map_sqlx_error)?;
        let created_at: OffsetDateTime =
            row.try_get("created_at").map_err(postgres::map_sqlx_error)?;
        let username: String = row.try_get("username").map_err(postgres::map_sqlx_error)?;
        let user_agent: String = row.try_get("user_agent").map_err(postgres::map_sqlx_error)?;
        let client_ip: String = row.try_get("client_ip").map_err(postgres::map_sqlx_error)?;
        let req_method: String = row.try_get("req_method").map_err(postgres::map_sqlx_error)?;
        let req_path: String = row.try_get("req_path").map_err(postgres::map_sqlx_error)?;
        let req_body: String = row.try_get("req_body").map_err(postgres::map_sqlx_error)?;
        let req_referer: String = row.try_get("req_referer").map_err(postgres::map_sqlx_error)?;
        let req_time: OffsetDateTime = row.try_get("req_time").map_err(postgres::map_sqlx_error)?;
        let req_latency: f64 = row.try_get("req_latency").map_err(postgres::map_sqlx_error)?;
        let http_status: i32 = row.try_get("http_status").map_err(postgres::map_sqlx_error)?;
        let res_data: String = row.try_get("res_data").map_err(postgres::map_sqlx_error)?;

        let record = OperationRecord {
            username,
            user_agent,
            client_ip,
            req_method,
            req_path,
            req_body,
            req_referer,
            req_time,
            req_latency,
            http_status: http_status_from_db(http_status)?,
            res_data,
        };
        Ok(OperationLog::new(id, created_at, record))
    }
}

#[cfg(any(feature = "sqlite", test))]
impl TryFrom<SqliteRow> for OperationLog {
    type Error = DbError;

    fn try_from(row: SqliteRow) -> DbResult<Self> {
        let id: i64 = row.try_get("id").map_err(sqlite::map_sqlx_error)?;
        let created_at_secs: i64 = row.try_get("created_at_secs").map_err(sqlite::map_sqlx_error)?;
        let created_at_nsecs: i64 =
            row.try_get("created_at_nsecs").map_err(sqlite::map_sqlx_error)?;
        let username: String = row.try_get("username").map_err(sqlite::map_sqlx_error)?;
        let user_agent: String = row.try_get("user_agent").map_err(sqlite::map_sqlx_error)?;
        let client_ip: String = row.try_get("client_ip").map_err(sqlite::map_sqlx_error)?;
        let req_method: String = row.try_get("req_method").map_err(sqlite::map_sqlx_error)?;
        let req_path: String = row.try_get("req_path").map_err(sqlite::map_sqlx_error)?;
        let req_body: String = row.try_get("req_body").map_err(sqlite::map_sqlx_error)?;
        let req_referer: String = row.try_get("req_referer").map_err(sqlite::map_sqlx_error)?;
        let req_time_secs: i64 = row.try_get("req_time_secs").map_err(sqlite::map_sqlx_error)?;
        let req_time_nsecs: i64 = row.try_get("req_time_nsecs").map_err(sqlite::map_sqlx_error)?;
        let req_latency: f64 = row.try_get("req_latency").map_err(sqlite::map_sqlx_error)?;
        let http_status: i32 = row.try_get("http_status").map_err(sqlite::map_sqlx_error)?;
        let res_data: String = row.try_get("res_data").map_err(sqlite::map_sqlx_error)?;

        let record = OperationRecord {
            username,
            user_agent,
            client_ip,
            req_method,
            req_path,
            req_body,
            req_referer,
            req_time: build_timestamp(req_time_secs, req_time_nsecs)?,
            req_latency,
            http_status: http_status_from_db(http_status)?,
            res_data,
        };
        Ok(OperationLog::new(id, build_timestamp(created_at_secs, created_at_nsecs)?, record))
    }
}

/// Stores a new operation log for `record` created at `now`.
pub(crate) async fn create_operation_log(
    ex: &mut Executor,
    record: OperationRecord,
    now: OffsetDateTime,
) -> DbResult<OperationLog> {
    let id: i64 = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                INSERT INTO operation_logs
                    (created_at, username, user_agent, client_ip, req_method, req_path, req_body,
                    req_referer, req_time, req_latency, http_status, res_data)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                RETURNING id";
            let row = sqlx::query(query_str)
                .bind(now)
                .bind(record.username.as_str())
                .bind(record.user_agent.as_str())
                .bind(record.client_ip.as_str())
                .bind(record.req_method.as_str())
                .bind(record.req_path.as_str())
                .bind(record.req_body.as_str())
                .bind(record.req_referer.as_str())
                .bind(record.req_time)
                .bind(record.req_latency)
                .bind(i32::from(record.http_status))
                .bind(record.res_data.as_str())
                .fetch_one(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
            row.try_get("id").map_err(postgres::map_sqlx_error)?
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (created_at_secs, created_at_nsecs) = unpack_timestamp(now)?;
            let (req_time_secs, req_time_nsecs) = unpack_timestamp(record.req_time)?;

            let query_str = "
                INSERT INTO operation_logs
                    (created_at_secs, created_at_nsecs, username, user_agent, client_ip,
                    req_method, req_path, req_body, req_referer, req_time_secs, req_time_nsecs,
                    req_latency, http_status, res_data)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id";
            let row = sqlx::query(query_str)
                .bind(created_at_secs)
                .bind(created_at_nsecs)
                .bind(record.username.as_str())
                .bind(record.user_agent.as_str())
                .bind(record.client_ip.as_str())
                .bind(record.req_method.as_str())
                .bind(record.req_path.as_str())
                .bind(record.req_body.as_str())
                .bind(record.req_referer.as_str())
                .bind(req_time_secs)
                .bind(req_time_nsecs)
                .bind(record.req_latency)
                .bind(i32::from(record.http_status))
                .bind(record.res_data.as_str())
                .fetch_one(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
            row.try_get("id").map_err(sqlite::map_sqlx_error)?
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    Ok(OperationLog::new(id, now, record))
}

/// Deletes the operation log with `id`.  Deleting an entry that does not exist is not an error.
pub(crate) async fn delete_operation_log(ex: &mut Executor, id: i64) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "DELETE FROM operation_logs WHERE id = $1";
            sqlx::query(query_str).bind(id).execute(ex).await.map_err(postgres::map_sqlx_error)?;
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "DELETE FROM operation_logs WHERE id = ?";
            sqlx::query(query_str).bind(id).execute(ex).await.map_err(sqlite::map_sqlx_error)?;
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(())
}

/// Gets the page of operation logs described by `opts`, newest first.
pub(crate) async fn list_operation_logs(
    ex: &mut Executor,
    opts: &ListOptions,
) -> DbResult<OperationLogList> {
    let (offset, limit) = page_bounds(opts)?;

    let (items, total_count) = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let filter = build_filter(&opts.selector, OPERATION_LOG_FIELDS, Placeholder::Numbered);
            let n = filter.values.len();

            let query_str = format!(
                "SELECT * FROM operation_logs WHERE {} ORDER BY id DESC LIMIT ${} OFFSET ${}",
                filter.clause,
                n + 1,
                n + 2
            );
            let mut query = sqlx::query(&query_str);
            for value in &filter.values {
                query = query.bind(value.as_str());
            }
            let rows = query
                .bind(limit)
                .bind(offset)
                .fetch_all(&mut *ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
            let items = rows
                .into_iter()
                .map(OperationLog::try_from)
                .collect::<DbResult<Vec<OperationLog>>>()?;

            let query_str =
                format!("SELECT COUNT(*) AS count FROM operation_logs WHERE {}", filter.clause);
            let mut query = sqlx::query(&query_str);
            for value in &filter.values {
                query = query.bind(value.as_str());
            }
            let row = query.fetch_one(ex).await.map_err(postgres::map_sqlx_error)?;
            let total_count: i64 = row.try_get("count").map_err(postgres::map_sqlx_error)?;
            (items, total_count)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let filter =
                build_filter(&opts.selector, OPERATION_LOG_FIELDS, Placeholder::Anonymous);

            let query_str = format!(
                "SELECT * FROM operation_logs WHERE {} ORDER BY id DESC LIMIT ? OFFSET ?",
                filter.clause
            );
            let mut query = sqlx::query(&query_str);
            for value in &filter.values {
                query = query.bind(value.as_str());
            }
            let rows = query
                .bind(limit)
                .bind(offset)
                .fetch_all(&mut *ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
            let items = rows
                .into_iter()
                .map(OperationLog::try_from)
                .collect::<DbResult<Vec<OperationLog>>>()?;

            let query_str =
                format!("SELECT COUNT(*) AS count FROM operation_logs WHERE {}", filter.clause);
            let mut query = sqlx::query(&query_str);
            for value in &filter.values {
                query = query.bind(value.as_str());
            }
            let row = query.fetch_one(ex).await.map_err(sqlite::map_sqlx_error)?;
            let total_count: i64 = row.try_get("count").map_err(sqlite::map_sqlx_error)?;
            (items, total_count)
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    let total_count = u64::try_from(total_count)
        .map_err(|e| DbError::DataIntegrityError(format!("Invalid operation log count: {}", e)))?;
    Ok(List::new(total_count, items))
}
