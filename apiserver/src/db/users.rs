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

//! Persistence of users.

use crate::db::filter::{USER_FIELDS, build_filter};
use crate::db::{extend_from_shadow, extend_to_shadow, list_placeholders, page_bounds};
use crate::model::{HashedPassword, List, ListOptions, User, UserList};
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

#[cfg(feature = "postgres")]
impl TryFrom<PgRow> for User {
    type Error = DbError;

    fn try_from(row: PgRow) -> DbResult<Self> {
        let id: i64 = row.try_get("id").map_err(postgres::map_sqlx_error)?;
        let instance_id: String = row.try_get("instance_id").map_err(postgres::map_sqlx_error)?;
        let name: String = row.try_get("name").map_err(postgres::map_sqlx_error)?;
        let extend_shadow: String =
            row.try_get("extend_shadow").map_err(postgres::map_sqlx_error)?;
        let nickname: String = row.try_get("nickname").map_err(postgres::map_sqlx_error)?;
        let password: String = row.try_get("password").map_err(postgres::map_sqlx_error)?;
        let email: String = row.try_get("email").map_err(postgres::map_sqlx_error)?;
        let phone: String = row.try_get("phone").map_err(postgres::map_sqlx_error)?;
        let is_admin: i32 = row.try_get("is_admin").map_err(postgres::map_sqlx_error)?;
        let created_at: OffsetDateTime =
            row.try_get("created_at").map_err(postgres::map_sqlx_error)?;
        let updated_at: OffsetDateTime =
            row.try_get("updated_at").map_err(postgres::map_sqlx_error)?;

        Ok(User::new(name, nickname, HashedPassword::new(password), email, created_at)
            .with_id(id)
            .with_instance_id(instance_id)
            .with_extend(extend_from_shadow(&extend_shadow)?)
            .with_phone(phone)
            .with_is_admin(is_admin)
            .with_updated_at(updated_at))
    }
}

#[cfg(any(feature = "sqlite", test))]
impl TryFrom<SqliteRow> for User {
    type Error = DbError;

    fn try_from(row: SqliteRow) -> DbResult<Self> {
        let id: i64 = row.try_get("id").map_err(sqlite::map_sqlx_error)?;
        let instance_id: String = row.try_get("instance_id").map_err(sqlite::map_sqlx_error)?;
        let name: String = row.try_get("name").map_err(sqlite::map_sqlx_error)?;
        let extend_shadow: String = row.try_get("extend_shadow").map_err(sqlite::map_sqlx_error)?;
        let nickname: String = row.try_get("nickname").map_err(sqlite::map_sqlx_error)?;
        let password: String = row.try_get("password").map_err(sqlite::map_sqlx_error)?;
        let email: String = row.try_get("email").map_err(sqlite::map_sqlx_error)?;
        let phone: String = row.try_get("phone").map_err(sqlite::map_sqlx_error)?;
        let is_admin: i32 = row.try_get("is_admin").map_err(sqlite::map_sqlx_error)?;
        let created_at_secs: i64 = row.try_get("created_at_secs").map_err(sqlite::map_sqlx_error)?;
        let created_at_nsecs: i64 =
            row.try_get("created_at_nsecs").map_err(sqlite::map_sqlx_error)?;
        let updated_at_secs: i64 = row.try_get("updated_at_secs").map_err(sqlite::map_sqlx_error)?;
        let updated_at_nsecs: i64 =
            row.try_get("updated_at_nsecs").map_err(sqlite::map_sqlx_error)?;

        let created_at = build_timestamp(created_at_secs, created_at_nsecs)?;
        let updated_at = build_timestamp(updated_at_secs, updated_at_nsecs)?;

        Ok(User::new(name, nickname, HashedPassword::new(password), email, created_at)
            .with_id(id)
            .with_instance_id(instance_id)
            .with_extend(extend_from_shadow(&extend_shadow)?)
            .with_phone(phone)
            .with_is_admin(is_admin)
            .with_updated_at(updated_at))
    }
}

/// Creates a new `user` and returns it with the identifiers assigned by the database.
///
/// Fails with `AlreadyExists` if a user with the same name exists.
pub(crate) async fn create_user(ex: &mut Executor, user: User) -> DbResult<User> {
    let extend_shadow = extend_to_shadow(user.metadata().extend())?;

    let (user, rows_affected) = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                INSERT INTO users
                    (name, extend_shadow, nickname, password, email, phone, is_admin,
                    created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING id";
            let row = sqlx::query(query_str)
                .bind(user.metadata().name().as_str())
                .bind(extend_shadow.as_str())
                .bind(user.nickname().as_str())
                .bind(user.password().as_str())
                .bind(user.email().as_str())
                .bind(user.phone().as_str())
                .bind(*user.is_admin())
                .bind(*user.metadata().created_at())
                .bind(*user.metadata().updated_at())
                .fetch_one(&mut *ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
            let id: i64 = row.try_get("id").map_err(postgres::map_sqlx_error)?;
            let user = user.with_id(id);

            let query_str = "UPDATE users SET instance_id = $1 WHERE id = $2";
            let done = sqlx::query(query_str)
                .bind(user.metadata().instance_id().as_str())
                .bind(id)
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
            (user, done.rows_affected())
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (created_at_secs, created_at_nsecs) =
                unpack_timestamp(*user.metadata().created_at())?;
            let (updated_at_secs, updated_at_nsecs) =
                unpack_timestamp(*user.metadata().updated_at())?;

            let query_str = "
                INSERT INTO users
                    (name, extend_shadow, nickname, password, email, phone, is_admin,
                    created_at_secs, created_at_nsecs, updated_at_secs, updated_at_nsecs)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id";
            let row = sqlx::query(query_str)
                .bind(user.metadata().name().as_str())
                .bind(extend_shadow.as_str())
                .bind(user.nickname().as_str())
                .bind(user.password().as_str())
                .bind(user.email().as_str())
                .bind(user.phone().as_str())
                .bind(*user.is_admin())
                .bind(created_at_secs)
                .bind(created_at_nsecs)
                .bind(updated_at_secs)
                .bind(updated_at_nsecs)
                .fetch_one(&mut *ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
            let id: i64 = row.try_get("id").map_err(sqlite::map_sqlx_error)?;
            let user = user.with_id(id);

            let query_str = "UPDATE users SET instance_id = ? WHERE id = ?";
            let done = sqlx::query(query_str)
                .bind(user.metadata().instance_id().as_str())
                .bind(id)
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
            (user, done.rows_affected())
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    if rows_affected != 1 {
        return Err(DbError::BackendError(format!(
            "Instance ID update affected {} rows instead of 1",
            rows_affected
        )));
    }
    Ok(user)
}

/// Gets the user called `name`.
pub(crate) async fn get_user(ex: &mut Executor, name: &str) -> DbResult<User> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "SELECT * FROM users WHERE name = $1";
            match sqlx::query(query_str)
                .bind(name)
                .fetch_optional(ex)
                .await
                .map_err(postgres::map_sqlx_error)?
            {
                Some(row) => User::try_from(row),
                None => Err(DbError::NotFound),
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "SELECT * FROM users WHERE name = ?";
            match sqlx::query(query_str)
                .bind(name)
                .fetch_optional(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?
            {
                Some(row) => User::try_from(row),
                None => Err(DbError::NotFound),
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Saves the profile fields of an existing `user`, identified by its name.
///
/// The password, the identifiers and the creation time of the user are never modified.
pub(crate) async fn update_user(ex: &mut Executor, user: &User) -> DbResult<()> {
    let extend_shadow = extend_to_shadow(user.metadata().extend())?;

    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                UPDATE users
                SET nickname = $1, email = $2, phone = $3, extend_shadow = $4, updated_at = $5
                WHERE name = $6";
            let done = sqlx::query(query_str)
                .bind(user.nickname().as_str())
                .bind(user.email().as_str())
                .bind(user.phone().as_str())
                .bind(extend_shadow.as_str())
                .bind(*user.metadata().updated_at())
                .bind(user.metadata().name().as_str())
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (updated_at_secs, updated_at_nsecs) =
                unpack_timestamp(*user.metadata().updated_at())?;

            let query_str = "
                UPDATE users
                SET nickname = ?, email = ?, phone = ?, extend_shadow = ?,
                    updated_at_secs = ?, updated_at_nsecs = ?
                WHERE name = ?";
            let done = sqlx::query(query_str)
                .bind(user.nickname().as_str())
                .bind(user.email().as_str())
                .bind(user.phone().as_str())
                .bind(extend_shadow.as_str())
                .bind(updated_at_secs)
                .bind(updated_at_nsecs)
                .bind(user.metadata().name().as_str())
                .execute(ex)
                .await
                .map_err(sqlite::map_sqlx_error)?;
            done.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    match rows_affected {
        0 => Err(DbError::NotFound),
        1 => Ok(()),
        n => Err(DbError::BackendError(format!("Update affected {} rows instead of 1", n))),
    }
}

/// Deletes the user called `name`.  Deleting a user that does not exist is not an error.
pub(crate) async fn delete_user(ex: &mut Executor, name: &str) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "DELETE FROM users WHERE name = $1";
            sqlx::query(query_str)
                .bind(name)
                .execute(ex)
                .await
                .map_err(postgres::map_sqlx_error)?;
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "DELETE FROM users WHERE name = ?";
            sqlx::query(query_str).bind(name).execute(ex).await.map_err(sqlite::map_sqlx_error)?;
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(())
}

/// Deletes all users whose name is in `names` and returns how many were deleted.
pub(crate) async fn delete_users(ex: &mut Executor, names: &[String]) -> DbResult<u64> {
    if names.is_empty() {
        return Ok(0);
    }

    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = format!(
                "DELETE FROM users WHERE name IN ({})",
                list_placeholders(Placeholder::Numbered, 1, names.len())
            );
            let mut query = sqlx::query(&query_str);
            for name in names {
                query = query.bind(name.as_str());
            }
            query.execute(ex).await.map_err(postgres::map_sqlx_error)?.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = format!(
                "DELETE FROM users WHERE name IN ({})",
                list_placeholders(Placeholder::Anonymous, 1, names.len())
            );
            let mut query = sqlx::query(&query_str);
            for name in names {
                query = query.bind(name.as_str());
            }
            query.execute(ex).await.map_err(sqlite::map_sqlx_error)?.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };
    Ok(rows_affected)
}

/// Gets the page of users described by `opts`, newest first.
pub(crate) async fn list_users(ex: &mut Executor, opts: &ListOptions) -> DbResult<UserList> {
    let (offset, limit) = page_bounds(opts)?;

    let (items, total_count) = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let filter = build_filter(&opts.selector, USER_FIELDS, Placeholder::Numbered);
            let n = filter.values.len();

            let query_str = format!(
                "SELECT * FROM users WHERE {} ORDER BY id DESC LIMIT ${} OFFSET ${}",
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
            let items = rows.into_iter().map(User::try_from).collect::<DbResult<Vec<User>>>()?;

            let query_str = format!("SELECT COUNT(*) AS count FROM users WHERE {}", filter.clause);
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
            let filter = build_filter(&opts.selector, USER_FIELDS, Placeholder::Anonymous);

            let query_str =
                format!("SELECT * FROM users WHERE {} ORDER BY id DESC LIMIT ? OFFSET ?", filter.clause);
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
            let items = rows.into_iter().map(User::try_from).collect::<DbResult<Vec<User>>>()?;

            let query_str = format!("SELECT COUNT(*) AS count FROM users WHERE {}", filter.clause);
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
        .map_err(|e| DbError::DataIntegrityError(format!("Invalid user count: {}", e)))?;
    Ok(List::new(total_count, items))
}
