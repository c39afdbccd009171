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

//! Common tests for any database implementation.

use crate::db::*;
use crate::model::{
    Extend, HashedPassword, ListOptions, OperationLogList, OperationRecord, User, UserRequest,
};
use iii_iv_core::clocks::testutils::utc_datetime;
use iii_iv_core::db::{Db, DbError};
use iii_iv_core::model::Selector;
use std::sync::Arc;

/// Initializes the schema of `db` with all tables.
async fn init(db: &Arc<dyn Db + Send + Sync>) {
    init_schema(&mut db.ex().await.unwrap(), true).await.unwrap();
}

/// Syntactic sugar to build a user with default settings given only its name.
fn simple_user(name: &str, second: u8) -> User {
    User::new(
        name,
        format!("Nick {}", name),
        HashedPassword::new(format!("hash-{}", name)),
        format!("{}@example.com", name),
        utc_datetime(2023, 5, 1, 10, 0, second),
    )
}

/// Syntactic sugar to build an operation record for a request to `path` with `method`.
fn simple_record(method: &str, path: &str, http_status: u16) -> OperationRecord {
    OperationRecord {
        username: String::new(),
        user_agent: "test-agent".to_owned(),
        client_ip: "127.0.0.1".to_owned(),
        req_method: method.to_owned(),
        req_path: path.to_owned(),
        req_body: "{}".to_owned(),
        req_referer: String::new(),
        req_time: utc_datetime(2023, 5, 1, 11, 0, 0),
        req_latency: 0.25,
        http_status,
        res_data: "{\"code\":0}".to_owned(),
    }
}

/// Returns the names of the users in a page, in order.
fn names(users: &[User]) -> Vec<&str> {
    users.iter().map(|u| u.metadata().name().as_str()).collect()
}

/// Syntactic sugar to build list options with a selector.
fn list_opts(selector: &str, offset: u64, limit: u64) -> ListOptions {
    ListOptions { selector: Selector::parse(selector).unwrap(), offset, limit }
}

pub(crate) async fn test_users_create_and_get(db: Arc<dyn Db + Send + Sync>) {
    init(&db).await;
    let mut ex = db.ex().await.unwrap();

    let mut extend = Extend::new();
    extend.insert("team".to_owned(), serde_json::Value::from("core"));
    let user = simple_user("colin", 0).with_phone("555").with_is_admin(1).with_extend(extend);
    let user1 = create_user(&mut ex, user.clone()).await.unwrap();
    let user2 = create_user(&mut ex, simple_user("other", 1)).await.unwrap();

    assert!(*user1.metadata().id() > 0);
    assert!(user2.metadata().id() > user1.metadata().id());
    assert_eq!(user.clone().with_id(*user1.metadata().id()), user1);

    assert_eq!(user1, get_user(&mut ex, "colin").await.unwrap());
    assert_eq!(user2, get_user(&mut ex, "other").await.unwrap());
    db.close().await;
}

pub(crate) async fn test_users_create_duplicate(db: Arc<dyn Db + Send + Sync>) {
    init(&db).await;
    let mut ex = db.ex().await.unwrap();

    create_user(&mut ex, simple_user("colin", 0)).await.unwrap();
    assert_eq!(
        DbError::AlreadyExists,
        create_user(&mut ex, simple_user("colin", 1)).await.unwrap_err()
    );
    db.close().await;
}

pub(crate) async fn test_users_get_not_found(db: Arc<dyn Db + Send + Sync>) {
    init(&db).await;
    let mut ex = db.ex().await.unwrap();

    assert_eq!(DbError::NotFound, get_user(&mut ex, "nobody").await.unwrap_err());
    db.close().await;
}

pub(crate) async fn test_users_abort_creation(db: Arc<dyn Db + Send + Sync>) {
    init(&db).await;

    {
        let mut tx = db.begin().await.unwrap();
        create_user(tx.ex(), simple_user("colin", 0)).await.unwrap();
    }

    let mut ex = db.ex().await.unwrap();
    assert_eq!(DbError::NotFound, get_user(&mut ex, "colin").await.unwrap_err());
    db.close().await;
}

pub(crate) async fn test_users_update_ok(db: Arc<dyn Db + Send + Sync>) {
    init(&db).await;
    let mut ex = db.ex().await.unwrap();

    let user = create_user(&mut ex, simple_user("colin", 0)).await.unwrap();

    let request = UserRequest {
        nickname: "New nick".to_owned(),
        email: "new@example.com".to_owned(),
        phone: "123".to_owned(),
        ..Default::default()
    };
    let updated = user.clone().apply_update(request, utc_datetime(2023, 6, 1, 0, 0, 0));
    update_user(&mut ex, &updated).await.unwrap();

    let stored = get_user(&mut ex, "colin").await.unwrap();
    assert_eq!(updated, stored);
    assert_eq!(user.password(), stored.password());
    assert_eq!(user.metadata().created_at(), stored.metadata().created_at());
    assert_eq!(&utc_datetime(2023, 6, 1, 0, 0, 0), stored.metadata().updated_at());
    db.close().await;
}

pub(crate) async fn test_users_update_not_found(db: Arc<dyn Db + Send + Sync>) {
    init(&db).await;
    let mut ex = db.ex().await.unwrap();

    assert_eq!(DbError::NotFound, update_user(&mut ex, &simple_user("ghost", 0)).await.unwrap_err());
    db.close().await;
}

pub(crate) async fn test_users_delete(db: Arc<dyn Db + Send + Sync>) {
    init(&db).await;
    let mut ex = db.ex().await.unwrap();

    create_user(&mut ex, simple_user("a", 0)).await.unwrap();
    create_user(&mut ex, simple_user("b", 1)).await.unwrap();

    delete_user(&mut ex, "a").await.unwrap();
    delete_user(&mut ex, "a").await.unwrap();
    delete_user(&mut ex, "never-existed").await.unwrap();

    assert_eq!(DbError::NotFound, get_user(&mut ex, "a").await.unwrap_err());
    get_user(&mut ex, "b").await.unwrap();
    db.close().await;
}

pub(crate) async fn test_users_delete_collection(db: Arc<dyn Db + Send + Sync>) {
    init(&db).await;
    let mut ex = db.ex().await.unwrap();

    for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
        create_user(&mut ex, simple_user(name, i as u8)).await.unwrap();
    }

    assert_eq!(0, delete_users(&mut ex, &[]).await.unwrap());
    let deleted =
        delete_users(&mut ex, &["a".to_owned(), "c".to_owned(), "zzz".to_owned()]).await.unwrap();
    assert_eq!(2, deleted);

    let list = list_users(&mut ex, &ListOptions::default()).await.unwrap();
    assert_eq!(vec!["d", "b"], names(list.items()));
    db.close().await;
}

pub(crate) async fn test_users_list_paging(db: Arc<dyn Db + Send + Sync>) {
    init(&db).await;
    let mut ex = db.ex().await.unwrap();

    let list = list_users(&mut ex, &ListOptions::default()).await.unwrap();
    assert_eq!(0, *list.total_count());
    assert!(list.items().is_empty());

    for (i, name) in ["u1", "u2", "u3", "u4", "u5"].iter().enumerate() {
        create_user(&mut ex, simple_user(name, i as u8)).await.unwrap();
    }

    let list = list_users(&mut ex, &ListOptions::default()).await.unwrap();
    assert_eq!(5, *list.total_count());
    assert_eq!(vec!["u5", "u4", "u3", "u2", "u1"], names(list.items()));

    let list = list_users(&mut ex, &list_opts("", 1, 2)).await.unwrap();
    assert_eq!(5, *list.total_count());
    assert_eq!(vec!["u4", "u3"], names(list.items()));

    let list = list_users(&mut ex, &list_opts("", 10, 2)).await.unwrap();
    assert_eq!(5, *list.total_count());
    assert!(list.items().is_empty());
    db.close().await;
}

pub(crate) async fn test_users_list_selector(db: Arc<dyn Db + Send + Sync>) {
    init(&db).await;
    let mut ex = db.ex().await.unwrap();

    create_user(&mut ex, simple_user("admin", 0)).await.unwrap();
    create_user(&mut ex, simple_user("admin2", 1)).await.unwrap();
    create_user(&mut ex, simple_user("colin", 2)).await.unwrap();
    create_user(&mut ex, simple_user("under_score", 3)).await.unwrap();

    let list = list_users(&mut ex, &list_opts("name==admin", 0, 10)).await.unwrap();
    assert_eq!(1, *list.total_count());
    assert_eq!(vec!["admin"], names(list.items()));

    let list = list_users(&mut ex, &list_opts("name=admin", 0, 10)).await.unwrap();
    assert_eq!(2, *list.total_count());
    assert_eq!(vec!["admin2", "admin"], names(list.items()));

    let list = list_users(&mut ex, &list_opts("name=admin,name!=admin2", 0, 10)).await.unwrap();
    assert_eq!(vec!["admin"], names(list.items()));

    let list = list_users(&mut ex, &list_opts("email=example.com", 0, 1)).await.unwrap();
    assert_eq!(4, *list.total_count());
    assert_eq!(vec!["under_score"], names(list.items()));

    let list = list_users(&mut ex, &list_opts("name=dmin_", 0, 10)).await.unwrap();
    assert_eq!(0, *list.total_count());

    let list = list_users(&mut ex, &list_opts("name=r_s,nickname==foo", 0, 10)).await.unwrap();
    assert_eq!(vec!["under_score"], names(list.items()));

    let list = list_users(&mut ex, &list_opts("nickname==foo", 0, 10)).await.unwrap();
    assert_eq!(4, *list.total_count());

    let list = list_users(&mut ex, &list_opts("name='; DROP TABLE users; --", 0, 10)).await;
    assert_eq!(0, *list.unwrap().total_count());
    get_user(&mut ex, "colin").await.unwrap();
    db.close().await;
}

pub(crate) async fn test_operation_logs_crud(db: Arc<dyn Db + Send + Sync>) {
    init(&db).await;
    let mut ex = db.ex().await.unwrap();

    let now = utc_datetime(2023, 5, 1, 11, 0, 1);
    let log1 =
        create_operation_log(&mut ex, simple_record("POST", "/v1/users", 200), now).await.unwrap();
    let log2 = create_operation_log(&mut ex, simple_record("DELETE", "/v1/users/a", 200), now)
        .await
        .unwrap();
    assert!(log2.id() > log1.id());

    let list = list_operation_logs(&mut ex, &ListOptions::default()).await.unwrap();
    assert_eq!(2, *list.total_count());
    assert_eq!(&[log2.clone(), log1.clone()], list.items().as_slice());

    delete_operation_log(&mut ex, *log1.id()).await.unwrap();
    delete_operation_log(&mut ex, *log1.id()).await.unwrap();
    delete_operation_log(&mut ex, 12345).await.unwrap();

    let list = list_operation_logs(&mut ex, &ListOptions::default()).await.unwrap();
    assert_eq!(1, *list.total_count());
    assert_eq!(&[log2], list.items().as_slice());
    db.close().await;
}

pub(crate) async fn test_operation_logs_list_selector(db: Arc<dyn Db + Send + Sync>) {
    init(&db).await;
    let mut ex = db.ex().await.unwrap();

    let now = utc_datetime(2023, 5, 1, 11, 0, 1);
    for (method, path, status) in [
        ("POST", "/v1/users", 200),
        ("PUT", "/v1/users/colin", 404),
        ("DELETE", "/v1/users?name=a", 200),
    ] {
        create_operation_log(&mut ex, simple_record(method, path, status), now).await.unwrap();
    }

    let paths = |list: OperationLogList| {
        list.items().iter().map(|l| l.record().req_path.clone()).collect::<Vec<String>>()
    };

    let list = list_operation_logs(&mut ex, &list_opts("req_method==PUT", 0, 10)).await.unwrap();
    assert_eq!(vec!["/v1/users/colin"], paths(list));

    let list = list_operation_logs(&mut ex, &list_opts("http_status==200", 0, 10)).await.unwrap();
    assert_eq!(vec!["/v1/users?name=a", "/v1/users"], paths(list));

    let list = list_operation_logs(&mut ex, &list_opts("http_status!=200", 0, 10)).await.unwrap();
    assert_eq!(vec!["/v1/users/colin"], paths(list));

    let list =
        list_operation_logs(&mut ex, &list_opts("req_path=users/,username==x", 0, 10)).await.unwrap();
    assert_eq!(vec!["/v1/users/colin"], paths(list));
    db.close().await;
}

macro_rules! generate_db_tests [
    ( $setup:expr $(, #[$extra:meta] )? ) => {
        iii_iv_core::db::testutils::generate_tests!(
            $(#[$extra],)?
            $setup,
            $crate::db::tests,
            test_users_create_and_get,
            test_users_create_duplicate,
            test_users_get_not_found,
            test_users_abort_creation,
            test_users_update_ok,
            test_users_update_not_found,
            test_users_delete,
            test_users_delete_collection,
            test_users_list_paging,
            test_users_list_selector,
            test_operation_logs_crud,
            test_operation_logs_list_selector
        );
    }
];

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use iii_iv_core::db::postgres::testutils::setup;

    generate_db_tests!(
        Arc::new(setup().await),
        #[ignore = "Requires environment configuration and is expensive"]
    );
}

mod sqlite {
    use super::*;
    use iii_iv_core::db::sqlite::testutils::setup;

    generate_db_tests!(Arc::new(setup().await));
}
