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

//! API to list users.

use crate::driver::Driver;
use crate::model::UserList;
use crate::rest::ListQuery;
use axum::Json;
use axum::extract::State;
use iii_iv_core::rest::{EmptyBody, Envelope, QueryParams, RestResult, ok};

/// GET handler for this API.
///
/// The `field_selector` query parameter can filter users by `name` and `email`.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    QueryParams(query): QueryParams<ListQuery>,
    _: EmptyBody,
) -> RestResult<Json<Envelope<UserList>>> {
    let opts = query.into_options()?;
    let users = driver.list_users(opts).await?;
    Ok(ok(users))
}

#[cfg(test)]
mod tests {
    use crate::rest::testutils::*;
    use axum::http;
    use iii_iv_core::rest::ErrorCode;
    use iii_iv_core::rest::testutils::OneShotBuilder;
    use iii_iv_core::test_payload_must_be_empty;

    fn route() -> (http::Method, String) {
        (http::Method::GET, "/v1/users".to_owned())
    }

    /// Queries the list API with `query` and returns the names of the users and the total count.
    async fn list_names(context: &TestContext, query: &[(&str, &str)]) -> (Vec<String>, u64) {
        let data = OneShotBuilder::new(context.app(), route())
            .with_query(query)
            .send_empty()
            .await
            .expect_data::<serde_json::Value>()
            .await;
        let names = data["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["metadata"]["name"].as_str().unwrap().to_owned())
            .collect();
        (names, data["totalCount"].as_u64().unwrap())
    }

    #[tokio::test]
    async fn test_empty() {
        let context = TestContext::setup().await;

        assert_eq!((vec![], 0), list_names(&context, &[]).await);
    }

    #[tokio::test]
    async fn test_all_newest_first() {
        let context = TestContext::setup().await;

        for name in ["a", "b", "c"] {
            context.create_user(name).await;
        }

        let exp = vec!["c".to_owned(), "b".to_owned(), "a".to_owned()];
        assert_eq!((exp, 3), list_names(&context, &[]).await);
    }

    #[tokio::test]
    async fn test_paging() {
        let context = TestContext::setup().await;

        for name in ["a", "b", "c", "d"] {
            context.create_user(name).await;
        }

        let exp = vec!["c".to_owned(), "b".to_owned()];
        assert_eq!((exp, 4), list_names(&context, &[("offset", "1"), ("limit", "2")]).await);
    }

    #[tokio::test]
    async fn test_field_selector() {
        let context = TestContext::setup().await;

        for name in ["admin", "admin2", "colin"] {
            context.create_user(name).await;
        }

        let exp = vec!["admin2".to_owned(), "admin".to_owned()];
        assert_eq!((exp, 2), list_names(&context, &[("field_selector", "name=admin")]).await);

        let exp = vec!["admin".to_owned()];
        assert_eq!((exp, 1), list_names(&context, &[("fieldSelector", "name==admin")]).await);

        let exp = vec!["colin".to_owned(), "admin".to_owned()];
        assert_eq!(
            (exp, 2),
            list_names(&context, &[("field_selector", "name!=admin2,unknown==x")]).await
        );
    }

    #[tokio::test]
    async fn test_bad_field_selector() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route())
            .with_query([("field_selector", "name")])
            .send_empty()
            .await
            .expect_code(ErrorCode::FIELD_SELECTOR)
            .expect_error("Invalid selector 'name'")
            .await;
    }

    #[tokio::test]
    async fn test_bad_paging() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route())
            .with_query([("limit", "-1")])
            .send_empty()
            .await
            .expect_code(ErrorCode::BIND)
            .expect_error("Invalid limit -1")
            .await;

        OneShotBuilder::new(context.app(), route())
            .with_query([("offset", "many")])
            .send_empty()
            .await
            .expect_code(ErrorCode::BIND)
            .expect_error("Invalid offset many")
            .await;
    }

    test_payload_must_be_empty!(TestContext::setup().await.into_app(), route());
}
