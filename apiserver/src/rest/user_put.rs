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

//! API to update the profile of an existing user.

use crate::driver::Driver;
use crate::model::{User, UserRequest};
use axum::Json;
use axum::extract::State;
use iii_iv_core::rest::{Envelope, JsonBody, PathParams, RestResult, ok};

/// PUT handler for this API.
///
/// Only the nickname, email, phone and extend fields of the request are honored.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    PathParams(name): PathParams<String>,
    JsonBody(request): JsonBody<UserRequest>,
) -> RestResult<Json<Envelope<User>>> {
    let user = driver.update_user(name, request).await?;
    Ok(ok(user))
}

#[cfg(test)]
mod tests {
    use crate::model::{Extend, RequestMeta, UserRequest};
    use crate::rest::testutils::*;
    use axum::http;
    use iii_iv_core::rest::ErrorCode;
    use iii_iv_core::rest::testutils::OneShotBuilder;
    use iii_iv_core::test_payload_must_be_json;

    fn route(name: &str) -> (http::Method, String) {
        (http::Method::PUT, format!("/v1/users/{}", name))
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;

        let before = context.create_user("colin").await;

        let mut extend = Extend::new();
        extend.insert("team".to_owned(), serde_json::Value::from("infra"));
        let request = UserRequest {
            metadata: RequestMeta { name: "ignored".to_owned(), extend: extend.clone() },
            nickname: "Colin II".to_owned(),
            email: "colin2@foxmail.com".to_owned(),
            phone: "555".to_owned(),
            is_admin: 1,
            ..Default::default()
        };
        let data = OneShotBuilder::new(context.app(), route("colin"))
            .send_json(request)
            .await
            .expect_data::<serde_json::Value>()
            .await;

        let after = context.get_user("colin").await.unwrap();
        assert_eq!(serde_json::to_value(&after).unwrap(), data);
        assert_eq!("Colin II", after.nickname());
        assert_eq!("colin2@foxmail.com", after.email());
        assert_eq!("555", after.phone());
        assert_eq!(&extend, after.metadata().extend());
        assert_eq!(before.metadata().id(), after.metadata().id());
        assert_eq!(before.metadata().created_at(), after.metadata().created_at());
        assert_eq!(before.password(), after.password());
        assert_eq!(0, *after.is_admin());
        assert!(context.get_user("ignored").await.is_none());
    }

    #[tokio::test]
    async fn test_not_found() {
        let context = TestContext::setup().await;

        let request = UserRequest {
            nickname: "Colin".to_owned(),
            email: "colin@foxmail.com".to_owned(),
            ..Default::default()
        };
        OneShotBuilder::new(context.app(), route("colin"))
            .send_json(request)
            .await
            .expect_code(ErrorCode::NOT_FOUND)
            .expect_error("User colin not found")
            .await;
    }

    #[tokio::test]
    async fn test_invalid() {
        let context = TestContext::setup().await;

        let before = context.create_user("colin").await;

        let request = UserRequest {
            nickname: "x".repeat(31),
            email: "colin@foxmail.com".to_owned(),
            ..Default::default()
        };
        OneShotBuilder::new(context.app(), route("colin"))
            .send_json(request)
            .await
            .expect_code(ErrorCode::VALIDATION)
            .expect_error("nickname: Too long")
            .await;

        assert_eq!(before, context.get_user("colin").await.unwrap());
    }

    test_payload_must_be_json!(TestContext::setup().await.into_app(), route("irrelevant"));
}
