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

//! API to get the details of a user.

use crate::driver::Driver;
use crate::model::User;
use axum::Json;
use axum::extract::State;
use iii_iv_core::rest::{EmptyBody, Envelope, PathParams, RestResult, ok};

/// GET handler for this API.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    PathParams(name): PathParams<String>,
    _: EmptyBody,
) -> RestResult<Json<Envelope<User>>> {
    let user = driver.get_user(name).await?;
    Ok(ok(user))
}

#[cfg(test)]
mod tests {
    use crate::rest::testutils::*;
    use axum::http;
    use iii_iv_core::rest::ErrorCode;
    use iii_iv_core::rest::testutils::OneShotBuilder;
    use iii_iv_core::test_payload_must_be_empty;

    fn route(name: &str) -> (http::Method, String) {
        (http::Method::GET, format!("/v1/users/{}", name))
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;

        context.create_user("admin").await;
        let user = context.create_user("colin").await;

        let data = OneShotBuilder::new(context.app(), route("colin"))
            .send_empty()
            .await
            .expect_data::<serde_json::Value>()
            .await;
        assert_eq!(serde_json::to_value(&user).unwrap(), data);
        assert!(data.get("password").is_none());
        assert_eq!(format!("user-{}", user.metadata().id()), data["metadata"]["instanceID"]);
    }

    #[tokio::test]
    async fn test_not_found() {
        let context = TestContext::setup().await;

        context.create_user("colin").await;

        OneShotBuilder::new(context.app(), route("admin"))
            .send_empty()
            .await
            .expect_code(ErrorCode::NOT_FOUND)
            .expect_error("User admin not found")
            .await;
    }

    #[tokio::test]
    async fn test_is_not_recorded() {
        let context = TestContext::setup().await;

        context.create_user("colin").await;
        OneShotBuilder::new(context.app(), route("colin"))
            .send_empty()
            .await
            .expect_data::<serde_json::Value>()
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(0, *context.operation_logs().await.total_count());
    }

    test_payload_must_be_empty!(TestContext::setup().await.into_app(), route("irrelevant"));
}
