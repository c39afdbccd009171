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

//! API to create a new user.

use crate::driver::Driver;
use crate::model::{User, UserRequest};
use axum::Json;
use axum::extract::State;
use iii_iv_core::rest::{Envelope, JsonBody, RestError, RestResult, ok};

/// POST handler for this API.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    JsonBody(request): JsonBody<UserRequest>,
) -> RestResult<Json<Envelope<User>>> {
    request.validate().map_err(RestError::Validation)?;

    let user = driver.create_user(request).await?;
    Ok(ok(user))
}

#[cfg(test)]
mod tests {
    use crate::model::{Extend, Password, RequestMeta, UserRequest};
    use crate::rest::testutils::*;
    use axum::http;
    use iii_iv_core::rest::ErrorCode;
    use iii_iv_core::rest::testutils::OneShotBuilder;
    use iii_iv_core::test_payload_must_be_json;

    fn route() -> (http::Method, String) {
        (http::Method::POST, "/v1/users".to_owned())
    }

    fn request(name: &str) -> UserRequest {
        UserRequest {
            metadata: RequestMeta { name: name.to_owned(), extend: Extend::default() },
            nickname: "Colin".to_owned(),
            password: Password::from("Admin@2021"),
            email: "colin@foxmail.com".to_owned(),
            phone: "1812884xxxx".to_owned(),
            is_admin: 0,
        }
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;

        let response = OneShotBuilder::new(context.app(), route())
            .send_json(request("colin"))
            .await
            .take_body_as_text()
            .await;
        assert!(!response.contains("password"), "Password leaked in {}", response);
        assert!(!response.contains("Admin@2021"), "Password leaked in {}", response);

        let envelope: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(0, envelope["code"]);
        assert_eq!("colin", envelope["data"]["metadata"]["name"]);

        let user = context.get_user("colin").await.unwrap();
        assert_eq!(serde_json::to_value(&user).unwrap(), envelope["data"]);
        assert!(Password::from("Admin@2021").verify(user.password()).unwrap());
    }

    #[tokio::test]
    async fn test_validation_errors_are_aggregated() {
        let context = TestContext::setup().await;

        let request = UserRequest {
            metadata: RequestMeta { name: "-bad".to_owned(), extend: Extend::default() },
            email: "not-an-email".to_owned(),
            ..Default::default()
        };
        OneShotBuilder::new(context.app(), route())
            .send_json(request)
            .await
            .expect_code(ErrorCode::VALIDATION)
            .expect_error("metadata.name: Invalid.*; nickname: Required value; email: Invalid.*; password: Required value")
            .await;

        assert!(context.get_user("-bad").await.is_none());
    }

    #[tokio::test]
    async fn test_weak_password() {
        let context = TestContext::setup().await;

        let request = UserRequest { password: Password::from("weak"), ..request("colin") };
        OneShotBuilder::new(context.app(), route())
            .send_json(request)
            .await
            .expect_code(ErrorCode::VALIDATION)
            .expect_error("^password: must have between 8 and 16 characters$")
            .await;

        assert!(context.get_user("colin").await.is_none());
    }

    #[tokio::test]
    async fn test_already_exists() {
        let context = TestContext::setup().await;

        let existing = context.create_user("colin").await;

        OneShotBuilder::new(context.app(), route())
            .send_json(request("colin"))
            .await
            .expect_code(ErrorCode::ALREADY_EXISTS)
            .expect_error("User colin already exists")
            .await;

        assert_eq!(existing, context.get_user("colin").await.unwrap());
    }

    #[tokio::test]
    async fn test_records_operation_log() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route())
            .with_header("User-Agent", "the-agent")
            .with_header("X-Forwarded-For", "10.1.2.3, 10.0.0.1")
            .send_json(request("colin"))
            .await
            .expect_data::<serde_json::Value>()
            .await;

        let logs = context.wait_operation_logs(1).await;
        let record = logs.items()[0].record();
        assert_eq!("POST", record.req_method);
        assert_eq!("/v1/users", record.req_path);
        assert_eq!("the-agent", record.user_agent);
        assert_eq!("10.1.2.3", record.client_ip);
        assert_eq!(200, record.http_status);
        assert!(record.req_body.contains("\"nickname\":\"Colin\""));
        assert!(record.res_data.contains("\"code\":0"));
        assert!(record.req_latency >= 0.0);
    }

    test_payload_must_be_json!(TestContext::setup().await.into_app(), route());
}
