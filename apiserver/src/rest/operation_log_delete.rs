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

//! API to delete an operation log.

use crate::driver::Driver;
use axum::Json;
use axum::extract::State;
use iii_iv_core::rest::{EmptyBody, Envelope, PathParams, RestResult, ok_empty};

/// DELETE handler for this API.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    PathParams(id): PathParams<i64>,
    _: EmptyBody,
) -> RestResult<Json<Envelope<()>>> {
    driver.delete_operation_log(id).await?;
    Ok(ok_empty())
}

#[cfg(test)]
mod tests {
    use crate::rest::testutils::*;
    use axum::http;
    use iii_iv_core::rest::ErrorCode;
    use iii_iv_core::rest::testutils::OneShotBuilder;
    use iii_iv_core::test_payload_must_be_empty;

    fn route(id: &str) -> (http::Method, String) {
        (http::Method::DELETE, format!("/operation-logs/{}", id))
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), (http::Method::DELETE, "/v1/users/foo"))
            .send_empty()
            .await
            .expect_no_data()
            .await;
        let logs = context.wait_operation_logs(1).await;
        let id = *logs.items()[0].id();

        OneShotBuilder::new(context.app(), route(&id.to_string()))
            .send_empty()
            .await
            .expect_no_data()
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(0, *context.operation_logs().await.total_count());
    }

    #[tokio::test]
    async fn test_missing_is_ok() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route("1234")).send_empty().await.expect_no_data().await;
    }

    #[tokio::test]
    async fn test_bad_id() {
        let context = TestContext::setup().await;

        OneShotBuilder::new(context.app(), route("abc"))
            .send_empty()
            .await
            .expect_code(ErrorCode::BIND)
            .expect_error("Cannot parse")
            .await;
    }

    test_payload_must_be_empty!(TestContext::setup().await.into_app(), route("1"));
}
