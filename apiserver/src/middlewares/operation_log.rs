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

//! Middleware to record mutating requests as operation logs.

use crate::driver::Driver;
use crate::middlewares::request_id::X_REQUEST_ID;
use crate::middlewares::{body_from, buffer_body, client_ip, header_string, request_path};
use crate::model::OperationRecord;
use axum::extract::{Request, State};
use axum::http::{Method, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use iii_iv_core::rest::RestError;
use log::error;
use std::time::Instant;

/// Returns true if requests to `method` on `path` must not be recorded.
fn is_skipped(method: &Method, path: &str) -> bool {
    method == Method::GET || method == Method::OPTIONS || path.starts_with("/operation-log")
}

/// Serves `req` and records the exchange as an operation log.
///
/// The operation log is stored in the background once the response is ready: storage errors are
/// logged and never affect the response sent to the client.  Request bodies that do not fit in
/// memory are rejected.
pub(crate) async fn record(State(driver): State<Driver>, req: Request, next: Next) -> Response {
    if is_skipped(req.method(), req.uri().path()) {
        return next.run(req).await;
    }

    let start = Instant::now();
    let req_time = driver.now_utc();
    let request_id = header_string(req.headers(), X_REQUEST_ID);
    let user_agent = header_string(req.headers(), header::USER_AGENT.as_str());
    let req_referer = header_string(req.headers(), header::REFERER.as_str());
    let client_ip = client_ip(&req);
    let req_method = req.method().to_string();
    let req_path = request_path(req.uri());

    let (parts, body) = req.into_parts();
    let req_body = match buffer_body(body).await {
        Ok(bytes) => bytes,
        Err(e) => return RestError::Bind(format!("Cannot read request body: {}", e)).into_response(),
    };
    let req = Request::from_parts(parts, body_from(&req_body));

    let response = next.run(req).await;

    let (parts, body) = response.into_parts();
    let res_data = match buffer_body(body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return RestError::InternalError(format!("Cannot read response body: {}", e))
                .into_response();
        }
    };

    let record = OperationRecord {
        username: "".to_owned(),
        user_agent,
        client_ip,
        req_method,
        req_path,
        req_body: String::from_utf8_lossy(&req_body).into_owned(),
        req_referer,
        req_time,
        req_latency: start.elapsed().as_secs_f64(),
        http_status: parts.status.as_u16(),
        res_data: String::from_utf8_lossy(&res_data).into_owned(),
    };
    tokio::spawn(async move {
        if let Err(e) = driver.create_operation_log(record).await {
            error!("request id {}: create an operation log error: {}", request_id, e);
        }
    });

    Response::from_parts(parts, body_from(&res_data))
}
