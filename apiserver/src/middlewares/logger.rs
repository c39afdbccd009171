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

//! Middleware to log every served request.

use crate::middlewares::request_id::X_REQUEST_ID;
use crate::middlewares::{client_ip, header_string, request_path};
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use log::info;
use std::time::Instant;

/// Emits an access log entry once the response for `req` is ready.
pub(crate) async fn log_access(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = request_path(req.uri());
    let client_ip = client_ip(&req);

    let response = next.run(req).await;

    info!(
        target: "access",
        "{} - [{}] {}ms {} {} request_id={}",
        response.status().as_u16(),
        client_ip,
        start.elapsed().as_millis(),
        method,
        path,
        header_string(response.headers(), X_REQUEST_ID),
    );
    response
}
