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

//! Middleware to tag every request with a unique identifier.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

/// Header that carries the request identifier in requests and responses.
pub(crate) const X_REQUEST_ID: &str = "x-request-id";

/// Generates a new random request identifier.
fn generate() -> HeaderValue {
    let id = Uuid::new_v4().to_string();
    HeaderValue::from_str(&id).unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

/// Propagates the `X-Request-ID` of the request, or generates a new one, into both the request
/// seen by inner handlers and the response.
pub(crate) async fn inject(mut req: Request, next: Next) -> Response {
    let existing = req.headers().get(X_REQUEST_ID).filter(|id| !id.is_empty()).cloned();
    let id = match existing {
        Some(id) => id,
        None => {
            let id = generate();
            req.headers_mut().insert(X_REQUEST_ID, id.clone());
            id
        }
    };

    let mut response = next.run(req).await;
    response.headers_mut().insert(X_REQUEST_ID, id);
    response
}
