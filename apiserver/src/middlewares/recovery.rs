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

//! Middleware to turn panics in handlers into error responses.

use axum::body::Body;
use axum::http::Response;
use axum::response::IntoResponse;
use iii_iv_core::rest::RestError;
use log::error;
use std::any::Any;
use tower_http::catch_panic::{CatchPanicLayer, ResponseForPanic};

/// Extracts a printable message out of a panic payload.
fn panic_message(err: &(dyn Any + Send)) -> &str {
    if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Builds the response for a recovered panic.
#[derive(Clone)]
pub(crate) struct PanicResponder {
    /// Whether to include the panic message in the response.
    debug: bool,
}

impl ResponseForPanic for PanicResponder {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response<Body> {
        let message = panic_message(err.as_ref());
        error!("Recovered from panic: {}", message);

        let detail = if self.debug {
            format!("Internal server error: {}", message)
        } else {
            "Internal server error".to_owned()
        };
        RestError::InternalError(detail).into_response()
    }
}

/// Creates the recovery layer; `debug` exposes the panic message to clients.
pub(crate) fn layer(debug: bool) -> CatchPanicLayer<PanicResponder> {
    CatchPanicLayer::custom(PanicResponder { debug })
}
