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

//! Generic code for REST handlers.
//!
//! All services should implement an `app` function in this module that returns the `Router` for the
//! application.
//!
//! Every API should be put in its own `.rs` file, using a name like `<entity>_<method>.rs`.  This
//! may seem overkill, but putting every API in its own file makes it easy to ensure all the
//! integration tests for the given API truly belong to that API.
//!
//! More specifically, the `tests` module within an API should define a `route` method that
//! returns the HTTP method and the API path under test.  All integration tests within the module
//! then rely on `route` to obtain this information, ensuring that they all test the desired API.
//!
//! Every response produced by this layer is wrapped in an `Envelope`, which carries a numeric
//! application code next to the HTTP status.  Successful responses use code `0` and errors use
//! one of the `ErrorCode` constants.
//!
//! It is also useful for the tests in this layer to define a `TestContext` in a `testutils` module
//! that allows interacting with the database layer directly, using simplified types.

use crate::driver::DriverError;
use crate::model::{ModelError, ParseError};
use async_trait::async_trait;
use axum::body::HttpBody;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Application code of successful responses.
pub const SUCCESS_CODE: u32 = 0;

/// Message of successful responses.
pub const SUCCESS_MESSAGE: &str = "OK";

/// An application error code along with the HTTP status it is reported with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ErrorCode {
    /// Numeric code placed in the `code` field of the envelope.
    pub code: u32,

    /// HTTP status of the response.
    pub status: StatusCode,
}

impl ErrorCode {
    /// Unexpected failure, including recovered panics.
    pub const UNKNOWN: ErrorCode =
        ErrorCode { code: 100001, status: StatusCode::INTERNAL_SERVER_ERROR };

    /// The request could not be bound to the expected types.
    pub const BIND: ErrorCode = ErrorCode { code: 100002, status: StatusCode::BAD_REQUEST };

    /// The request was well-formed but its fields did not pass validation.
    pub const VALIDATION: ErrorCode = ErrorCode { code: 100003, status: StatusCode::BAD_REQUEST };

    /// No route matches the request.
    pub const PAGE_NOT_FOUND: ErrorCode =
        ErrorCode { code: 100004, status: StatusCode::NOT_FOUND };

    /// The field selector in the request could not be parsed.
    pub const FIELD_SELECTOR: ErrorCode =
        ErrorCode { code: 100005, status: StatusCode::BAD_REQUEST };

    /// The request carried a body where none is accepted.
    pub const PAYLOAD_NOT_EMPTY: ErrorCode =
        ErrorCode { code: 100006, status: StatusCode::PAYLOAD_TOO_LARGE };

    /// The storage layer failed.
    pub const DATABASE: ErrorCode =
        ErrorCode { code: 100101, status: StatusCode::INTERNAL_SERVER_ERROR };

    /// The requested resource does not exist.
    pub const NOT_FOUND: ErrorCode = ErrorCode { code: 110001, status: StatusCode::NOT_FOUND };

    /// A resource with the same identity already exists.
    pub const ALREADY_EXISTS: ErrorCode =
        ErrorCode { code: 110002, status: StatusCode::BAD_REQUEST };
}

/// Frontend errors.  These are the errors that are visible to the user on failed requests.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RestError {
    /// Indicates that a request to create an entry failed because it already exists.
    #[error("{0}")]
    AlreadyExists(String),

    /// Indicates that the request could not be deserialized into the expected types.
    #[error("{0}")]
    Bind(String),

    /// Indicates a failure in the storage layer.
    #[error("{0}")]
    Database(String),

    /// Indicates that the field selector of a list request is malformed.
    #[error("{0}")]
    FieldSelector(String),

    /// Catch-all error type for all unexpected errors.
    #[error("{0}")]
    InternalError(String),

    /// Indicates an error in the contents of the request.
    #[error("{0}")]
    InvalidRequest(String),

    /// Indicates that a requested entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Indicates that no route handles the request.
    #[error("URL path not found")]
    PageNotFound,

    /// Indicates that a request that should have empty content did not.
    #[error("Content should be empty")]
    PayloadNotEmpty,

    /// Indicates that one or more fields of the request failed validation.
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),
}

impl RestError {
    /// Returns the application code that represents this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            RestError::AlreadyExists(_) => ErrorCode::ALREADY_EXISTS,
            RestError::Bind(_) => ErrorCode::BIND,
            RestError::Database(_) => ErrorCode::DATABASE,
            RestError::FieldSelector(_) => ErrorCode::FIELD_SELECTOR,
            RestError::InternalError(_) => ErrorCode::UNKNOWN,
            RestError::InvalidRequest(_) => ErrorCode::VALIDATION,
            RestError::NotFound(_) => ErrorCode::NOT_FOUND,
            RestError::PageNotFound => ErrorCode::PAGE_NOT_FOUND,
            RestError::PayloadNotEmpty => ErrorCode::PAYLOAD_NOT_EMPTY,
            RestError::Validation(_) => ErrorCode::VALIDATION,
        }
    }
}

impl From<DriverError> for RestError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::AlreadyExists(_) => RestError::AlreadyExists(e.to_string()),
            DriverError::BackendError(_) => RestError::Database(e.to_string()),
            DriverError::InvalidInput(_) => RestError::InvalidRequest(e.to_string()),
            DriverError::NotFound(_) => RestError::NotFound(e.to_string()),
        }
    }
}

impl From<ModelError> for RestError {
    fn from(e: ModelError) -> Self {
        RestError::InvalidRequest(e.to_string())
    }
}

impl From<ParseError> for RestError {
    fn from(e: ParseError) -> Self {
        RestError::FieldSelector(e.to_string())
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> axum::response::Response {
        let code = self.code();
        let envelope =
            Envelope::<()> { code: code.code, message: self.to_string(), data: None };
        (code.status, axum::Json(envelope)).into_response()
    }
}

/// Result type for this module.
pub type RestResult<T> = Result<T, RestError>;

/// Uniform wrapper for the payload of every response.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct Envelope<T> {
    /// Application code: `SUCCESS_CODE` or one of the `ErrorCode` values.
    pub code: u32,

    /// Human-readable description of the outcome.
    pub message: String,

    /// Payload of a successful response, or null.
    pub data: Option<T>,
}

/// Wraps `data` in a successful response envelope.
pub fn ok<T: Serialize>(data: T) -> axum::Json<Envelope<T>> {
    axum::Json(Envelope { code: SUCCESS_CODE, message: SUCCESS_MESSAGE.to_owned(), data: Some(data) })
}

/// Returns a successful response envelope without data.
pub fn ok_empty() -> axum::Json<Envelope<()>> {
    axum::Json(Envelope { code: SUCCESS_CODE, message: SUCCESS_MESSAGE.to_owned(), data: None })
}

/// A JSON request body extractor whose rejections are reported as `RestError::Bind`.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = RestError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(JsonBody(value)),
            Err(e) => Err(RestError::Bind(e.body_text())),
        }
    }
}

/// A query string extractor whose rejections are reported as `RestError::Bind`.
#[derive(Debug)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = RestError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Query::<T>::from_request_parts(parts, state).await {
            Ok(axum::extract::Query(value)) => Ok(QueryParams(value)),
            Err(e) => Err(RestError::Bind(e.body_text())),
        }
    }
}

/// A path parameters extractor whose rejections are reported as `RestError::Bind`.
#[derive(Debug)]
pub struct PathParams<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for PathParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = RestError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Path::<T>::from_request_parts(parts, state).await {
            Ok(axum::extract::Path(value)) => Ok(PathParams(value)),
            Err(e) => Err(RestError::Bind(e.body_text())),
        }
    }
}

/// A request body extractor that forbids any content.
///
/// Any API that doesn't expect a body should use this to ensure we don't get garbage data that we
/// don't care about.  This future-proofs the service.
pub struct EmptyBody {}

#[async_trait]
impl<S> FromRequest<S> for EmptyBody
where
    S: Send + Sync,
{
    type Rejection = RestError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        if req.into_body().is_end_stream() {
            Ok(EmptyBody {})
        } else {
            Err(RestError::PayloadNotEmpty)
        }
    }
}

/// Common test code for the REST server.
#[cfg(feature = "testutils")]
pub mod testutils {
    use super::*;
    use axum::Router;
    use axum::http::{self, HeaderName, HeaderValue};
    use serde::Serialize;
    use tower::util::ServiceExt;

    /// Maximum body size for testing purposes.
    const MAX_BODY_SIZE: usize = 1024 * 1024;

    /// Builder for a single request to the API server.
    #[must_use]
    pub struct OneShotBuilder {
        /// The router for the app being tested.
        app: Router,

        /// Builder for the request that will be sent to the app.
        builder: axum::http::request::Builder,
    }

    impl OneShotBuilder {
        /// Creates a new request against a given `method`/`uri` pair served by an `app` router.
        pub fn new<U: AsRef<str>>(app: Router, (method, uri): (http::Method, U)) -> Self {
            let builder = Request::builder().method(method).uri(uri.as_ref());
            Self { app, builder }
        }

        /// Extends the URI in the request with a `query`.
        pub fn with_query<Q: Serialize>(mut self, query: Q) -> Self {
            let uri = self.builder.uri_ref().unwrap().to_string();
            assert!(!uri.contains('?'), "URI already contains a query: {}", uri);
            assert!(!uri.contains('#'), "URI contains a fragment: {}", uri);
            self.builder = self.builder.uri(format!(
                "{}?{}",
                uri,
                serde_urlencoded::to_string(query).unwrap()
            ));
            self
        }

        /// Sets the header `name` to `value` in the outgoing request.
        pub fn with_header<K, V>(mut self, name: K, value: V) -> Self
        where
            HeaderName: TryFrom<K>,
            <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
            HeaderValue: TryFrom<V>,
            <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
        {
            self.builder = self.builder.header(name, value);
            self
        }

        /// Finishes building the request and sends it with an empty payload.
        pub async fn send_empty(self) -> ResponseChecker {
            let request = self.builder.body(axum::body::Body::empty()).unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a text payload.
        pub async fn send_text<T: Into<String>>(self, text: T) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, mime::TEXT_PLAIN.as_ref())
                .body(axum::body::Body::from(text.into()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a JSON payload.
        pub async fn send_json<T: Serialize>(self, request: T) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(axum::body::Body::from(serde_json::to_vec(&request).unwrap()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }
    }

    /// Type alias for the complex type returned by the `oneshot` function.
    type HttpResponse = hyper::Response<axum::body::Body>;

    /// Validator for the outcome of a request sent by a `OneShotBuilder`.
    #[must_use]
    pub struct ResponseChecker {
        /// Actual response that we received from the app.
        response: HttpResponse,

        /// Expected HTTP status code in the response above.
        exp_status: http::StatusCode,

        /// Expected application code in the envelope of the response above.
        exp_code: u32,
    }

    impl From<HttpResponse> for ResponseChecker {
        fn from(response: HttpResponse) -> Self {
            Self { response, exp_status: http::StatusCode::OK, exp_code: SUCCESS_CODE }
        }
    }

    impl ResponseChecker {
        /// Sets the expected exit HTTP status to `status`.
        pub fn expect_status(mut self, status: http::StatusCode) -> Self {
            self.exp_status = status;
            self
        }

        /// Sets the expected application code and its matching HTTP status to `code`.
        pub fn expect_code(mut self, code: ErrorCode) -> Self {
            self.exp_status = code.status;
            self.exp_code = code.code;
            self
        }

        /// Performs common validation operations on the response.
        pub fn verify(&self) {
            assert_eq!(self.exp_status, self.response.status());
        }

        /// Consumes the response body and parses it as an envelope.
        async fn take_envelope<T: DeserializeOwned>(self) -> Envelope<T> {
            self.verify();

            let body =
                axum::body::to_bytes(self.response.into_body(), MAX_BODY_SIZE).await.unwrap();
            let envelope: Envelope<T> = match serde_json::from_slice(&body) {
                Ok(envelope) => envelope,
                Err(e) => {
                    let body = String::from_utf8_lossy(&body);
                    panic!("Invalid envelope due to {}; content was {}", e, body);
                }
            };
            assert_eq!(self.exp_code, envelope.code, "Unexpected code in {}", envelope.message);
            envelope
        }

        /// Finishes checking the response and expects its body to be an error envelope whose
        /// message matches `exp_re`.
        pub async fn expect_error(self, exp_re: &str) {
            assert_ne!(SUCCESS_CODE, self.exp_code, "Use expect_code before expect_error");

            let envelope = self.take_envelope::<serde_json::Value>().await;
            assert!(envelope.data.is_none(), "Error envelope carries data: {:?}", envelope);
            let re = regex::Regex::new(exp_re).unwrap();
            assert!(
                re.is_match(&envelope.message),
                "Response message '{}' does not match re '{}'",
                envelope.message,
                exp_re
            );
        }

        /// Finishes checking the response and expects it to be a successful envelope with a
        /// payload of type `T`.
        pub async fn expect_data<T: DeserializeOwned>(self) -> T {
            let envelope = self.take_envelope::<T>().await;
            assert_eq!(SUCCESS_MESSAGE, envelope.message);
            match envelope.data {
                Some(data) => data,
                None => panic!("Successful envelope has no data"),
            }
        }

        /// Finishes checking the response and expects it to be a successful envelope without a
        /// payload.
        pub async fn expect_no_data(self) {
            let envelope = self.take_envelope::<serde_json::Value>().await;
            assert_eq!(SUCCESS_MESSAGE, envelope.message);
            assert!(envelope.data.is_none(), "Unexpected data {:?}", envelope.data);
        }

        /// Finishes checking the response and expects its body to be valid UTF-8 and to match
        /// `exp_re`.
        pub async fn expect_text(self, exp_re: &str) {
            assert!(!exp_re.is_empty(), "Use expect_no_data to validate empty responses");

            let body = self.take_body_as_text().await;
            let re = regex::Regex::new(exp_re).unwrap();
            assert!(re.is_match(&body), "Body content '{}' does not match re '{}'", body, exp_re);
        }

        /// Finishes checking the response and returns the body of the response as UTF-8.
        pub async fn take_body_as_text(self) -> String {
            self.verify();

            let body =
                axum::body::to_bytes(self.response.into_body(), MAX_BODY_SIZE).await.unwrap();
            String::from_utf8(body.to_vec()).unwrap()
        }

        /// Finishes checking the response and returns the response itself for out of band
        /// validation of properties not supported by the `ResponseChecker`.
        pub async fn take_response(self) -> HttpResponse {
            self.verify();

            self.response
        }
    }

    /// Generates a test to verify that an API that expects JSON fails when it gets something else.
    #[macro_export]
    macro_rules! test_payload_must_be_json {
        ( $app:expr, $route:expr $(, $query:expr)? ) => {
            #[tokio::test]
            async fn test_payload_must_be_json() {
                $crate::rest::testutils::OneShotBuilder::new($app, $route)
                    $( .with_query($query) )?
                    .send_text("this is not json")
                    .await
                    .expect_code($crate::rest::ErrorCode::BIND)
                    .expect_error("Content-Type")
                    .await;

                $crate::rest::testutils::OneShotBuilder::new($app, $route)
                    $( .with_query($query) )?
                    .with_header(axum::http::header::CONTENT_TYPE, "application/json")
                    .send_text("this is not json")
                    .await
                    .expect_code($crate::rest::ErrorCode::BIND)
                    .expect_error("expected ident")
                    .await;
            }
        };
    }

    pub use test_payload_must_be_json;

    /// Generates a test to verify that an API that does not expect a payload fails as necessary.
    #[macro_export]
    macro_rules! test_payload_must_be_empty {
        ( $app:expr, $route:expr $(, $query:expr)? ) => {
            #[tokio::test]
            async fn test_payload_must_be_empty() {
                $crate::rest::testutils::OneShotBuilder::new($app, $route)
                    $( .with_query($query) )?
                    .send_text("should not be here")
                    .await
                    .expect_code($crate::rest::ErrorCode::PAYLOAD_NOT_EMPTY)
                    .expect_error("should be empty")
                    .await;
            }
        };
    }

    pub use test_payload_must_be_empty;
}
