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

//! REST interface for the user management service.
//!
//! Every API lives in its own `<entity>_<method>.rs` file and every response is wrapped in the
//! `Envelope` defined by `iii_iv_core::rest`.

use crate::driver::Driver;
use crate::middlewares::operation_log;
use crate::model::ListOptions;
use axum::Router;
use iii_iv_core::model::Selector;
use iii_iv_core::rest::{RestError, RestResult};
use serde::Deserialize;

mod operation_log_delete;
mod operation_logs_get;
#[cfg(test)]
mod testutils;
mod user_delete;
mod user_get;
mod user_post;
mod user_put;
mod users_delete;
mod users_get;

/// Query parameters accepted by the APIs that list a collection.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    /// Selector to filter the collection by, in `field==value,field=value` form.
    ///
    /// Requirements on fields that the collection does not support are ignored.
    #[serde(alias = "fieldSelector")]
    field_selector: Option<String>,

    /// Number of items to skip.
    offset: Option<String>,

    /// Maximum number of items to return.
    limit: Option<String>,
}

/// Parses the raw value of the `name` paging parameter.
fn parse_paging(name: &str, raw: &str) -> RestResult<u64> {
    let value = raw
        .trim()
        .parse::<i64>()
        .map_err(|e| RestError::Bind(format!("Invalid {} {}: {}", name, raw, e)))?;
    u64::try_from(value)
        .map_err(|_| RestError::Bind(format!("Invalid {} {}: cannot be negative", name, value)))
}

impl ListQuery {
    /// Converts the raw query into validated list options.
    pub(crate) fn into_options(self) -> RestResult<ListOptions> {
        let mut opts = ListOptions::default();

        if let Some(offset) = self.offset {
            opts.offset = parse_paging("offset", &offset)?;
        }
        if let Some(limit) = self.limit {
            opts.limit = parse_paging("limit", &limit)?;
        }

        if let Some(field_selector) = self.field_selector {
            opts.selector = Selector::parse(&field_selector)?;
        }

        Ok(opts)
    }
}

/// Creates the router for the service's resources.
///
/// When `operation_logging` is true, the operation logs API is exposed and every mutating
/// request is recorded as an operation log.
pub fn app(driver: Driver, operation_logging: bool) -> Router {
    use axum::routing::{delete, get};

    let mut router = Router::new()
        .route(
            "/v1/users",
            get(users_get::handler).post(user_post::handler).delete(users_delete::handler),
        )
        .route(
            "/v1/users/:name",
            get(user_get::handler).put(user_put::handler).delete(user_delete::handler),
        );

    if operation_logging {
        router = router
            .route("/operation-logs", get(operation_logs_get::handler))
            .route("/operation-logs/:id", delete(operation_log_delete::handler))
            .layer(axum::middleware::from_fn_with_state(driver.clone(), operation_log::record));
    }

    router.with_state(driver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iii_iv_core::model::{Operator, Requirement};

    #[test]
    fn test_list_query_defaults() {
        assert_eq!(ListOptions::default(), ListQuery::default().into_options().unwrap());
    }

    #[test]
    fn test_list_query_all_set() {
        let query = ListQuery {
            field_selector: Some("name==admin,email=foxmail".to_owned()),
            offset: Some("3".to_owned()),
            limit: Some("7".to_owned()),
        };
        let exp_selector = Selector::from(vec![
            Requirement::new("name", Operator::Equals, "admin"),
            Requirement::new("email", Operator::Contains, "foxmail"),
        ]);
        assert_eq!(
            ListOptions { selector: exp_selector, offset: 3, limit: 7 },
            query.into_options().unwrap()
        );
    }

    #[test]
    fn test_list_query_negative_values() {
        let query = ListQuery { offset: Some("-1".to_owned()), ..Default::default() };
        assert_eq!(
            RestError::Bind("Invalid offset -1: cannot be negative".to_owned()),
            query.into_options().unwrap_err()
        );

        let query = ListQuery { limit: Some("-5".to_owned()), ..Default::default() };
        assert_eq!(
            RestError::Bind("Invalid limit -5: cannot be negative".to_owned()),
            query.into_options().unwrap_err()
        );
    }

    #[test]
    fn test_list_query_not_a_number() {
        let query = ListQuery { offset: Some("many".to_owned()), ..Default::default() };
        assert_eq!(
            RestError::Bind("Invalid offset many: invalid digit found in string".to_owned()),
            query.into_options().unwrap_err()
        );
    }

    #[test]
    fn test_list_query_bad_selector() {
        let query = ListQuery { field_selector: Some("name".to_owned()), ..Default::default() };
        match query.into_options().unwrap_err() {
            RestError::FieldSelector(msg) => assert!(msg.contains("no operator found")),
            e => panic!("{:?}", e),
        }
    }
}
