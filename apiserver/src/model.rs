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

//! Data types for the service.

use derive_getters::Getters;
use iii_iv_core::model::Selector;
use serde::{Deserialize, Serialize};

mod operation_log;
pub use operation_log::{OperationLog, OperationRecord};
mod passwords;
pub use passwords::{HashedPassword, Password};
mod user;
pub use user::{ObjectMeta, RequestMeta, User, UserRequest, instance_id};

/// Free-form properties attached to an object, stored as a JSON document.
pub type Extend = serde_json::Map<String, serde_json::Value>;

/// Default maximum number of items returned by a list operation.
pub const DEFAULT_LIST_LIMIT: u64 = 1000;

/// Parameters of a list operation.
#[derive(Clone, Debug, PartialEq)]
pub struct ListOptions {
    /// Filter to apply to the items.
    pub selector: Selector,

    /// Number of items to skip.
    pub offset: u64,

    /// Maximum number of items to return.
    pub limit: u64,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self { selector: Selector::default(), offset: 0, limit: DEFAULT_LIST_LIMIT }
    }
}

/// A page of items along with the total number of items that match the query.
#[derive(Debug, Deserialize, Getters, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List<T> {
    /// Number of items that match the query, ignoring the offset and the limit.
    total_count: u64,

    /// Items in this page.
    items: Vec<T>,
}

impl<T> List<T> {
    /// Creates a new page of `items` out of `total_count` matches.
    pub fn new(total_count: u64, items: Vec<T>) -> Self {
        Self { total_count, items }
    }
}

/// A page of users.
pub type UserList = List<User>;

/// A page of operation logs.
pub type OperationLogList = List<OperationLog>;
