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

//! Business logic of the user management service.

use iii_iv_core::clocks::Clock;
use iii_iv_core::db::Db;
use std::sync::Arc;
use time::OffsetDateTime;

mod operation_logs;
#[cfg(test)]
pub(crate) mod testutils;
mod users;

/// Entry point to the user and operation log operations.
///
/// Each operation takes `self` by value and runs within its own transaction, so handlers clone
/// the shared driver once per request.
#[derive(Clone)]
pub struct Driver {
    /// Storage for users and operation logs.
    db: Arc<dyn Db + Send + Sync>,

    /// Source of the creation and modification timestamps.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl Driver {
    /// Creates a driver that persists to `db` and timestamps with `clock`.
    pub fn new(db: Arc<dyn Db + Send + Sync>, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { db, clock }
    }

    /// Returns the current time according to the driver's clock.
    pub(crate) fn now_utc(&self) -> OffsetDateTime {
        self.clock.now_utc()
    }
}
