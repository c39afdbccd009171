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

//! Test utilities for the business logic.

use crate::db;
use crate::driver::Driver;
use crate::model::{HashedPassword, User};
use iii_iv_core::clocks::testutils::MonotonicClock;
use iii_iv_core::db::{Db, Executor};
use std::sync::Arc;

/// State of a running test.
pub(crate) struct TestContext {
    /// The driver under test.
    driver: Driver,
}

impl TestContext {
    /// Initializes the driver using an in-memory database and a monotonic clock.
    pub(crate) async fn setup() -> Self {
        let db = Arc::new(iii_iv_core::db::sqlite::testutils::setup().await);
        db::init_schema(&mut db.ex().await.unwrap(), true).await.unwrap();
        let clock = Arc::new(MonotonicClock::new(100000));
        Self { driver: Driver::new(db, clock) }
    }

    /// Gets a direct executor against the database.
    pub(crate) async fn ex(&self) -> Executor {
        self.driver.db.ex().await.unwrap()
    }

    /// Gets a copy of the driver in this test context.
    pub(crate) fn driver(&self) -> Driver {
        self.driver.clone()
    }

    /// Syntactic sugar to store a user directly in the database, bypassing password hashing.
    pub(crate) async fn create_user(&self, name: &str) -> User {
        let user = User::new(
            name,
            format!("Nick {}", name),
            HashedPassword::new("not-a-real-hash"),
            format!("{}@example.com", name),
            self.driver.clock.now_utc(),
        );
        db::create_user(&mut self.ex().await, user).await.unwrap()
    }
}
