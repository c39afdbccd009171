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

//! Test utilities for the REST API.

use crate::db;
use crate::driver::testutils::TestContext as DriverTestContext;
use crate::model::{ListOptions, OperationLogList, User};
use crate::rest::app;
use axum::Router;
use iii_iv_core::db::DbError;

/// State of a running test.
pub(crate) struct TestContext {
    /// Context of the driver backing the app.
    context: DriverTestContext,

    /// The app under test.
    app: Router,
}

impl TestContext {
    /// Initializes the app with operation logging enabled.
    pub(crate) async fn setup() -> Self {
        let context = DriverTestContext::setup().await;
        let app = app(context.driver(), true);
        Self { context, app }
    }

    /// Gets a clone of the app router.
    pub(crate) fn app(&self) -> Router {
        self.app.clone()
    }

    /// Consumes the context and transforms it into the app router.
    pub(crate) fn into_app(self) -> Router {
        self.app
    }

    /// Stores a user directly in the database.
    pub(crate) async fn create_user(&self, name: &str) -> User {
        self.context.create_user(name).await
    }

    /// Gets a user directly from the database, if it exists.
    pub(crate) async fn get_user(&self, name: &str) -> Option<User> {
        match db::get_user(&mut self.context.ex().await, name).await {
            Ok(user) => Some(user),
            Err(DbError::NotFound) => None,
            Err(e) => panic!("{:?}", e),
        }
    }

    /// Lists all operation logs directly from the database.
    pub(crate) async fn operation_logs(&self) -> OperationLogList {
        db::list_operation_logs(&mut self.context.ex().await, &ListOptions::default()).await.unwrap()
    }

    /// Waits until there are `count` operation logs in the database and returns them.
    ///
    /// Operation logs are written in the background, so tests cannot check for them right after
    /// issuing a request.
    pub(crate) async fn wait_operation_logs(&self, count: u64) -> OperationLogList {
        for _ in 0..100 {
            let logs = self.operation_logs().await;
            if *logs.total_count() >= count {
                assert_eq!(count, *logs.total_count());
                return logs;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("Operation logs not written in time");
    }
}
