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

//! Extends the driver with the operations on operation logs.

use crate::db;
use crate::driver::Driver;
use crate::model::{ListOptions, OperationLog, OperationLogList, OperationRecord};
use iii_iv_core::clocks::Clock;
use iii_iv_core::driver::DriverResult;

impl Driver {
    /// Persists the audit `record` of a request that was just served.
    pub(crate) async fn create_operation_log(
        self,
        record: OperationRecord,
    ) -> DriverResult<OperationLog> {
        let mut ex = self.db.ex().await?;
        Ok(db::create_operation_log(&mut ex, record, self.clock.now_utc()).await?)
    }

    /// Gets the page of operation logs described by `opts`.
    pub(crate) async fn list_operation_logs(
        self,
        opts: ListOptions,
    ) -> DriverResult<OperationLogList> {
        let mut ex = self.db.ex().await?;
        Ok(db::list_operation_logs(&mut ex, &opts).await?)
    }

    /// Deletes the operation log with identifier `id`, if it exists.
    pub(crate) async fn delete_operation_log(self, id: i64) -> DriverResult<()> {
        let mut ex = self.db.ex().await?;
        db::delete_operation_log(&mut ex, id).await?;
        Ok(())
    }
}
