/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Atomic task claiming.
//!
//! Selection and the `pending -> in_progress` transition happen in a single
//! statement, so no two claimers can receive the same task. The outer
//! `status = 'pending'` guard keeps the update a no-op if the row changed
//! between the subquery and the write.

use super::{TaskDAL, TaskRow};
use crate::database::UniversalTimestamp;
use crate::error::QueueError;
use crate::models::Task;
use diesel::prelude::*;
use diesel::sql_types::Text;

const CLAIM_NEXT_SQL: &str = "\
UPDATE tasks
   SET status = 'in_progress', started_at = ?
 WHERE id = (
        SELECT id FROM tasks
         WHERE status = 'pending'
           AND (run_at IS NULL OR run_at <= ?)
         ORDER BY priority ASC, created_at ASC, rowid ASC
         LIMIT 1)
   AND status = 'pending'
RETURNING *";

impl<'a> TaskDAL<'a> {
    /// Claims the most urgent ready task, marking it `in_progress` with
    /// `started_at = now`.
    ///
    /// A task is ready when it is `pending` and its `run_at` is unset or not
    /// after `now`. Among ready tasks the lowest priority rank wins, then the
    /// oldest `created_at`, then insertion order.
    pub async fn claim_next(&self, now: UniversalTimestamp) -> Result<Option<Task>, QueueError> {
        let conn = self.connection().await?;
        let now = now.to_storage();

        let row: Option<TaskRow> = conn
            .interact(move |conn| {
                diesel::sql_query(CLAIM_NEXT_SQL)
                    .bind::<Text, _>(now.clone())
                    .bind::<Text, _>(now)
                    .get_result::<TaskRow>(conn)
                    .optional()
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        row.map(TaskRow::into_task).transpose()
    }
}
