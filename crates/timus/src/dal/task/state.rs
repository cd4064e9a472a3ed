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

//! Completion and failure transitions.
//!
//! Both transitions only apply to `in_progress` tasks. Anything else is
//! reported to the caller instead of raised, so a late or duplicate report
//! can never move a terminal task.

use super::TaskDAL;
use crate::database::schema::tasks;
use crate::database::{UniversalTimestamp, UniversalUuid};
use crate::error::QueueError;
use crate::models::TaskStatus;
use diesel::prelude::*;
use serde::Serialize;

/// What a failure report did to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FailOutcome {
    /// Back to `pending` with the incremented retry count.
    Requeued { retry_count: u32 },
    /// Terminal `failed`.
    Failed,
    /// The task was missing or not `in_progress`; nothing changed.
    Ignored,
}

impl<'a> TaskDAL<'a> {
    /// Moves an `in_progress` task to `completed`, storing `result` and
    /// clearing any error left by an earlier attempt.
    ///
    /// Returns `false` when the task does not exist or is not `in_progress`.
    pub async fn mark_completed(
        &self,
        id: UniversalUuid,
        result: String,
        now: UniversalTimestamp,
    ) -> Result<bool, QueueError> {
        let conn = self.connection().await?;
        let key = id.to_storage();
        let now = now.to_storage();

        let updated = conn
            .interact(move |conn| {
                diesel::update(
                    tasks::table
                        .filter(tasks::id.eq(key))
                        .filter(tasks::status.eq(TaskStatus::InProgress.as_str())),
                )
                .set((
                    tasks::status.eq(TaskStatus::Completed.as_str()),
                    tasks::completed_at.eq(Some(now)),
                    tasks::result.eq(Some(result)),
                    tasks::error.eq(None::<String>),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(updated == 1)
    }

    /// Records a failed attempt on an `in_progress` task.
    ///
    /// A retriable failure with budget left requeues the task: `retry_count`
    /// is incremented, `started_at` cleared and `run_at` set to `retry_at`.
    /// Otherwise the task becomes `failed`. The error is stored either way.
    pub async fn mark_failed(
        &self,
        id: UniversalUuid,
        error: String,
        retriable: bool,
        retry_at: Option<UniversalTimestamp>,
        now: UniversalTimestamp,
    ) -> Result<FailOutcome, QueueError> {
        let conn = self.connection().await?;
        let key = id.to_storage();
        let now = now.to_storage();
        let retry_at = retry_at.map(|t| t.to_storage());

        let outcome = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    let current: Option<(String, i32, i32)> = tasks::table
                        .find(key.clone())
                        .select((tasks::status, tasks::retry_count, tasks::max_retries))
                        .first(conn)
                        .optional()?;

                    let Some((status, retry_count, max_retries)) = current else {
                        return Ok(FailOutcome::Ignored);
                    };
                    if status != TaskStatus::InProgress.as_str() {
                        return Ok(FailOutcome::Ignored);
                    }

                    if retriable && retry_count < max_retries {
                        let next = retry_count + 1;
                        diesel::update(tasks::table.find(key.clone()))
                            .set((
                                tasks::status.eq(TaskStatus::Pending.as_str()),
                                tasks::retry_count.eq(next),
                                tasks::run_at.eq(retry_at),
                                tasks::started_at.eq(None::<String>),
                                tasks::error.eq(Some(error)),
                            ))
                            .execute(conn)?;
                        Ok(FailOutcome::Requeued {
                            retry_count: u32::try_from(next).unwrap_or(0),
                        })
                    } else {
                        diesel::update(tasks::table.find(key.clone()))
                            .set((
                                tasks::status.eq(TaskStatus::Failed.as_str()),
                                tasks::completed_at.eq(Some(now)),
                                tasks::error.eq(Some(error)),
                            ))
                            .execute(conn)?;
                        Ok(FailOutcome::Failed)
                    }
                })
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(outcome)
    }
}
