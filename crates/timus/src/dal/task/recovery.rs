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

//! Reconciliation of abandoned `in_progress` tasks.
//!
//! A task left `in_progress` by a process that died is never claimed again on
//! its own. The sweep treats a stale claim as a failed attempt: it counts
//! against the retry budget, and a task without budget left becomes `failed`.

use super::TaskDAL;
use crate::database::schema::tasks;
use crate::database::{UniversalTimestamp, UniversalUuid};
use crate::error::QueueError;
use crate::models::TaskStatus;
use diesel::prelude::*;
use serde::Serialize;

/// Tasks touched by one reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Requeued as `pending` with one more retry counted.
    pub requeued: Vec<UniversalUuid>,
    /// Out of retries and marked `failed`.
    pub abandoned: Vec<UniversalUuid>,
}

impl RecoveryReport {
    pub fn total(&self) -> usize {
        self.requeued.len() + self.abandoned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl<'a> TaskDAL<'a> {
    /// Requeues or fails every `in_progress` task whose `started_at` is
    /// before `cutoff`, recording `error` on each.
    pub async fn recover_stale(
        &self,
        cutoff: UniversalTimestamp,
        error: String,
        now: UniversalTimestamp,
    ) -> Result<RecoveryReport, QueueError> {
        let conn = self.connection().await?;
        let cutoff = cutoff.to_storage();
        let now = now.to_storage();

        let (requeued, abandoned) = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    let stale: Vec<(String, i32, i32)> = tasks::table
                        .filter(tasks::status.eq(TaskStatus::InProgress.as_str()))
                        .filter(
                            tasks::started_at
                                .lt(cutoff)
                                .or(tasks::started_at.is_null()),
                        )
                        .select((tasks::id, tasks::retry_count, tasks::max_retries))
                        .load(conn)?;

                    let (requeue, abandon): (Vec<_>, Vec<_>) = stale
                        .into_iter()
                        .partition(|(_, retry_count, max_retries)| retry_count < max_retries);
                    let requeue: Vec<String> = requeue.into_iter().map(|(id, _, _)| id).collect();
                    let abandon: Vec<String> = abandon.into_iter().map(|(id, _, _)| id).collect();

                    if !requeue.is_empty() {
                        let target = tasks::table.filter(tasks::id.eq_any(requeue.clone()));
                        diesel::update(target)
                            .set((
                                tasks::status.eq(TaskStatus::Pending.as_str()),
                                tasks::retry_count.eq(tasks::retry_count + 1),
                                tasks::started_at.eq(None::<String>),
                                tasks::error.eq(Some(error.clone())),
                            ))
                            .execute(conn)?;
                    }
                    if !abandon.is_empty() {
                        let target = tasks::table.filter(tasks::id.eq_any(abandon.clone()));
                        diesel::update(target)
                            .set((
                                tasks::status.eq(TaskStatus::Failed.as_str()),
                                tasks::completed_at.eq(Some(now)),
                                tasks::error.eq(Some(error.clone())),
                            ))
                            .execute(conn)?;
                    }

                    Ok((requeue, abandon))
                })
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        let parse = |ids: Vec<String>| -> Result<Vec<UniversalUuid>, QueueError> {
            ids.into_iter()
                .map(|id| {
                    id.parse().map_err(|e: uuid::Error| QueueError::CorruptRecord {
                        id: id.clone(),
                        message: e.to_string(),
                    })
                })
                .collect()
        };

        Ok(RecoveryReport {
            requeued: parse(requeued)?,
            abandoned: parse(abandoned)?,
        })
    }
}
