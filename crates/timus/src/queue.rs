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

//! # Task Queue
//!
//! Durable, priority-ordered work queue shared by interactive submitters, the
//! scheduler and the runner.
//!
//! ## Lifecycle
//!
//! ```text
//! pending --claim_next--> in_progress --complete--> completed
//!    ^                         |
//!    +----fail (retriable, ----+----fail (otherwise)--> failed
//!          budget left)
//! ```
//!
//! - `claim_next` hands each ready task to exactly one caller.
//! - `complete` and `fail` only act on `in_progress` tasks; reports about
//!   any other task are logged and ignored.
//! - `retry_count` never exceeds `max_retries`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use timus::{NewTask, Priority, TaskQueue};
//!
//! let queue = TaskQueue::new(database);
//! let id = queue.enqueue(NewTask::new("summarize log").priority(Priority::High)).await?;
//! if let Some(task) = queue.claim_next().await? {
//!     queue.complete(task.id, &serde_json::json!({"summary": "..."})).await?;
//! }
//! ```

use crate::classifier::Classification;
use crate::dal::{FailOutcome, RecoveryReport, DAL};
use crate::database::{Database, UniversalTimestamp, UniversalUuid};
use crate::error::{InvalidTaskError, QueueError};
use crate::models::{NewTask, QueueStats, Task, TaskStatus};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest accepted description, in bytes.
pub const MAX_DESCRIPTION_BYTES: usize = 32 * 1024;

/// Largest accepted retry budget.
pub const MAX_RETRY_BUDGET: u32 = 25;

/// Error recorded on tasks recovered by [`TaskQueue::recover_stale`].
pub const RECOVERED_TASK_ERROR: &str = "abandoned in_progress task recovered at startup";

/// Handle to the persistent task queue. Cheap to clone.
#[derive(Clone, Debug)]
pub struct TaskQueue {
    dal: DAL,
}

impl TaskQueue {
    pub fn new(database: Database) -> Self {
        Self {
            dal: DAL::new(database),
        }
    }

    pub fn dal(&self) -> &DAL {
        &self.dal
    }

    /// Persists a new `pending` task and returns its id.
    ///
    /// Nothing is written when the input is invalid.
    pub async fn enqueue(&self, new_task: NewTask) -> Result<UniversalUuid, QueueError> {
        validate(&new_task)?;

        let task = Task {
            id: UniversalUuid::new_v4(),
            description: new_task.description,
            priority: new_task.priority,
            target_agent: new_task.target_agent,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: new_task.max_retries,
            created_at: UniversalTimestamp::now(),
            run_at: new_task.run_at,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            metadata: new_task.metadata,
        };

        self.dal.task().create(&task).await?;
        metrics::counter!("timus_tasks_enqueued_total").increment(1);
        info!(
            task_id = %task.id,
            priority = %task.priority,
            agent = ?task.target_agent,
            run_at = ?task.run_at,
            "Task enqueued"
        );
        Ok(task.id)
    }

    /// Atomically claims the most urgent ready task, or `None` when no task
    /// is ready.
    pub async fn claim_next(&self) -> Result<Option<Task>, QueueError> {
        let claimed = self.dal.task().claim_next(UniversalTimestamp::now()).await?;
        if let Some(task) = &claimed {
            metrics::counter!("timus_tasks_claimed_total").increment(1);
            debug!(
                task_id = %task.id,
                priority = %task.priority,
                retry_count = task.retry_count,
                "Task claimed"
            );
        }
        Ok(claimed)
    }

    /// Marks an `in_progress` task `completed` with `result`.
    ///
    /// Returns `false`, and logs a warning, when the task is not
    /// `in_progress`. Repeating a completion therefore changes nothing.
    pub async fn complete(
        &self,
        id: UniversalUuid,
        result: &serde_json::Value,
    ) -> Result<bool, QueueError> {
        let updated = self
            .dal
            .task()
            .mark_completed(id, result.to_string(), UniversalTimestamp::now())
            .await?;

        if updated {
            metrics::counter!("timus_tasks_completed_total").increment(1);
            info!(task_id = %id, "Task completed");
        } else {
            warn!(task_id = %id, "Ignoring completion for task that is not in_progress");
        }
        Ok(updated)
    }

    /// Records a failed run of an `in_progress` task.
    ///
    /// A retriable classification with budget left requeues the task,
    /// eligible again from `retry_at` (immediately when `None`). Any other
    /// failure is terminal.
    pub async fn fail(
        &self,
        id: UniversalUuid,
        error: &str,
        classification: Classification,
        retry_at: Option<UniversalTimestamp>,
    ) -> Result<FailOutcome, QueueError> {
        let outcome = self
            .dal
            .task()
            .mark_failed(
                id,
                error.to_string(),
                classification.retriable,
                retry_at,
                UniversalTimestamp::now(),
            )
            .await?;

        match outcome {
            FailOutcome::Requeued { retry_count } => {
                metrics::counter!("timus_tasks_requeued_total").increment(1);
                info!(
                    task_id = %id,
                    retry_count,
                    category = %classification.category,
                    retry_at = ?retry_at,
                    "Task requeued for retry"
                );
            }
            FailOutcome::Failed => {
                metrics::counter!("timus_tasks_failed_total").increment(1);
                warn!(
                    task_id = %id,
                    category = %classification.category,
                    "Task failed permanently"
                );
            }
            FailOutcome::Ignored => {
                warn!(task_id = %id, "Ignoring failure for task that is not in_progress");
            }
        }
        Ok(outcome)
    }

    pub async fn get(&self, id: UniversalUuid) -> Result<Task, QueueError> {
        self.dal
            .task()
            .get_by_id(id)
            .await?
            .ok_or(QueueError::NotFound(id))
    }

    pub async fn list(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>, QueueError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.dal.task().list(status, limit).await
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        self.dal.task().stats().await
    }

    /// Reconciles `in_progress` tasks claimed more than `older_than` ago.
    ///
    /// Each one counts as a failed attempt: it is requeued while it has retry
    /// budget and marked `failed` otherwise.
    pub async fn recover_stale(&self, older_than: Duration) -> Result<RecoveryReport, QueueError> {
        let now = UniversalTimestamp::now();
        let report = self
            .dal
            .task()
            .recover_stale(now.minus(older_than), RECOVERED_TASK_ERROR.to_string(), now)
            .await?;

        if !report.is_empty() {
            metrics::counter!("timus_stale_tasks_recovered_total").increment(report.total() as u64);
            warn!(
                requeued = report.requeued.len(),
                abandoned = report.abandoned.len(),
                "Recovered stale in_progress tasks"
            );
        }
        Ok(report)
    }

    /// Deletes `completed` and `failed` tasks that finished more than
    /// `older_than` ago. With `dry_run` nothing is deleted and the count of
    /// matching tasks is returned.
    pub async fn purge_finished(
        &self,
        older_than: Duration,
        dry_run: bool,
    ) -> Result<u64, QueueError> {
        let cutoff = UniversalTimestamp::now().minus(older_than);
        if dry_run {
            return self.dal.task().count_finished_before(cutoff).await;
        }
        let deleted = self.dal.task().purge_finished_before(cutoff).await? as u64;
        if deleted > 0 {
            info!(deleted, cutoff = %cutoff, "Purged finished tasks");
        }
        Ok(deleted)
    }
}

fn validate(task: &NewTask) -> Result<(), InvalidTaskError> {
    if task.description.trim().is_empty() {
        return Err(InvalidTaskError::EmptyDescription);
    }
    if task.description.len() > MAX_DESCRIPTION_BYTES {
        return Err(InvalidTaskError::DescriptionTooLong {
            len: task.description.len(),
            max: MAX_DESCRIPTION_BYTES,
        });
    }
    if task.max_retries > MAX_RETRY_BUDGET {
        return Err(InvalidTaskError::RetryBudgetTooLarge {
            requested: task.max_retries,
            max: MAX_RETRY_BUDGET,
        });
    }
    if task.metadata.keys().any(|k| k.trim().is_empty()) {
        return Err(InvalidTaskError::InvalidMetadata(
            "metadata keys must not be empty".to_string(),
        ));
    }
    if let Some(run_at) = task.run_at.filter(|run_at| !run_at.is_storable()) {
        return Err(InvalidTaskError::RunAtOutOfRange(
            run_at.as_datetime().to_rfc3339(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_malformed_input() {
        assert_eq!(
            validate(&NewTask::new("   ")),
            Err(InvalidTaskError::EmptyDescription)
        );
        assert!(matches!(
            validate(&NewTask::new("x".repeat(MAX_DESCRIPTION_BYTES + 1))),
            Err(InvalidTaskError::DescriptionTooLong { .. })
        ));
        assert_eq!(
            validate(&NewTask::new("ok").max_retries(26)),
            Err(InvalidTaskError::RetryBudgetTooLarge {
                requested: 26,
                max: MAX_RETRY_BUDGET
            })
        );
        assert!(matches!(
            validate(&NewTask::new("ok").with_meta(" ", 1)),
            Err(InvalidTaskError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_validate_accepts_boundaries() {
        assert_eq!(validate(&NewTask::new("x".repeat(MAX_DESCRIPTION_BYTES))), Ok(()));
        assert_eq!(validate(&NewTask::new("ok").max_retries(0)), Ok(()));
        assert_eq!(validate(&NewTask::new("ok").max_retries(MAX_RETRY_BUDGET)), Ok(()));
        assert_eq!(
            validate(&NewTask::new("ok").run_at(UniversalTimestamp::latest_storable())),
            Ok(())
        );
    }

    #[test]
    fn test_validate_rejects_unstorable_run_at() {
        use chrono::TimeZone;

        let beyond = UniversalTimestamp(chrono::Utc.with_ymd_and_hms(10240, 7, 6, 10, 0, 0).unwrap());
        assert!(matches!(
            validate(&NewTask::new("ok").run_at(beyond)),
            Err(InvalidTaskError::RunAtOutOfRange(_))
        ));
    }
}
