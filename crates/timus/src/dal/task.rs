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

//! Task record data access.
//!
//! Key operations:
//! - Insert and read task records
//! - Atomic claiming of the next ready task ([`claiming`])
//! - Completion and failure transitions ([`state`])
//! - Reconciliation of abandoned `in_progress` tasks ([`recovery`])
//! - Retention purge of finished tasks

mod claiming;
mod recovery;
mod state;

pub use recovery::RecoveryReport;
pub use state::FailOutcome;

use super::DAL;
use crate::agent::AgentKind;
use crate::database::schema::tasks;
use crate::database::{UniversalTimestamp, UniversalUuid};
use crate::error::QueueError;
use crate::models::{Priority, QueueStats, Task, TaskMetadata, TaskStatus};
use diesel::prelude::*;

/// A `tasks` row as stored.
#[derive(Debug, Clone, Queryable, Selectable, QueryableByName, Insertable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct TaskRow {
    pub id: String,
    pub description: String,
    pub priority: i32,
    pub target_agent: Option<String>,
    pub status: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: String,
    pub run_at: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub metadata: String,
}

impl TaskRow {
    pub(crate) fn from_task(task: &Task) -> Result<Self, QueueError> {
        let metadata = serde_json::to_string(&task.metadata).map_err(|e| corrupt(&task.id, e))?;
        Ok(Self {
            id: task.id.to_storage(),
            description: task.description.clone(),
            priority: task.priority.rank(),
            target_agent: task.target_agent.map(|a| a.as_str().to_string()),
            status: task.status.as_str().to_string(),
            retry_count: to_column(task.retry_count),
            max_retries: to_column(task.max_retries),
            created_at: task.created_at.to_storage(),
            run_at: task.run_at.map(|t| t.to_storage()),
            started_at: task.started_at.map(|t| t.to_storage()),
            completed_at: task.completed_at.map(|t| t.to_storage()),
            result: task.result.as_ref().map(|r| r.to_string()),
            error: task.error.clone(),
            metadata,
        })
    }

    pub(crate) fn into_task(self) -> Result<Task, QueueError> {
        let row_id = self.id.clone();
        let bad = |message: String| QueueError::CorruptRecord {
            id: row_id.clone(),
            message,
        };

        let id: UniversalUuid = self
            .id
            .parse()
            .map_err(|e| bad(format!("invalid id: {}", e)))?;
        let priority = Priority::from_rank(self.priority)
            .ok_or_else(|| bad(format!("invalid priority rank {}", self.priority)))?;
        let status: TaskStatus = self.status.parse().map_err(bad)?;
        let target_agent = self
            .target_agent
            .as_deref()
            .map(|name| name.parse::<AgentKind>())
            .transpose()
            .map_err(|e| bad(e.to_string()))?;
        let retry_count = u32::try_from(self.retry_count)
            .map_err(|_| bad(format!("negative retry_count {}", self.retry_count)))?;
        let max_retries = u32::try_from(self.max_retries)
            .map_err(|_| bad(format!("negative max_retries {}", self.max_retries)))?;
        let parse_ts = |field: &str, value: &str| {
            UniversalTimestamp::from_rfc3339(value)
                .map_err(|e| bad(format!("invalid {} '{}': {}", field, value, e)))
        };
        let created_at = parse_ts("created_at", &self.created_at)?;
        let run_at = self
            .run_at
            .as_deref()
            .map(|v| parse_ts("run_at", v))
            .transpose()?;
        let started_at = self
            .started_at
            .as_deref()
            .map(|v| parse_ts("started_at", v))
            .transpose()?;
        let completed_at = self
            .completed_at
            .as_deref()
            .map(|v| parse_ts("completed_at", v))
            .transpose()?;
        let result = self
            .result
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()
            .map_err(|e| bad(format!("invalid result: {}", e)))?;
        let metadata: TaskMetadata = serde_json::from_str(&self.metadata)
            .map_err(|e| bad(format!("invalid metadata: {}", e)))?;

        Ok(Task {
            id,
            description: self.description,
            priority,
            target_agent,
            status,
            retry_count,
            max_retries,
            created_at,
            run_at,
            started_at,
            completed_at,
            result,
            error: self.error,
            metadata,
        })
    }
}

fn to_column(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn corrupt(id: &UniversalUuid, e: impl std::fmt::Display) -> QueueError {
    QueueError::CorruptRecord {
        id: id.to_string(),
        message: e.to_string(),
    }
}

/// Data access for the `tasks` table.
#[derive(Clone)]
pub struct TaskDAL<'a> {
    dal: &'a DAL,
}

impl<'a> TaskDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    async fn connection(
        &self,
    ) -> Result<deadpool::managed::Object<deadpool_diesel::sqlite::Manager>, QueueError> {
        self.dal
            .database
            .get_connection()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))
    }

    /// Inserts a fully formed task record.
    pub async fn create(&self, task: &Task) -> Result<(), QueueError> {
        let row = TaskRow::from_task(task)?;
        let conn = self.connection().await?;

        conn.interact(move |conn| {
            diesel::insert_into(tasks::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    pub async fn get_by_id(&self, id: UniversalUuid) -> Result<Option<Task>, QueueError> {
        let conn = self.connection().await?;
        let key = id.to_storage();

        let row: Option<TaskRow> = conn
            .interact(move |conn| {
                tasks::table
                    .find(key)
                    .select(TaskRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        row.map(TaskRow::into_task).transpose()
    }

    /// Lists tasks in claim order (priority, then age), optionally filtered
    /// by status.
    pub async fn list(
        &self,
        status: Option<TaskStatus>,
        limit: i64,
    ) -> Result<Vec<Task>, QueueError> {
        let conn = self.connection().await?;
        let status = status.map(|s| s.as_str().to_string());

        let rows: Vec<TaskRow> = conn
            .interact(move |conn| {
                let mut query = tasks::table
                    .select(TaskRow::as_select())
                    .order((tasks::priority.asc(), tasks::created_at.asc(), tasks::id.asc()))
                    .limit(limit)
                    .into_boxed();
                if let Some(status) = status {
                    query = query.filter(tasks::status.eq(status));
                }
                query.load(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let conn = self.connection().await?;

        let counts: Vec<(String, i64)> = conn
            .interact(|conn| {
                tasks::table
                    .group_by(tasks::status)
                    .select((tasks::status, diesel::dsl::count_star()))
                    .load(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        let mut stats = QueueStats::default();
        for (status, count) in counts {
            let count = u64::try_from(count).unwrap_or(0);
            match status.parse::<TaskStatus>() {
                Ok(TaskStatus::Pending) => stats.pending = count,
                Ok(TaskStatus::InProgress) => stats.in_progress = count,
                Ok(TaskStatus::Completed) => stats.completed = count,
                Ok(TaskStatus::Failed) => stats.failed = count,
                Err(message) => {
                    return Err(QueueError::CorruptRecord {
                        id: "*".to_string(),
                        message,
                    })
                }
            }
        }
        Ok(stats)
    }

    /// Counts terminal tasks finished before `cutoff`.
    pub async fn count_finished_before(
        &self,
        cutoff: UniversalTimestamp,
    ) -> Result<u64, QueueError> {
        let conn = self.connection().await?;
        let cutoff = cutoff.to_storage();

        let count: i64 = conn
            .interact(move |conn| {
                tasks::table
                    .filter(tasks::status.eq_any(terminal_statuses()))
                    .filter(tasks::completed_at.lt(cutoff))
                    .count()
                    .get_result(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Deletes terminal tasks finished before `cutoff`. Returns the number
    /// of deleted rows.
    pub async fn purge_finished_before(
        &self,
        cutoff: UniversalTimestamp,
    ) -> Result<usize, QueueError> {
        let conn = self.connection().await?;
        let cutoff = cutoff.to_storage();

        let deleted = conn
            .interact(move |conn| {
                diesel::delete(
                    tasks::table
                        .filter(tasks::status.eq_any(terminal_statuses()))
                        .filter(tasks::completed_at.lt(cutoff)),
                )
                .execute(conn)
            })
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))??;

        Ok(deleted)
    }
}

fn terminal_statuses() -> [&'static str; 2] {
    [TaskStatus::Completed.as_str(), TaskStatus::Failed.as_str()]
}
