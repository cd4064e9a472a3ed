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

//! # Error Types
//!
//! Error enums for each layer of the crate:
//!
//! - [`InvalidTaskError`]: malformed enqueue input, rejected before anything is stored
//! - [`QueueError`]: storage and lifecycle errors from the task queue
//! - [`AgentFailure`]: failures raised by agent executors, fed to the classifier
//! - [`NotifyError`]: failures of the notification capability (logged, never fatal)
//! - [`RunnerError`]: errors that stop the runner from starting
//!
//! Configuration errors live in [`crate::config::ConfigError`] and database
//! setup errors in [`crate::database::DatabaseError`].

use crate::agent::AgentKind;
use crate::database::UniversalUuid;
use std::time::Duration;
use thiserror::Error;

/// Malformed input to `enqueue`. Nothing is persisted when this is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidTaskError {
    #[error("Task description must not be empty")]
    EmptyDescription,

    #[error("Task description is {len} bytes (max {max})")]
    DescriptionTooLong { len: usize, max: usize },

    #[error("max_retries {requested} exceeds the limit of {max}")]
    RetryBudgetTooLarge { requested: u32, max: u32 },

    #[error("Invalid task metadata: {0}")]
    InvalidMetadata(String),

    #[error("run_at {0} is outside the supported range (years 0 to 9999)")]
    RunAtOutOfRange(String),
}

/// Errors from task queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Invalid task: {0}")]
    InvalidTask(#[from] InvalidTaskError),

    #[error("Task not found: {0}")]
    NotFound(UniversalUuid),

    #[error("Corrupt task record {id}: {message}")]
    CorruptRecord { id: String, message: String },
}

/// A failure raised by an agent executor for one attempt.
///
/// The variants carry exactly what the classifier needs; free-form messages go
/// in [`AgentFailure::Other`] and are classified by keyword.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AgentFailure {
    #[error("Attempt timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Content rejected: {0}")]
    ContentRejected(String),

    #[error("Tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    #[error("Executor returned an empty result")]
    EmptyResult,

    #[error("No executor is registered for agent '{0}'")]
    Unavailable(AgentKind),

    #[error("Executor panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

/// The notification capability failed. Logged and swallowed by callers.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Errors that prevent the runner from starting.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Startup recovery failed: {0}")]
    Recovery(#[source] QueueError),
}
