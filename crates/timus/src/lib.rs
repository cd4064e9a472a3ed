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

//! # Timus
//!
//! Durable task queue and failover agent dispatch for the Timus assistant.
//!
//! ## Components
//!
//! - [`queue`]: persistent, priority-ordered queue with exactly-once claiming
//!   and bounded retries, stored in SQLite.
//! - [`classifier`]: maps agent failures onto a fixed set of categories that
//!   drive retry and failover decisions.
//! - [`dispatcher`]: runs a task against an agent, retrying with backoff and
//!   walking the agent's fallback chain until one succeeds.
//! - [`loop_guard`]: watches the actions an agent takes and flags runs that
//!   repeat themselves.
//! - [`runner`]: the claim/dispatch/settle loop that ties the pieces together.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use timus::agent::{AgentCatalog, CommandExecutor, ExecutorRegistry};
//! use timus::dispatcher::{DispatchConfig, FailoverDispatcher, LogNotifier};
//! use timus::{Database, NewTask, Runner, RunnerConfig, TaskQueue};
//!
//! let database = Database::try_new("sqlite:///var/lib/timus/tasks.db")?;
//! database.run_migrations().await?;
//! let queue = TaskQueue::new(database);
//! queue.enqueue(NewTask::new("summarize today's log")).await?;
//!
//! let executors = ExecutorRegistry::new()
//!     .with_default(Arc::new(CommandExecutor::new("/usr/local/bin/timus-agent")));
//! let dispatcher = FailoverDispatcher::new(
//!     Arc::new(AgentCatalog::default()),
//!     executors,
//!     Arc::new(LogNotifier),
//!     DispatchConfig::default(),
//! );
//! Runner::new(queue, dispatcher, RunnerConfig::default()).run().await?;
//! ```

pub mod agent;
pub mod classifier;
pub mod config;
pub mod dal;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod loop_guard;
pub mod models;
pub mod queue;
pub mod runner;

pub use agent::{AgentCatalog, AgentExecutor, AgentKind, AgentOutput, ExecutorRegistry};
pub use classifier::{classify, Classification, FailureCategory};
pub use config::{ConfigLoader, TimusConfig};
pub use database::{Database, UniversalTimestamp, UniversalUuid};
pub use dispatcher::{DispatchConfig, DispatchOutcome, FailoverDispatcher, Notifier};
pub use error::{AgentFailure, InvalidTaskError, QueueError, RunnerError};
pub use loop_guard::{Action, GuardConfig, LoopGuard};
pub use models::{NewTask, Priority, QueueStats, Task, TaskStatus};
pub use queue::TaskQueue;
pub use runner::{Runner, RunnerConfig, RunnerHandle, TickOutcome};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence, then `level`, then `info`. Calling this more
/// than once leaves the first subscriber in place.
pub fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init();
}
