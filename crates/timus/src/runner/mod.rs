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

//! The runner loop.
//!
//! On each wake the runner claims at most one task, dispatches it and records
//! the outcome in the queue. It wakes on a heartbeat and whenever a
//! [`RunnerHandle`] triggers it.
//!
//! ```rust,ignore
//! let runner = Runner::new(queue, dispatcher, RunnerConfig::default());
//! let handle = runner.handle();
//! tokio::spawn(async move { runner.run().await });
//!
//! handle.trigger();   // a task was just enqueued
//! handle.shutdown();  // stop after the current pass
//! ```

mod config;
mod wakeup;

pub use config::{RunnerConfig, RunnerConfigBuilder};
pub use wakeup::WakeReason;

use crate::dal::FailOutcome;
use crate::database::{UniversalTimestamp, UniversalUuid};
use crate::dispatcher::{DispatchOutcome, ExponentialBackoff, FailoverDispatcher};
use crate::error::RunnerError;
use crate::queue::TaskQueue;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use wakeup::Wakeup;

/// What one pass of the runner did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No task was ready.
    Idle,
    Completed(UniversalUuid),
    Requeued(UniversalUuid),
    Failed(UniversalUuid),
    /// The pass could not record its work. The loop keeps going.
    Error(String),
}

/// Cloneable control handle for a running [`Runner`].
#[derive(Debug, Clone)]
pub struct RunnerHandle {
    wakeup: Arc<Wakeup>,
}

impl RunnerHandle {
    /// Wakes the runner for an immediate pass.
    pub fn trigger(&self) {
        self.wakeup.trigger();
    }

    /// Stops the loop once the current pass finishes.
    pub fn shutdown(&self) {
        self.wakeup.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.wakeup.is_shutdown()
    }
}

/// Claims, dispatches and settles tasks one at a time.
pub struct Runner {
    queue: TaskQueue,
    dispatcher: FailoverDispatcher,
    config: RunnerConfig,
    retry_backoff: ExponentialBackoff,
    wakeup: Arc<Wakeup>,
}

impl Runner {
    pub fn new(queue: TaskQueue, dispatcher: FailoverDispatcher, config: RunnerConfig) -> Self {
        let retry_backoff =
            ExponentialBackoff::new(config.retry_base_delay(), config.retry_max_delay());
        Self {
            queue,
            dispatcher,
            config,
            retry_backoff,
            wakeup: Arc::new(Wakeup::new()),
        }
    }

    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            wakeup: self.wakeup.clone(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs startup reconciliation, then loops until shut down.
    ///
    /// Only a failed reconciliation is returned as an error; failures inside
    /// a pass are logged and the loop continues.
    pub async fn run(&self) -> Result<(), RunnerError> {
        if self.config.enable_recovery() {
            let report = self
                .queue
                .recover_stale(self.config.stale_task_threshold())
                .await
                .map_err(RunnerError::Recovery)?;
            info!(
                requeued = report.requeued.len(),
                abandoned = report.abandoned.len(),
                "Startup reconciliation finished"
            );
        }

        info!(
            heartbeat = ?self.config.heartbeat_interval(),
            "Runner started"
        );

        while !self.wakeup.is_shutdown() {
            let outcome = self.tick().await;
            debug!(?outcome, "Runner pass finished");

            if self.wakeup.wait(self.config.heartbeat_interval()).await == WakeReason::Shutdown {
                break;
            }
        }

        info!("Runner stopped");
        Ok(())
    }

    /// One pass: claim at most one task, dispatch it and record the outcome.
    pub async fn tick(&self) -> TickOutcome {
        let task = match self.queue.claim_next().await {
            Ok(Some(task)) => task,
            Ok(None) => return TickOutcome::Idle,
            Err(e) => {
                error!(error = %e, "Failed to claim next task");
                return TickOutcome::Error(e.to_string());
            }
        };

        info!(
            task_id = %task.id,
            priority = %task.priority,
            retry_count = task.retry_count,
            "Processing task"
        );

        match self.dispatcher.dispatch(&task).await {
            DispatchOutcome::Completed(success) => {
                match self.queue.complete(task.id, &success.result_payload()).await {
                    Ok(true) => TickOutcome::Completed(task.id),
                    Ok(false) => TickOutcome::Error(format!(
                        "task {} was no longer in_progress when it completed",
                        task.id
                    )),
                    Err(e) => {
                        error!(task_id = %task.id, error = %e, "Failed to record completion");
                        TickOutcome::Error(e.to_string())
                    }
                }
            }
            DispatchOutcome::Failed(failure) => {
                let retry_at = (failure.classification.retriable && task.has_retry_budget())
                    .then(|| {
                        UniversalTimestamp::now().plus(self.retry_backoff.delay(task.retry_count))
                    });

                match self
                    .queue
                    .fail(
                        task.id,
                        &failure.error_payload(),
                        failure.classification,
                        retry_at,
                    )
                    .await
                {
                    Ok(FailOutcome::Requeued { .. }) => TickOutcome::Requeued(task.id),
                    Ok(FailOutcome::Failed) => TickOutcome::Failed(task.id),
                    Ok(FailOutcome::Ignored) => TickOutcome::Error(format!(
                        "task {} was no longer in_progress when it failed",
                        task.id
                    )),
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "Failed to record failure");
                        TickOutcome::Error(e.to_string())
                    }
                }
            }
        }
    }
}
