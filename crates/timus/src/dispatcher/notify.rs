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

//! Operator notification on total dispatch failure.

use crate::agent::AgentKind;
use crate::classifier::Classification;
use crate::database::UniversalUuid;
use crate::error::NotifyError;
use async_trait::async_trait;
use serde::Serialize;
use tracing::error;

/// What the operator is told when every agent in a chain has failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureNotice {
    pub task_id: UniversalUuid,
    pub description: String,
    pub agents_attempted: Vec<AgentKind>,
    pub final_error: String,
    pub classification: Classification,
    /// Whether the loop guard flagged any attempt.
    pub loop_detected: bool,
}

/// Best-effort notification sink.
///
/// Errors are logged by the caller and never affect the task outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_failure(&self, notice: &FailureNotice) -> Result<(), NotifyError>;
}

/// Writes failure notices to the log at `error` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_failure(&self, notice: &FailureNotice) -> Result<(), NotifyError> {
        let attempted: Vec<&str> = notice.agents_attempted.iter().map(|a| a.as_str()).collect();
        error!(
            task_id = %notice.task_id,
            agents = ?attempted,
            category = %notice.classification.category,
            loop_detected = notice.loop_detected,
            "Task failed on every agent: {}",
            notice.final_error
        );
        Ok(())
    }
}
