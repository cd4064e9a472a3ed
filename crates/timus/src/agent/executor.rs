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

//! The agent executor capability.
//!
//! An executor is whatever actually does the work for an agent: an LLM tool
//! loop, a subprocess, a remote call. The dispatcher only needs it to return an
//! [`AgentOutput`] or raise a classifiable [`AgentFailure`], and to report the
//! actions it takes through the [`AgentRun`] it is handed so the loop guard can
//! watch for repetition.

use super::AgentKind;
use crate::database::UniversalUuid;
use crate::dispatcher::AgentRun;
use crate::error::AgentFailure;
use crate::models::TaskMetadata;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything an executor is told about one attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRequest {
    pub task_id: UniversalUuid,
    pub agent: AgentKind,
    /// `provider/model` the agent is bound to.
    pub model: String,
    pub description: String,
    pub context: TaskMetadata,
    /// 1-based attempt number for this agent.
    pub attempt: u32,
}

/// A successful executor result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AgentOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl AgentOutput {
    /// True for answers that carry nothing: blank text, `null`, `false`, and
    /// empty strings, arrays or objects.
    pub fn is_empty(&self) -> bool {
        match self {
            AgentOutput::Text(text) => text.trim().is_empty(),
            AgentOutput::Structured(value) => match value {
                serde_json::Value::Null => true,
                serde_json::Value::Bool(b) => !b,
                serde_json::Value::String(s) => s.trim().is_empty(),
                serde_json::Value::Array(items) => items.is_empty(),
                serde_json::Value::Object(map) => map.is_empty(),
                serde_json::Value::Number(_) => false,
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AgentOutput::Text(text) => serde_json::Value::String(text.clone()),
            AgentOutput::Structured(value) => value.clone(),
        }
    }
}

impl From<String> for AgentOutput {
    fn from(text: String) -> Self {
        AgentOutput::Text(text)
    }
}

impl From<&str> for AgentOutput {
    fn from(text: &str) -> Self {
        AgentOutput::Text(text.to_string())
    }
}

/// Executes a task on behalf of one agent.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Runs one attempt. Actions taken during the attempt should be reported
    /// with [`AgentRun::record`], which returns loop-guard advice.
    async fn execute(
        &self,
        request: &AgentRequest,
        run: &mut AgentRun,
    ) -> Result<AgentOutput, AgentFailure>;
}

/// Binds executors to agent kinds.
///
/// An agent without its own executor uses the default executor when one is
/// set. Otherwise a lookup yields `None` and the dispatcher records the attempt
/// as [`AgentFailure::Unavailable`].
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<AgentKind, Arc<dyn AgentExecutor>>,
    default: Option<Arc<dyn AgentExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor for one agent, replacing any previous binding.
    pub fn register(mut self, agent: AgentKind, executor: Arc<dyn AgentExecutor>) -> Self {
        self.executors.insert(agent, executor);
        self
    }

    /// Sets the executor used by agents without their own binding.
    pub fn with_default(mut self, executor: Arc<dyn AgentExecutor>) -> Self {
        self.default = Some(executor);
        self
    }

    pub fn get(&self, agent: AgentKind) -> Option<Arc<dyn AgentExecutor>> {
        self.executors
            .get(&agent)
            .cloned()
            .or_else(|| self.default.clone())
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut bound: Vec<_> = self.executors.keys().map(|k| k.as_str()).collect();
        bound.sort_unstable();
        f.debug_struct("ExecutorRegistry")
            .field("bound", &bound)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}
