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

use crate::agent::{AgentCatalog, CommandExecutor};
use crate::config::ConfigError;
use crate::dispatcher::DispatchConfig;
use crate::loop_guard::GuardConfig;
use crate::runner::RunnerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimusConfig {
    pub database: DatabaseConfig,
    pub runner: RunnerSection,
    pub dispatch: DispatchSection,
    pub loop_guard: GuardConfig,
    /// Per-agent overrides keyed by agent name.
    pub agents: BTreeMap<String, AgentOverride>,
    pub executor: ExecutorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    pub heartbeat_interval_secs: u64,
    pub enable_recovery: bool,
    pub stale_task_threshold_secs: u64,
    pub retry_base_delay_secs: u64,
    pub retry_max_delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    pub max_attempts_per_agent: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempt_timeout_secs: u64,
    pub overall_deadline_secs: u64,
}

/// `[agents.<name>]` section. Unset fields keep the agent's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallbacks: Option<Vec<String>>,
}

/// External program used as the agent executor by `timusctl run`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl TimusConfig {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::builder()
            .heartbeat_interval(Duration::from_secs(self.runner.heartbeat_interval_secs))
            .enable_recovery(self.runner.enable_recovery)
            .stale_task_threshold(Duration::from_secs(self.runner.stale_task_threshold_secs))
            .retry_base_delay(Duration::from_secs(self.runner.retry_base_delay_secs))
            .retry_max_delay(Duration::from_secs(self.runner.retry_max_delay_secs))
            .build()
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::builder()
            .max_attempts_per_agent(self.dispatch.max_attempts_per_agent)
            .base_delay(Duration::from_millis(self.dispatch.base_delay_ms))
            .max_delay(Duration::from_millis(self.dispatch.max_delay_ms))
            .attempt_timeout(Duration::from_secs(self.dispatch.attempt_timeout_secs))
            .overall_deadline(Duration::from_secs(self.dispatch.overall_deadline_secs))
            .guard(self.loop_guard.clone())
            .build()
    }

    /// Agent catalog with the configured overrides applied.
    pub fn agent_catalog(&self) -> Result<AgentCatalog, ConfigError> {
        Ok(AgentCatalog::with_overrides(&self.agents)?)
    }

    /// The configured command executor, if a program is set.
    pub fn command_executor(&self) -> Option<CommandExecutor> {
        self.executor
            .program
            .as_ref()
            .map(|program| CommandExecutor::new(program.clone()).with_args(self.executor.args.clone()))
    }
}
