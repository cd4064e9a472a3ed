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

//! Configuration types for the [`Runner`](super::Runner).

use std::time::Duration;

/// Configuration for the runner loop.
///
/// # Construction
///
/// ```rust,ignore
/// let config = RunnerConfig::builder()
///     .heartbeat_interval(Duration::from_secs(60))
///     .enable_recovery(false)
///     .build();
/// ```
///
/// Or use the defaults:
///
/// ```rust,ignore
/// let config = RunnerConfig::default();
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RunnerConfig {
    heartbeat_interval: Duration,
    enable_recovery: bool,
    stale_task_threshold: Duration,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
}

impl RunnerConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::default()
    }

    /// How long the runner sleeps between passes when nothing triggers it.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Whether stale `in_progress` tasks are reconciled at startup.
    pub fn enable_recovery(&self) -> bool {
        self.enable_recovery
    }

    /// Age after which an `in_progress` task counts as abandoned.
    pub fn stale_task_threshold(&self) -> Duration {
        self.stale_task_threshold
    }

    /// Queue-level backoff before the first retry of a failed task.
    pub fn retry_base_delay(&self) -> Duration {
        self.retry_base_delay
    }

    /// Upper bound for queue-level retry backoff.
    pub fn retry_max_delay(&self) -> Duration {
        self.retry_max_delay
    }
}

/// Builder for [`RunnerConfig`].
#[derive(Debug, Clone)]
pub struct RunnerConfigBuilder {
    config: RunnerConfig,
}

impl Default for RunnerConfigBuilder {
    fn default() -> Self {
        Self {
            config: RunnerConfig {
                heartbeat_interval: Duration::from_secs(15 * 60),
                enable_recovery: true,
                stale_task_threshold: Duration::from_secs(30 * 60),
                retry_base_delay: Duration::from_secs(30),
                retry_max_delay: Duration::from_secs(15 * 60),
            },
        }
    }
}

impl RunnerConfigBuilder {
    pub fn heartbeat_interval(mut self, value: Duration) -> Self {
        self.config.heartbeat_interval = value;
        self
    }

    pub fn enable_recovery(mut self, value: bool) -> Self {
        self.config.enable_recovery = value;
        self
    }

    pub fn stale_task_threshold(mut self, value: Duration) -> Self {
        self.config.stale_task_threshold = value;
        self
    }

    pub fn retry_base_delay(mut self, value: Duration) -> Self {
        self.config.retry_base_delay = value;
        self
    }

    pub fn retry_max_delay(mut self, value: Duration) -> Self {
        self.config.retry_max_delay = value;
        self
    }

    pub fn build(self) -> RunnerConfig {
        self.config
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfigBuilder::default().build()
    }
}
