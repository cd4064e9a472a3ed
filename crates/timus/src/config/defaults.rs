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

use crate::config::types::*;
use crate::loop_guard::GuardConfig;
use std::collections::BTreeMap;

impl Default for TimusConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            runner: RunnerSection::default(),
            dispatch: DispatchSection::default(),
            loop_guard: GuardConfig::default(),
            agents: BTreeMap::new(),
            executor: ExecutorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://timus.db".to_string(),
        }
    }
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 15 * 60,
            enable_recovery: true,
            stale_task_threshold_secs: 30 * 60,
            retry_base_delay_secs: 30,
            retry_max_delay_secs: 15 * 60,
        }
    }
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_attempts_per_agent: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            attempt_timeout_secs: 10 * 60,
            overall_deadline_secs: 30 * 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
