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

use crate::agent::AgentCatalog;
use crate::config::{types::*, ValidationError};
use crate::loop_guard::GuardConfig;

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for TimusConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = self.database.validate() {
            errors.push(e);
        }
        if let Err(e) = self.runner.validate() {
            errors.push(e);
        }
        if let Err(e) = self.dispatch.validate() {
            errors.push(e);
        }
        if let Err(e) = self.loop_guard.validate() {
            errors.push(e);
        }
        if let Err(e) = self.logging.validate() {
            errors.push(e);
        }
        if let Err(e) = AgentCatalog::with_overrides(&self.agents) {
            errors.push(ValidationError::InvalidAgent(e));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple { errors }),
        }
    }
}

impl Validate for DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let url = self.url.trim();
        let path = url.strip_prefix("sqlite://").unwrap_or(url);
        if path.is_empty() || path.contains("://") {
            return Err(ValidationError::InvalidDatabaseUrl {
                url: self.url.clone(),
            });
        }
        Ok(())
    }
}

impl Validate for RunnerSection {
    fn validate(&self) -> Result<(), ValidationError> {
        let intervals = [
            ("runner.heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("runner.stale_task_threshold_secs", self.stale_task_threshold_secs),
            ("runner.retry_base_delay_secs", self.retry_base_delay_secs),
            ("runner.retry_max_delay_secs", self.retry_max_delay_secs),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ValidationError::InvalidInterval { field, value });
            }
        }
        Ok(())
    }
}

impl Validate for DispatchSection {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts_per_agent == 0 {
            return Err(ValidationError::InvalidSetting {
                field: "dispatch.max_attempts_per_agent",
                message: "must be at least 1".to_string(),
            });
        }
        let intervals = [
            ("dispatch.attempt_timeout_secs", self.attempt_timeout_secs),
            ("dispatch.overall_deadline_secs", self.overall_deadline_secs),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ValidationError::InvalidInterval { field, value });
            }
        }
        Ok(())
    }
}

impl Validate for GuardConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.window_size == 0 {
            return Err(ValidationError::InvalidSetting {
                field: "loop_guard.window_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.repeat_threshold == 0 {
            return Err(ValidationError::InvalidSetting {
                field: "loop_guard.repeat_threshold",
                message: "must be at least 1".to_string(),
            });
        }
        if !self.coordinate_tolerance.is_finite() || self.coordinate_tolerance <= 0.0 {
            return Err(ValidationError::InvalidSetting {
                field: "loop_guard.coordinate_tolerance",
                message: format!("{} is not a positive number", self.coordinate_tolerance),
            });
        }
        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            _ => Err(ValidationError::InvalidLogLevel {
                level: self.level.clone(),
            }),
        }
    }
}
