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

pub mod agents;
pub mod enqueue;
pub mod list;
pub mod purge;
pub mod recover;
pub mod run;
pub mod show;
pub mod stats;

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use timus::{Database, TaskQueue, TimusConfig};
use tracing::debug;

/// Settings shared by every subcommand.
pub struct CommandContext {
    pub config: TimusConfig,
    database_url: String,
}

impl CommandContext {
    /// A `--database-url` given on the command line wins over the config file.
    pub fn new(config: TimusConfig, database_url: Option<String>) -> Self {
        let database_url = database_url.unwrap_or_else(|| config.database.url.clone());
        Self {
            config,
            database_url,
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Opens the task database, applying pending migrations.
    pub async fn open_queue(&self) -> Result<TaskQueue> {
        let database =
            Database::try_new(&self.database_url).context("Failed to connect to database")?;
        database
            .run_migrations()
            .await
            .context("Failed to prepare database")?;
        debug!(url = %database.url(), "Database ready");
        Ok(TaskQueue::new(database))
    }
}

/// Parse a duration string like "30d", "24h", "15m" or "1h30m".
///
/// Supported units:
/// - `d` - days
/// - `h` - hours
/// - `m` - minutes
/// - `s` - seconds
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err(anyhow!("Duration string cannot be empty"));
    }

    let mut total_secs: u64 = 0;
    let mut current_num = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            current_num.push(c);
            continue;
        }

        if current_num.is_empty() {
            return Err(anyhow!(
                "Invalid duration format: expected number before '{}'",
                c
            ));
        }

        let num: u64 = current_num
            .parse()
            .with_context(|| format!("Invalid number in duration: {}", current_num))?;
        current_num.clear();

        let unit_secs = match c {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return Err(anyhow!("Unknown duration unit: '{}'. Use d, h, m, or s", c)),
        };

        total_secs = num
            .checked_mul(unit_secs)
            .and_then(|secs| total_secs.checked_add(secs))
            .ok_or_else(|| anyhow!("Duration '{}' is too large", s))?;
    }

    if !current_num.is_empty() {
        return Err(anyhow!(
            "Duration '{}' is missing a unit. Use d (days), h (hours), m (minutes), or s (seconds)",
            s
        ));
    }

    if total_secs == 0 {
        return Err(anyhow!("Duration must be greater than zero"));
    }

    Ok(Duration::from_secs(total_secs))
}
