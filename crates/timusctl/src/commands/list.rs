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

//! Implementation of the `list` command.

use super::CommandContext;
use anyhow::{Context, Result};
use timus::{Task, TaskStatus};

pub async fn run(ctx: &CommandContext, status: Option<TaskStatus>, limit: usize) -> Result<()> {
    let queue = ctx.open_queue().await?;
    let tasks = queue
        .list(status, limit)
        .await
        .context("Failed to list tasks")?;

    if tasks.is_empty() {
        println!("No tasks found");
        return Ok(());
    }

    println!(
        "{:<36}  {:<11}  {:<8}  {:<10}  {:>7}  DESCRIPTION",
        "ID", "STATUS", "PRIORITY", "AGENT", "RETRIES"
    );
    for task in &tasks {
        println!("{}", format_row(task));
    }
    Ok(())
}

fn format_row(task: &Task) -> String {
    let agent = task
        .target_agent
        .map(|a| a.as_str())
        .unwrap_or("-");
    format!(
        "{:<36}  {:<11}  {:<8}  {:<10}  {:>7}  {}",
        task.id,
        task.status.as_str(),
        task.priority.as_str(),
        agent,
        format!("{}/{}", task.retry_count, task.max_retries),
        summarize(&task.description, 60)
    )
}

/// First line of `text`, cut to `max` characters.
fn summarize(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}
