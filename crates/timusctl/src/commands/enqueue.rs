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

//! Implementation of the `enqueue` command.

use super::{parse_duration, CommandContext};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use timus::agent::AgentKind;
use timus::models::TaskMetadata;
use timus::{NewTask, Priority, UniversalTimestamp};
use tracing::info;

pub struct EnqueueArgs {
    pub description: String,
    pub priority: Priority,
    pub agent: Option<AgentKind>,
    pub delay: Option<String>,
    pub run_at: Option<String>,
    pub max_retries: u32,
    pub meta: Vec<String>,
}

pub async fn run(ctx: &CommandContext, args: EnqueueArgs) -> Result<()> {
    let new_task = build_task(args)?;
    let queue = ctx.open_queue().await?;

    let id = queue
        .enqueue(new_task)
        .await
        .context("Failed to enqueue task")?;

    info!(task_id = %id, "Task enqueued");
    println!("{}", id);
    Ok(())
}

fn build_task(args: EnqueueArgs) -> Result<NewTask> {
    let mut task = NewTask::new(args.description)
        .priority(args.priority)
        .max_retries(args.max_retries)
        .metadata(parse_metadata(&args.meta)?);

    if let Some(agent) = args.agent {
        task = task.target_agent(agent);
    }

    if let Some(delay) = &args.delay {
        let delay =
            parse_duration(delay).with_context(|| format!("Invalid delay: '{}'", delay))?;
        task = task.run_at(UniversalTimestamp::now().plus(delay));
    } else if let Some(run_at) = &args.run_at {
        let run_at = UniversalTimestamp::from_rfc3339(run_at)
            .with_context(|| format!("Invalid --run-at timestamp: '{}'", run_at))?;
        task = task.run_at(run_at);
    }

    Ok(task)
}

/// Parses `key=value` entries. Values that parse as JSON are stored as JSON,
/// anything else as a string.
fn parse_metadata(entries: &[String]) -> Result<TaskMetadata> {
    let mut metadata = TaskMetadata::new();
    for entry in entries {
        let (key, raw) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("Metadata entry '{}' must look like key=value", entry))?;
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        metadata.insert(key.trim().to_string(), value);
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(description: &str) -> EnqueueArgs {
        EnqueueArgs {
            description: description.to_string(),
            priority: Priority::Normal,
            agent: None,
            delay: None,
            run_at: None,
            max_retries: 3,
            meta: Vec::new(),
        }
    }

    #[test]
    fn test_metadata_values() {
        let metadata = parse_metadata(&[
            "source=scheduler".to_string(),
            "attempt=2".to_string(),
            "tags=[\"daily\"]".to_string(),
            "note=a=b".to_string(),
        ])
        .unwrap();

        assert_eq!(metadata["source"], json!("scheduler"));
        assert_eq!(metadata["attempt"], json!(2));
        assert_eq!(metadata["tags"], json!(["daily"]));
        assert_eq!(metadata["note"], json!("a=b"));
    }

    #[test]
    fn test_metadata_requires_separator() {
        assert!(parse_metadata(&["missing".to_string()]).is_err());
    }

    #[test]
    fn test_delay_sets_run_at_in_the_future() {
        let before = UniversalTimestamp::now();
        let task = build_task(EnqueueArgs {
            delay: Some("15m".to_string()),
            ..args("check the backup")
        })
        .unwrap();

        let run_at = task.run_at.unwrap();
        assert!(run_at.0 >= before.0 + chrono::Duration::minutes(15));
    }

    #[test]
    fn test_explicit_run_at_and_agent() {
        let task = build_task(EnqueueArgs {
            run_at: Some("2030-01-01T08:00:00Z".to_string()),
            agent: Some(AgentKind::Research),
            priority: Priority::High,
            ..args("morning briefing")
        })
        .unwrap();

        assert_eq!(task.run_at.unwrap().to_storage(), "2030-01-01T08:00:00.000000Z");
        assert_eq!(task.target_agent, Some(AgentKind::Research));
        assert_eq!(task.priority, Priority::High);

        assert!(build_task(EnqueueArgs {
            run_at: Some("tomorrow".to_string()),
            ..args("x")
        })
        .is_err());
    }
}
