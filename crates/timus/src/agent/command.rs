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

//! Executor backed by an external program.
//!
//! The program receives the task description on stdin and these variables in
//! its environment:
//!
//! | Variable | Value |
//! |---|---|
//! | `TIMUS_AGENT` | agent name, e.g. `research` |
//! | `TIMUS_MODEL` | `provider/model` binding |
//! | `TIMUS_TASK_ID` | task id |
//! | `TIMUS_ATTEMPT` | 1-based attempt for this agent |
//! | `TIMUS_CONTEXT` | task metadata as a JSON object |
//!
//! Stdout is the answer. Valid JSON is returned as structured output, anything
//! else as text. A JSON object may carry an `actions` array of
//! `{"tool": name, "args": {...}}` entries; those are fed to the loop guard and
//! removed from the answer.
//!
//! The program has exited by the time its actions are replayed, so loop
//! warnings cannot reach it mid-run. Their instructions are returned instead
//! under `loop_warnings` in the structured output, one entry per repeated
//! action, for the next turn or the operator to act on.
//!
//! Exit status 75 (`EX_TEMPFAIL`) reports a transient failure and 77
//! (`EX_NOPERM`) an authentication failure. Any other non-zero status is a
//! failure whose message is the program's stderr.

use super::executor::{AgentExecutor, AgentOutput, AgentRequest};
use crate::dispatcher::AgentRun;
use crate::error::AgentFailure;
use crate::loop_guard::{Action, GuardSignal, LoopWarning};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const EX_TEMPFAIL: i32 = 75;
const EX_NOPERM: i32 = 77;

/// Longest stderr excerpt carried into a failure message.
const STDERR_EXCERPT: usize = 2000;

/// Runs one external program per attempt.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

#[async_trait]
impl AgentExecutor for CommandExecutor {
    async fn execute(
        &self,
        request: &AgentRequest,
        run: &mut AgentRun,
    ) -> Result<AgentOutput, AgentFailure> {
        let context = serde_json::to_string(&request.context)
            .map_err(|e| AgentFailure::Other(format!("Could not encode task context: {}", e)))?;

        debug!(
            task_id = %request.task_id,
            agent = %request.agent,
            program = %self.program.display(),
            "Spawning agent command"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("TIMUS_AGENT", request.agent.as_str())
            .env("TIMUS_MODEL", &request.model)
            .env("TIMUS_TASK_ID", request.task_id.to_string())
            .env("TIMUS_ATTEMPT", request.attempt.to_string())
            .env("TIMUS_CONTEXT", context)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AgentFailure::Other(format!(
                    "Failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A program that exits without reading its input closes the pipe.
            if let Err(e) = stdin.write_all(request.description.as_bytes()).await {
                debug!(error = %e, "Agent command did not read its input");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AgentFailure::Other(format!("Failed to wait for agent command: {}", e)))?;

        if !output.status.success() {
            let stderr = excerpt(&String::from_utf8_lossy(&output.stderr));
            return Err(match output.status.code() {
                Some(EX_TEMPFAIL) => AgentFailure::Network(stderr),
                Some(EX_NOPERM) => AgentFailure::Auth(stderr),
                Some(code) if stderr.is_empty() => {
                    AgentFailure::Other(format!("Agent command exited with status {}", code))
                }
                Some(_) => AgentFailure::Other(stderr),
                None => AgentFailure::Other("Agent command was terminated by a signal".to_string()),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_output(&stdout, run))
    }
}

fn parse_output(stdout: &str, run: &mut AgentRun) -> AgentOutput {
    let trimmed = stdout.trim();
    let mut value = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => value,
        Err(_) => return AgentOutput::Text(trimmed.to_string()),
    };

    if let Some(object) = value.as_object_mut() {
        if let Some(serde_json::Value::Array(actions)) = object.remove("actions") {
            let mut warnings: Vec<LoopWarning> = Vec::new();
            for entry in actions {
                let Some(tool) = entry.get("tool").and_then(|t| t.as_str()) else {
                    continue;
                };
                let args = entry
                    .get("args")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                if let GuardSignal::Looping(warning) = run.record(Action::tool_call(tool, args)) {
                    // Latest warning per action wins.
                    match warnings.iter_mut().find(|w| w.key == warning.key) {
                        Some(existing) => *existing = warning,
                        None => warnings.push(warning),
                    }
                }
            }
            if !warnings.is_empty() {
                debug!(count = warnings.len(), "Agent command repeated itself");
                let instructions: Vec<String> =
                    warnings.into_iter().map(|w| w.instruction).collect();
                object.insert("loop_warnings".to_string(), serde_json::json!(instructions));
            }
        }
    }

    AgentOutput::Structured(value)
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_EXCERPT {
        return trimmed.to_string();
    }
    let mut end = STDERR_EXCERPT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentKind;
    use crate::database::UniversalUuid;
    use crate::loop_guard::GuardConfig;
    use crate::models::TaskMetadata;
    use serde_json::json;

    fn request() -> AgentRequest {
        AgentRequest {
            task_id: UniversalUuid::new_v4(),
            agent: AgentKind::Shell,
            model: "ollama/qwen2.5:7b".to_string(),
            description: "print the uptime".to_string(),
            context: TaskMetadata::new(),
            attempt: 2,
        }
    }

    fn run() -> AgentRun {
        AgentRun::new(AgentKind::Shell, 0, 2, GuardConfig::default())
    }

    fn sh(script: &str) -> CommandExecutor {
        CommandExecutor::new("sh").with_args(["-c", script])
    }

    #[test]
    fn test_parse_output_records_actions() {
        let mut run = run();
        let stdout = r#"{"answer": 42, "actions": [
            {"tool": "click", "args": {"x": 10, "y": 20}},
            {"tool": "search", "args": {"q": "uptime"}},
            {"args": {}}
        ]}"#;

        let output = parse_output(stdout, &mut run);
        assert_eq!(output, AgentOutput::Structured(json!({"answer": 42})));
        assert_eq!(run.actions_taken(), 2);
        assert_eq!(run.actions()[0], Action::spatial("click", 10.0, 20.0));
        assert!(!run.is_looping());
    }

    #[test]
    fn test_parse_output_returns_loop_warnings() {
        let mut run = run();
        let stdout = r#"{"answer": "stuck", "actions": [
            {"tool": "open_app", "args": {"name": "Mail"}},
            {"tool": "open_app", "args": {"name": "Mail"}},
            {"tool": "open_app", "args": {"name": " Mail "}},
            {"tool": "open_app", "args": {"name": "Mail"}},
            {"tool": "open_app", "args": {"name": "Mail"}}
        ]}"#;

        let output = parse_output(stdout, &mut run);
        assert!(run.is_looping());
        let AgentOutput::Structured(value) = output else {
            panic!("expected structured output");
        };
        assert_eq!(value["answer"], json!("stuck"));
        let warnings = value["loop_warnings"].as_array().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].as_str().unwrap().contains("5 times"));
        assert!(value.get("actions").is_none());
    }

    #[test]
    fn test_parse_output_falls_back_to_text() {
        let mut run = run();
        assert_eq!(
            parse_output("  up 3 days \n", &mut run),
            AgentOutput::Text("up 3 days".to_string())
        );
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(STDERR_EXCERPT);
        let short = excerpt(&long);
        assert!(short.ends_with("..."));
        assert!(short.len() <= STDERR_EXCERPT + 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_and_environment_are_passed() {
        let executor = sh(r#"read line; echo "$TIMUS_AGENT $TIMUS_ATTEMPT $TIMUS_MODEL: $line""#);
        let output = executor.execute(&request(), &mut run()).await.unwrap();
        assert_eq!(
            output,
            AgentOutput::Text("shell 2 ollama/qwen2.5:7b: print the uptime".to_string())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_codes_map_to_failures() {
        let tempfail = sh("echo 'upstream busy' >&2; exit 75");
        assert_eq!(
            tempfail.execute(&request(), &mut run()).await,
            Err(AgentFailure::Network("upstream busy".to_string()))
        );

        let noperm = sh("echo 'token expired' >&2; exit 77");
        assert_eq!(
            noperm.execute(&request(), &mut run()).await,
            Err(AgentFailure::Auth("token expired".to_string()))
        );

        let other = sh("exit 3");
        assert_eq!(
            other.execute(&request(), &mut run()).await,
            Err(AgentFailure::Other(
                "Agent command exited with status 3".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_a_failure() {
        let executor = CommandExecutor::new("/nonexistent/timus-agent");
        match executor.execute(&request(), &mut run()).await {
            Err(AgentFailure::Other(message)) => assert!(message.contains("Failed to start")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
