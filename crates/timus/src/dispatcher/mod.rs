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

//! Agent failover dispatch.
//!
//! [`FailoverDispatcher`] runs a task on its requested agent and, when that
//! agent keeps failing in a failover-eligible way, walks the agent's static
//! fallback chain. The decision procedure per attempt is:
//!
//! 1. Resolve the executor and run it under the attempt timeout. A timeout,
//!    a panic, a raised [`AgentFailure`] or an empty answer all count as a
//!    failed attempt.
//! 2. Classify the failure. `Auth` and `ContentRejected` end dispatch at once.
//! 3. `Transient`, `RateLimited` and `Timeout` retry the same agent with
//!    exponential backoff, up to `max_attempts_per_agent` attempts.
//! 4. Anything else, or a retry budget spent on the current agent, advances to
//!    the next agent in the chain with a fresh attempt counter.
//!
//! The overall deadline spans the whole chain. When the chain is exhausted the
//! notifier is told which agents were tried and what finally went wrong.
//!
//! Executor failures never escape [`FailoverDispatcher::dispatch`]; every
//! path ends in a [`DispatchOutcome`].

mod backoff;
mod notify;
mod run;

pub use backoff::ExponentialBackoff;
pub use notify::{FailureNotice, LogNotifier, Notifier};
pub use run::AgentRun;

use crate::agent::{AgentCatalog, AgentKind, AgentOutput, AgentRequest, ExecutorRegistry};
use crate::classifier::{classify, Classification, FailureCategory};
use crate::error::AgentFailure;
use crate::loop_guard::{GuardConfig, LoopReport};
use crate::models::Task;
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Dispatcher tuning.
///
/// ```rust,ignore
/// let config = DispatchConfig::builder()
///     .max_attempts_per_agent(2)
///     .attempt_timeout(Duration::from_secs(120))
///     .build();
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct DispatchConfig {
    max_attempts_per_agent: u32,
    backoff: ExponentialBackoff,
    attempt_timeout: Duration,
    overall_deadline: Duration,
    guard: GuardConfig,
}

impl DispatchConfig {
    pub fn builder() -> DispatchConfigBuilder {
        DispatchConfigBuilder::default()
    }

    pub fn max_attempts_per_agent(&self) -> u32 {
        self.max_attempts_per_agent
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        self.backoff
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn overall_deadline(&self) -> Duration {
        self.overall_deadline
    }

    pub fn guard(&self) -> &GuardConfig {
        &self.guard
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfigBuilder::default().build()
    }
}

/// Builder for [`DispatchConfig`].
#[derive(Debug, Clone)]
pub struct DispatchConfigBuilder {
    max_attempts_per_agent: u32,
    base_delay: Duration,
    max_delay: Duration,
    attempt_timeout: Duration,
    overall_deadline: Duration,
    guard: GuardConfig,
}

impl Default for DispatchConfigBuilder {
    fn default() -> Self {
        Self {
            max_attempts_per_agent: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(600),
            overall_deadline: Duration::from_secs(1800),
            guard: GuardConfig::default(),
        }
    }
}

impl DispatchConfigBuilder {
    /// Attempts per agent before failing over. Values below 1 are raised to 1.
    pub fn max_attempts_per_agent(mut self, value: u32) -> Self {
        self.max_attempts_per_agent = value.max(1);
        self
    }

    pub fn base_delay(mut self, value: Duration) -> Self {
        self.base_delay = value;
        self
    }

    pub fn max_delay(mut self, value: Duration) -> Self {
        self.max_delay = value;
        self
    }

    pub fn attempt_timeout(mut self, value: Duration) -> Self {
        self.attempt_timeout = value;
        self
    }

    pub fn overall_deadline(mut self, value: Duration) -> Self {
        self.overall_deadline = value;
        self
    }

    pub fn guard(mut self, value: GuardConfig) -> Self {
        self.guard = value;
        self
    }

    pub fn build(self) -> DispatchConfig {
        DispatchConfig {
            max_attempts_per_agent: self.max_attempts_per_agent,
            backoff: ExponentialBackoff::new(self.base_delay, self.max_delay),
            attempt_timeout: self.attempt_timeout,
            overall_deadline: self.overall_deadline,
            guard: self.guard,
        }
    }
}

/// One executor attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub agent: AgentKind,
    pub attempt: u32,
    /// `None` for the successful attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Loop guard summary for one attempt that reported actions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptLoopReport {
    pub agent: AgentKind,
    pub attempt: u32,
    #[serde(flatten)]
    pub report: LoopReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSuccess {
    pub agent: AgentKind,
    pub output: AgentOutput,
    pub attempts: Vec<AttemptRecord>,
    pub loop_reports: Vec<AttemptLoopReport>,
}

impl DispatchSuccess {
    pub fn agents_attempted(&self) -> Vec<AgentKind> {
        distinct_agents(&self.attempts)
    }

    /// True when any attempt was flagged by the loop guard.
    pub fn loop_detected(&self) -> bool {
        self.loop_reports.iter().any(|r| r.report.looping)
    }

    /// JSON stored as the completed task's result.
    pub fn result_payload(&self) -> serde_json::Value {
        json!({
            "agent": self.agent,
            "output": self.output.to_json(),
            "agents_attempted": self.agents_attempted(),
            "attempts": self.attempts,
            "loop_guard": {
                "looping": self.loop_detected(),
                "runs": self.loop_reports,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchFailure {
    pub attempts: Vec<AttemptRecord>,
    pub agents_attempted: Vec<AgentKind>,
    pub last_error: String,
    pub classification: Classification,
    pub loop_reports: Vec<AttemptLoopReport>,
}

impl DispatchFailure {
    /// True when any attempt was flagged by the loop guard.
    pub fn loop_detected(&self) -> bool {
        self.loop_reports.iter().any(|r| r.report.looping)
    }

    /// Text stored as the failed task's error.
    pub fn error_payload(&self) -> String {
        json!({
            "category": self.classification.category,
            "message": self.last_error,
            "agents_attempted": self.agents_attempted,
            "loop_guard": {
                "looping": self.loop_detected(),
                "runs": self.loop_reports,
            },
        })
        .to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Completed(DispatchSuccess),
    Failed(DispatchFailure),
}

/// Executes tasks against agents, failing over along each agent's chain.
#[derive(Clone)]
pub struct FailoverDispatcher {
    catalog: Arc<AgentCatalog>,
    executors: ExecutorRegistry,
    notifier: Arc<dyn Notifier>,
    config: DispatchConfig,
}

impl FailoverDispatcher {
    pub fn new(
        catalog: Arc<AgentCatalog>,
        executors: ExecutorRegistry,
        notifier: Arc<dyn Notifier>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            catalog,
            executors,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    /// The task's explicit target, or the routed agent when it has none.
    pub fn resolve_agent(&self, task: &Task) -> AgentKind {
        task.target_agent
            .unwrap_or_else(|| self.catalog.route(&task.description))
    }

    /// Dispatches a task to its resolved agent.
    pub async fn dispatch(&self, task: &Task) -> DispatchOutcome {
        let requested = self.resolve_agent(task);
        self.dispatch_to(task, requested).await
    }

    /// Dispatches a task to `requested`, failing over along its chain.
    pub async fn dispatch_to(&self, task: &Task, requested: AgentKind) -> DispatchOutcome {
        let deadline = Instant::now() + self.config.overall_deadline;
        let chain = self.catalog.chain_for(requested);
        let max_attempts = self.config.max_attempts_per_agent;

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut loop_reports: Vec<AttemptLoopReport> = Vec::new();
        let mut last_failure: Option<(AgentFailure, Classification)> = None;

        info!(task_id = %task.id, agent = %requested, chain = ?chain, "Dispatching task");

        'chain: for (position, &agent) in chain.iter().enumerate() {
            if position > 0 {
                metrics::counter!("timus_dispatch_failovers_total").increment(1);
                info!(task_id = %task.id, agent = %agent, position, "Failing over to next agent");
            }

            for attempt in 1..=max_attempts {
                let now = Instant::now();
                if now >= deadline {
                    warn!(task_id = %task.id, agent = %agent, "Overall dispatch deadline exceeded");
                    let failure = AgentFailure::Timeout {
                        after: self.config.overall_deadline,
                    };
                    let classification = classify(&failure);
                    last_failure = Some((failure, classification));
                    break 'chain;
                }
                let timeout = self.config.attempt_timeout.min(deadline - now);

                let mut run = AgentRun::new(agent, position, attempt, self.config.guard.clone());
                let result = self.run_attempt(task, agent, attempt, timeout, &mut run).await;

                let report = run.loop_report();
                if report.observed > 0 {
                    loop_reports.push(AttemptLoopReport {
                        agent,
                        attempt,
                        report,
                    });
                }

                let failure = match result {
                    Ok(output) => {
                        attempts.push(AttemptRecord {
                            agent,
                            attempt,
                            category: None,
                            message: None,
                        });
                        info!(
                            task_id = %task.id,
                            agent = %agent,
                            attempt,
                            loop_detected = run.is_looping(),
                            "Agent completed task"
                        );
                        return DispatchOutcome::Completed(DispatchSuccess {
                            agent,
                            output,
                            attempts,
                            loop_reports,
                        });
                    }
                    Err(failure) => failure,
                };

                let classification = classify(&failure);
                warn!(
                    task_id = %task.id,
                    agent = %agent,
                    attempt,
                    category = %classification.category,
                    "Agent attempt failed: {}",
                    failure
                );
                attempts.push(AttemptRecord {
                    agent,
                    attempt,
                    category: Some(classification.category),
                    message: Some(failure.to_string()),
                });
                last_failure = Some((failure, classification));

                if !classification.failover_eligible {
                    break 'chain;
                }
                if !classification.category.retry_same_agent() {
                    continue 'chain;
                }
                if attempt < max_attempts {
                    let delay = self
                        .config
                        .backoff
                        .delay_with_hint(attempt - 1, classification.retry_after);
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    debug!(task_id = %task.id, agent = %agent, ?delay, "Backing off before retry");
                    tokio::time::sleep(delay.min(remaining)).await;
                }
            }
        }

        let (failure, classification) = last_failure.unwrap_or_else(|| {
            let failure = AgentFailure::Other("no attempts were made".to_string());
            let classification = classify(&failure);
            (failure, classification)
        });

        let outcome = DispatchFailure {
            agents_attempted: distinct_agents(&attempts),
            attempts,
            last_error: failure.to_string(),
            classification,
            loop_reports,
        };
        self.notify(task, &outcome).await;
        DispatchOutcome::Failed(outcome)
    }

    async fn run_attempt(
        &self,
        task: &Task,
        agent: AgentKind,
        attempt: u32,
        timeout: Duration,
        run: &mut AgentRun,
    ) -> Result<AgentOutput, AgentFailure> {
        let executor = self
            .executors
            .get(agent)
            .ok_or(AgentFailure::Unavailable(agent))?;

        let profile = self.catalog.profile(agent);
        let request = AgentRequest {
            task_id: task.id,
            agent,
            model: profile.model.to_string(),
            description: task.description.clone(),
            context: task.metadata.clone(),
            attempt,
        };

        let execution = AssertUnwindSafe(executor.execute(&request, run)).catch_unwind();
        match tokio::time::timeout(timeout, execution).await {
            Err(_) => Err(AgentFailure::Timeout { after: timeout }),
            Ok(Err(panic)) => Err(AgentFailure::Panicked(panic_message(panic.as_ref()))),
            Ok(Ok(Err(failure))) => Err(failure),
            Ok(Ok(Ok(output))) if output.is_empty() => Err(AgentFailure::EmptyResult),
            Ok(Ok(Ok(output))) => Ok(output),
        }
    }

    async fn notify(&self, task: &Task, failure: &DispatchFailure) {
        let notice = FailureNotice {
            task_id: task.id,
            description: task.description.clone(),
            agents_attempted: failure.agents_attempted.clone(),
            final_error: failure.last_error.clone(),
            classification: failure.classification,
            loop_detected: failure.loop_detected(),
        };
        if let Err(e) = self.notifier.notify_failure(&notice).await {
            warn!(task_id = %task.id, error = %e, "Failure notification was not delivered");
        }
    }
}

impl std::fmt::Debug for FailoverDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverDispatcher")
            .field("executors", &self.executors)
            .field("config", &self.config)
            .finish()
    }
}

fn distinct_agents(attempts: &[AttemptRecord]) -> Vec<AgentKind> {
    let mut agents: Vec<AgentKind> = Vec::new();
    for record in attempts {
        if !agents.contains(&record.agent) {
            agents.push(record.agent);
        }
    }
    agents
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
