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

//! Failure classification.
//!
//! [`classify`] maps an [`AgentFailure`] to a [`FailureCategory`] and the
//! retry/failover policy bits derived from it. It is a pure function of the
//! failure value: no I/O, no clock, no state.
//!
//! | Category           | retriable | same-agent retry | failover |
//! |--------------------|-----------|------------------|----------|
//! | `Transient`        | yes       | yes              | yes      |
//! | `RateLimited`      | yes       | yes              | yes      |
//! | `Timeout`          | yes       | yes              | yes      |
//! | `ToolFailure`      | yes       | no               | yes      |
//! | `Unknown`          | yes       | no               | yes      |
//! | `Auth`             | no        | no               | no       |
//! | `ContentRejected`  | no        | no               | no       |

use crate::error::AgentFailure;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Transient,
    RateLimited,
    Auth,
    ContentRejected,
    Timeout,
    ToolFailure,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureCategory::Transient => "transient",
            FailureCategory::RateLimited => "rate_limited",
            FailureCategory::Auth => "auth",
            FailureCategory::ContentRejected => "content_rejected",
            FailureCategory::Timeout => "timeout",
            FailureCategory::ToolFailure => "tool_failure",
            FailureCategory::Unknown => "unknown",
        }
    }

    /// Whether the queue may requeue a task that failed this way.
    pub fn is_retriable(self) -> bool {
        !matches!(self, FailureCategory::Auth | FailureCategory::ContentRejected)
    }

    /// Whether the same agent should be tried again after backoff.
    pub fn retry_same_agent(self) -> bool {
        matches!(
            self,
            FailureCategory::Transient | FailureCategory::RateLimited | FailureCategory::Timeout
        )
    }

    /// Whether the dispatcher may move on to the next agent in the chain.
    pub fn is_failover_eligible(self) -> bool {
        self.is_retriable()
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: FailureCategory,
    pub retriable: bool,
    pub failover_eligible: bool,
    /// Server-provided delay hint, when the failure carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
}

impl Classification {
    pub fn of(category: FailureCategory) -> Self {
        Self {
            category,
            retriable: category.is_retriable(),
            failover_eligible: category.is_failover_eligible(),
            retry_after: None,
        }
    }

    fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

impl From<FailureCategory> for Classification {
    fn from(category: FailureCategory) -> Self {
        Classification::of(category)
    }
}

const AUTH_PATTERNS: &[&str] = &[
    "unauthorized",
    "invalid api key",
    "invalid_api_key",
    "authentication",
    "permission denied",
    "forbidden",
    "credential",
];

const CONTENT_PATTERNS: &[&str] = &[
    "content policy",
    "content_policy",
    "content filter",
    "safety system",
    "flagged",
    "policy violation",
    "refused",
];

const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "too many requests",
    "quota",
    "overloaded",
];

const TIMEOUT_PATTERNS: &[&str] = &["timeout", "timed out", "deadline exceeded"];

const TRANSIENT_PATTERNS: &[&str] = &[
    "connection",
    "network",
    "temporary",
    "temporarily",
    "unavailable",
    "reset by peer",
    "broken pipe",
    "try again",
];

const TOOL_PATTERNS: &[&str] = &["tool", "mcp", "json-rpc", "jsonrpc"];

/// Maps an executor failure to its classification.
pub fn classify(failure: &AgentFailure) -> Classification {
    match failure {
        AgentFailure::Timeout { .. } => FailureCategory::Timeout.into(),
        AgentFailure::RateLimited { retry_after, .. } => {
            Classification::of(FailureCategory::RateLimited).with_retry_after(*retry_after)
        }
        AgentFailure::Http { status, message } => classify_status(*status, message).into(),
        AgentFailure::Network(_) => FailureCategory::Transient.into(),
        AgentFailure::Auth(_) => FailureCategory::Auth.into(),
        AgentFailure::ContentRejected(_) => FailureCategory::ContentRejected.into(),
        AgentFailure::Tool { .. } => FailureCategory::ToolFailure.into(),
        AgentFailure::EmptyResult | AgentFailure::Unavailable(_) | AgentFailure::Panicked(_) => {
            FailureCategory::Unknown.into()
        }
        AgentFailure::Other(message) => classify_message(message).into(),
    }
}

fn classify_status(status: u16, message: &str) -> FailureCategory {
    match status {
        401 | 403 => FailureCategory::Auth,
        429 => FailureCategory::RateLimited,
        408 | 504 => FailureCategory::Timeout,
        500..=599 => FailureCategory::Transient,
        400 | 422 if matches_any(&message.to_lowercase(), CONTENT_PATTERNS) => {
            FailureCategory::ContentRejected
        }
        _ => FailureCategory::Unknown,
    }
}

/// Keyword classification for free-form messages. Groups are checked in
/// order, so a message mentioning both a credential and a timeout is `Auth`.
fn classify_message(message: &str) -> FailureCategory {
    let lower = message.to_lowercase();
    let groups: [(&[&str], FailureCategory); 6] = [
        (AUTH_PATTERNS, FailureCategory::Auth),
        (CONTENT_PATTERNS, FailureCategory::ContentRejected),
        (RATE_LIMIT_PATTERNS, FailureCategory::RateLimited),
        (TIMEOUT_PATTERNS, FailureCategory::Timeout),
        (TRANSIENT_PATTERNS, FailureCategory::Transient),
        (TOOL_PATTERNS, FailureCategory::ToolFailure),
    ];

    groups
        .iter()
        .find(|(patterns, _)| matches_any(&lower, patterns))
        .map(|(_, category)| *category)
        .unwrap_or(FailureCategory::Unknown)
}

fn matches_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}
