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

//! Agent kinds and their static configuration.
//!
//! The set of agents is closed: every agent is a variant of [`AgentKind`] and
//! carries its default model binding, fallback chain and capability tags as
//! plain data. Names parse case-insensitively and only the canonical name is
//! accepted, so two spellings can never resolve to different handlers.
//!
//! Runtime profiles (defaults plus configuration overrides) live in
//! [`AgentCatalog`]; executors are bound per kind in [`ExecutorRegistry`].

pub mod catalog;
pub mod command;
pub mod executor;

pub use catalog::{AgentCatalog, AgentProfile, CatalogError};
pub use command::CommandExecutor;
pub use executor::{AgentExecutor, AgentOutput, AgentRequest, ExecutorRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every agent the dispatcher can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Executor,
    Research,
    Reasoning,
    Creative,
    Developer,
    Meta,
    Visual,
    Image,
    Data,
    Document,
    Communication,
    System,
    Shell,
}

/// LLM provider behind a model binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    DeepSeek,
    Inception,
    Ollama,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::DeepSeek,
        Provider::Inception,
        Provider::Ollama,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::DeepSeek => "deepseek",
            Provider::Inception => "inception",
            Provider::Ollama => "ollama",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| CatalogError::UnknownProvider(s.to_string()))
    }
}

/// Capability tags. Routing matches task descriptions against their keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    General,
    WebSearch,
    Analysis,
    Writing,
    ImageGeneration,
    Code,
    Planning,
    DesktopControl,
    Browser,
    ImageAnalysis,
    DataAnalysis,
    Documents,
    Messaging,
    SystemMonitoring,
    ShellCommands,
}

impl Capability {
    /// Lowercase words and phrases that indicate this capability.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Capability::General => &[],
            Capability::WebSearch => &["research", "search", "look up", "news", "sources", "find out"],
            Capability::Analysis => &["analyze", "analyse", "summarize", "summarise", "compare", "reason", "explain"],
            Capability::Writing => &["write", "poem", "story", "blog", "lyrics", "creative"],
            Capability::ImageGeneration => &["draw", "illustration", "generate an image"],
            Capability::Code => &["code", "bug", "refactor", "function", "compile", "script", "repository", "rust", "python"],
            Capability::Planning => &["plan", "orchestrate", "workflow", "multi step"],
            Capability::DesktopControl => &["click", "desktop", "window", "screen", "open app"],
            Capability::Browser => &["browser", "website", "web page", "navigate", "url"],
            Capability::ImageAnalysis => &["image", "photo", "picture", "screenshot", "ocr"],
            Capability::DataAnalysis => &["csv", "dataset", "chart", "statistics", "spreadsheet"],
            Capability::Documents => &["pdf", "docx", "document", "report", "xlsx", "slides"],
            Capability::Messaging => &["email", "mail", "message", "reply", "inbox"],
            Capability::SystemMonitoring => &["cpu", "disk", "memory", "process", "logs", "uptime"],
            Capability::ShellCommands => &["shell", "terminal", "bash", "command line"],
        }
    }
}

/// Provider and model identifier an agent runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelBinding {
    pub provider: Provider,
    pub model: String,
}

impl fmt::Display for ModelBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

impl AgentKind {
    pub const ALL: [AgentKind; 13] = [
        AgentKind::Executor,
        AgentKind::Research,
        AgentKind::Reasoning,
        AgentKind::Creative,
        AgentKind::Developer,
        AgentKind::Meta,
        AgentKind::Visual,
        AgentKind::Image,
        AgentKind::Data,
        AgentKind::Document,
        AgentKind::Communication,
        AgentKind::System,
        AgentKind::Shell,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Executor => "executor",
            AgentKind::Research => "research",
            AgentKind::Reasoning => "reasoning",
            AgentKind::Creative => "creative",
            AgentKind::Developer => "developer",
            AgentKind::Meta => "meta",
            AgentKind::Visual => "visual",
            AgentKind::Image => "image",
            AgentKind::Data => "data",
            AgentKind::Document => "document",
            AgentKind::Communication => "communication",
            AgentKind::System => "system",
            AgentKind::Shell => "shell",
        }
    }

    /// Default model binding.
    pub fn default_model(self) -> (Provider, &'static str) {
        match self {
            AgentKind::Executor => (Provider::OpenAi, "gpt-4o-mini"),
            AgentKind::Research => (Provider::DeepSeek, "deepseek-reasoner"),
            AgentKind::Reasoning => (Provider::Anthropic, "claude-sonnet-4-5"),
            AgentKind::Creative => (Provider::OpenAi, "gpt-4o"),
            AgentKind::Developer => (Provider::Inception, "mercury-coder"),
            AgentKind::Meta => (Provider::Anthropic, "claude-sonnet-4-5"),
            AgentKind::Visual => (Provider::Anthropic, "claude-sonnet-4-5"),
            AgentKind::Image => (Provider::OpenAi, "gpt-4o"),
            AgentKind::Data => (Provider::OpenAi, "gpt-4o"),
            AgentKind::Document => (Provider::OpenAi, "gpt-4o-mini"),
            AgentKind::Communication => (Provider::OpenAi, "gpt-4o-mini"),
            AgentKind::System => (Provider::Ollama, "qwen2.5:7b"),
            AgentKind::Shell => (Provider::Ollama, "qwen2.5:7b"),
        }
    }

    /// Default ordered fallback chain. Never contains `self`.
    pub fn default_fallbacks(self) -> &'static [AgentKind] {
        match self {
            AgentKind::Executor => &[AgentKind::Reasoning],
            AgentKind::Research => &[AgentKind::Reasoning, AgentKind::Executor],
            AgentKind::Reasoning => &[AgentKind::Executor],
            AgentKind::Creative => &[AgentKind::Executor],
            AgentKind::Developer => &[AgentKind::Reasoning, AgentKind::Executor],
            AgentKind::Meta => &[AgentKind::Reasoning],
            AgentKind::Visual => &[AgentKind::Image],
            AgentKind::Image => &[AgentKind::Visual],
            AgentKind::Data => &[AgentKind::Developer, AgentKind::Reasoning],
            AgentKind::Document => &[AgentKind::Creative, AgentKind::Executor],
            AgentKind::Communication => &[AgentKind::Executor],
            AgentKind::System => &[AgentKind::Shell],
            AgentKind::Shell => &[],
        }
    }

    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            AgentKind::Executor => &[Capability::General],
            AgentKind::Research => &[Capability::WebSearch],
            AgentKind::Reasoning => &[Capability::Analysis],
            AgentKind::Creative => &[Capability::Writing, Capability::ImageGeneration],
            AgentKind::Developer => &[Capability::Code],
            AgentKind::Meta => &[Capability::Planning],
            AgentKind::Visual => &[Capability::DesktopControl, Capability::Browser],
            AgentKind::Image => &[Capability::ImageAnalysis],
            AgentKind::Data => &[Capability::DataAnalysis],
            AgentKind::Document => &[Capability::Documents],
            AgentKind::Communication => &[Capability::Messaging],
            AgentKind::System => &[Capability::SystemMonitoring],
            AgentKind::Shell => &[Capability::ShellCommands],
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| CatalogError::UnknownAgent(s.to_string()))
    }
}
