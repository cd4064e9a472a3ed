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

//! Effective agent profiles and keyword routing.

use super::{AgentKind, Capability, ModelBinding, Provider};
use crate::config::AgentOverride;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Errors raised when resolving agent names or applying overrides.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("Agent '{0}' cannot fall back to itself")]
    SelfFallback(AgentKind),

    #[error("Agent '{agent}' lists fallback '{fallback}' more than once")]
    DuplicateFallback { agent: AgentKind, fallback: AgentKind },

    #[error("Agent '{0}' has an empty model name")]
    EmptyModel(AgentKind),
}

/// Runtime configuration of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentProfile {
    pub kind: AgentKind,
    pub model: ModelBinding,
    pub fallbacks: Vec<AgentKind>,
    pub capabilities: Vec<Capability>,
}

impl AgentProfile {
    fn from_defaults(kind: AgentKind) -> Self {
        let (provider, model) = kind.default_model();
        Self {
            kind,
            model: ModelBinding {
                provider,
                model: model.to_string(),
            },
            fallbacks: kind.default_fallbacks().to_vec(),
            capabilities: kind.capabilities().to_vec(),
        }
    }
}

/// All agent profiles, keyed by kind.
///
/// Built from the static defaults and optionally adjusted by configuration.
/// The catalog is immutable once handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCatalog {
    profiles: BTreeMap<AgentKind, AgentProfile>,
}

impl Default for AgentCatalog {
    fn default() -> Self {
        let profiles = AgentKind::ALL
            .into_iter()
            .map(|kind| (kind, AgentProfile::from_defaults(kind)))
            .collect();
        Self { profiles }
    }
}

impl AgentCatalog {
    /// Builds a catalog from defaults plus `[agents.<name>]` overrides.
    pub fn with_overrides(
        overrides: &BTreeMap<String, AgentOverride>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for (name, agent_override) in overrides {
            let kind: AgentKind = name.parse()?;
            catalog.apply_override(kind, agent_override)?;
        }
        Ok(catalog)
    }

    fn apply_override(
        &mut self,
        kind: AgentKind,
        agent_override: &AgentOverride,
    ) -> Result<(), CatalogError> {
        let mut profile = self.profile(kind).clone();

        if let Some(provider) = &agent_override.provider {
            profile.model.provider = provider.parse::<Provider>()?;
        }
        if let Some(model) = &agent_override.model {
            if model.trim().is_empty() {
                return Err(CatalogError::EmptyModel(kind));
            }
            profile.model.model = model.trim().to_string();
        }
        if let Some(names) = &agent_override.fallbacks {
            let mut seen = HashSet::new();
            let mut chain = Vec::with_capacity(names.len());
            for name in names {
                let fallback: AgentKind = name.parse()?;
                if fallback == kind {
                    return Err(CatalogError::SelfFallback(kind));
                }
                if !seen.insert(fallback) {
                    return Err(CatalogError::DuplicateFallback {
                        agent: kind,
                        fallback,
                    });
                }
                chain.push(fallback);
            }
            profile.fallbacks = chain;
        }

        debug!(agent = %kind, model = %profile.model, fallbacks = ?profile.fallbacks, "Applied agent override");
        self.profiles.insert(kind, profile);
        Ok(())
    }

    pub fn profile(&self, kind: AgentKind) -> &AgentProfile {
        // Every kind is inserted at construction and never removed.
        &self.profiles[&kind]
    }

    pub fn profiles(&self) -> impl Iterator<Item = &AgentProfile> {
        self.profiles.values()
    }

    /// The requested agent followed by its fallback chain.
    pub fn chain_for(&self, kind: AgentKind) -> Vec<AgentKind> {
        let mut chain = Vec::with_capacity(1 + self.profile(kind).fallbacks.len());
        chain.push(kind);
        chain.extend(self.profile(kind).fallbacks.iter().copied());
        chain
    }

    /// Selects an agent for a task without an explicit target.
    ///
    /// Each agent scores one point per capability keyword found in the
    /// description (whole words or phrases only). The highest score wins, ties
    /// go to the earlier agent in [`AgentKind::ALL`], and a description that
    /// matches nothing goes to [`AgentKind::Executor`].
    pub fn route(&self, description: &str) -> AgentKind {
        let normalized = normalize_words(description);
        let mut best = (AgentKind::Executor, 0usize);

        for profile in self.profiles.values() {
            let score = profile
                .capabilities
                .iter()
                .flat_map(|cap| cap.keywords().iter())
                .filter(|kw| normalized.contains(&format!(" {} ", kw)))
                .count();
            if score > best.1 {
                best = (profile.kind, score);
            }
        }

        debug!(agent = %best.0, score = best.1, "Routed task by description");
        best.0
    }
}

/// Lowercases and collapses a description into `" word word ... "` so phrase
/// matching can require whole-word boundaries.
fn normalize_words(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    format!(" {} ", words.join(" "))
}
