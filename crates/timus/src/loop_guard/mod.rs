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

//! Per-run repetition detection.
//!
//! A [`LoopGuard`] watches the actions an agent takes during one run and
//! flags canonical actions that keep coming back. It keeps two views:
//!
//! - a bounded rolling window of recent keys (oldest evicted first)
//! - a per-run count for every key, so an action that cycles out of the
//!   window is still recognized when it returns
//!
//! A key is flagged when its run count exceeds `repeat_threshold`, or when
//! its count inside the window exceeds `max_in_window` if that is set. The
//! guard only advises: [`LoopGuard::observe`] returns a [`GuardSignal`] with
//! an instruction for the agent, and [`LoopGuard::report`] exposes every
//! flag for the run's outcome. Stopping is the executor's decision.
//!
//! An action that cannot be canonicalized yields [`GuardSignal::Clear`].

mod signature;

pub use signature::{canonicalize, Action, ActionKey, SignatureError};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, warn};

/// Loop guard tuning. Also the `[loop_guard]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Capacity of the rolling window.
    pub window_size: usize,
    /// A key is flagged once its run count exceeds this.
    pub repeat_threshold: usize,
    /// Grid size for bucketing spatial coordinates.
    pub coordinate_tolerance: f64,
    /// Optional density limit: flag when a key's count inside the window
    /// exceeds this.
    pub max_in_window: Option<usize>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            window_size: 12,
            repeat_threshold: 3,
            coordinate_tolerance: 12.0,
            max_in_window: None,
        }
    }
}

/// Advice returned for each observed action.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardSignal {
    Clear,
    Looping(LoopWarning),
}

impl GuardSignal {
    pub fn is_looping(&self) -> bool {
        matches!(self, GuardSignal::Looping(_))
    }
}

/// Details handed back to the agent when an action is flagged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopWarning {
    pub key: ActionKey,
    pub count: usize,
    pub in_window: usize,
    /// Text meant to be injected into the agent's next turn.
    pub instruction: String,
}

/// One flagged key in a run's report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopFlag {
    pub signature: String,
    pub count: usize,
}

/// Summary of a run, attached to the dispatch outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopReport {
    pub looping: bool,
    /// Actions observed, including those that could not be canonicalized.
    pub observed: usize,
    /// Actions that could not be canonicalized and were ignored.
    pub unclassified: usize,
    pub flags: Vec<LoopFlag>,
}

/// Repetition tracker for a single agent run.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    config: GuardConfig,
    window: VecDeque<ActionKey>,
    counts: HashMap<ActionKey, usize>,
    flags: BTreeMap<ActionKey, usize>,
    observed: usize,
    unclassified: usize,
}

impl LoopGuard {
    pub fn new(config: GuardConfig) -> Self {
        let window = VecDeque::with_capacity(config.window_size.max(1));
        Self {
            config,
            window,
            counts: HashMap::new(),
            flags: BTreeMap::new(),
            observed: 0,
            unclassified: 0,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Records one action and returns advice for the agent.
    pub fn observe(&mut self, action: &Action) -> GuardSignal {
        self.observed += 1;

        let key = match canonicalize(action, self.config.coordinate_tolerance) {
            Ok(key) => key,
            Err(e) => {
                self.unclassified += 1;
                debug!(action = action.name(), error = %e, "Loop guard skipped action");
                return GuardSignal::Clear;
            }
        };

        self.window.push_back(key.clone());
        while self.window.len() > self.config.window_size.max(1) {
            self.window.pop_front();
        }

        let count = {
            let entry = self.counts.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        let in_window = self.window.iter().filter(|k| **k == key).count();

        let over_run_limit = count > self.config.repeat_threshold;
        let over_density = self
            .config
            .max_in_window
            .is_some_and(|limit| in_window > limit);

        if !(over_run_limit || over_density) {
            return GuardSignal::Clear;
        }

        let first_flag = !self.flags.contains_key(&key);
        self.flags.insert(key.clone(), count);
        if first_flag {
            metrics::counter!("timus_loop_guard_flags_total").increment(1);
        }
        warn!(
            action = %key,
            count,
            in_window,
            "Repeated action detected, advising agent to change approach"
        );

        let instruction = format!(
            "[SYSTEM] LOOP DETECTED: you have performed `{}` {} times in this run \
             ({} of the last {} actions). Repeating it will not produce a different \
             outcome. Change your approach: use a different tool, different arguments \
             or a different target, or report what is blocking you.",
            action.name(),
            count,
            in_window,
            self.window.len()
        );

        GuardSignal::Looping(LoopWarning {
            key,
            count,
            in_window,
            instruction,
        })
    }

    /// True once any key has been flagged in this run.
    pub fn is_looping(&self) -> bool {
        !self.flags.is_empty()
    }

    pub fn report(&self) -> LoopReport {
        LoopReport {
            looping: self.is_looping(),
            observed: self.observed,
            unclassified: self.unclassified,
            flags: self
                .flags
                .iter()
                .map(|(key, count)| LoopFlag {
                    signature: key.to_string(),
                    count: *count,
                })
                .collect(),
        }
    }

    /// Forgets all history.
    pub fn reset(&mut self) {
        self.window.clear();
        self.counts.clear();
        self.flags.clear();
        self.observed = 0;
        self.unclassified = 0;
    }
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}
