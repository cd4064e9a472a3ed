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

use crate::agent::AgentKind;
use crate::loop_guard::{Action, GuardConfig, GuardSignal, LoopGuard, LoopReport};

/// Most recent actions kept verbatim on a run.
const ACTION_HISTORY_LIMIT: usize = 256;

/// Live context for one attempt of one agent on one task.
///
/// Created by the dispatcher for each attempt and dropped when the attempt
/// ends, so loop-guard history never leaks between attempts or agents.
#[derive(Debug)]
pub struct AgentRun {
    agent: AgentKind,
    fallback_position: usize,
    attempt: u32,
    actions: Vec<Action>,
    actions_taken: usize,
    guard: LoopGuard,
}

impl AgentRun {
    pub fn new(
        agent: AgentKind,
        fallback_position: usize,
        attempt: u32,
        guard_config: GuardConfig,
    ) -> Self {
        Self {
            agent,
            fallback_position,
            attempt,
            actions: Vec::new(),
            actions_taken: 0,
            guard: LoopGuard::new(guard_config),
        }
    }

    /// Records an action and returns the loop guard's advice.
    pub fn record(&mut self, action: Action) -> GuardSignal {
        let signal = self.guard.observe(&action);
        self.actions_taken += 1;
        if self.actions.len() == ACTION_HISTORY_LIMIT {
            self.actions.remove(0);
        }
        self.actions.push(action);
        signal
    }

    pub fn agent(&self) -> AgentKind {
        self.agent
    }

    /// Position in the chain: 0 for the requested agent, 1 for its first
    /// fallback, and so on.
    pub fn fallback_position(&self) -> usize {
        self.fallback_position
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Recent actions, oldest first.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn actions_taken(&self) -> usize {
        self.actions_taken
    }

    pub fn is_looping(&self) -> bool {
        self.guard.is_looping()
    }

    pub fn loop_report(&self) -> LoopReport {
        self.guard.report()
    }
}
