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

//! Wake-up signalling for the runner loop.
//!
//! The runner sleeps for its heartbeat interval between passes. A trigger or a
//! shutdown request cuts the sleep short. `Notify::notify_one` stores a permit
//! when nobody is waiting, so a trigger sent while a pass is running wakes the
//! next wait immediately instead of being lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Why a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Heartbeat,
    Triggered,
    Shutdown,
}

#[derive(Debug, Default)]
pub(crate) struct Wakeup {
    notify: Notify,
    shutdown: AtomicBool,
}

impl Wakeup {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn trigger(&self) {
        self.notify.notify_one();
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Waits for the heartbeat, a trigger or shutdown, whichever comes first.
    pub(crate) async fn wait(&self, heartbeat: Duration) -> WakeReason {
        if self.is_shutdown() {
            return WakeReason::Shutdown;
        }

        tokio::select! {
            _ = tokio::time::sleep(heartbeat) => {
                debug!("Runner heartbeat elapsed");
                WakeReason::Heartbeat
            }
            _ = self.notify.notified() => {
                if self.is_shutdown() {
                    debug!("Runner shutdown signal received");
                    WakeReason::Shutdown
                } else {
                    debug!("Runner triggered");
                    WakeReason::Triggered
                }
            }
        }
    }
}
