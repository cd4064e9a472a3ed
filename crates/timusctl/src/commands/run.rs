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

//! Implementation of the `run` command.
//!
//! Every agent runs through the `[executor]` program. Ctrl-C stops the runner
//! after the pass in progress. On Unix, `SIGUSR1` wakes the runner for an
//! immediate pass, so a submitter can run `kill -USR1 <pid>` after
//! `timusctl enqueue` instead of waiting for the heartbeat.

use super::CommandContext;
use anyhow::{Context, Result};
use std::sync::Arc;
use timus::agent::ExecutorRegistry;
use timus::dispatcher::LogNotifier;
use timus::{FailoverDispatcher, Runner};
use tracing::{debug, info, warn};

pub async fn run(ctx: &CommandContext) -> Result<()> {
    let executor = ctx.config.command_executor().context(
        "No agent executor configured. Set [executor].program in the configuration file",
    )?;
    let catalog = ctx
        .config
        .agent_catalog()
        .context("Invalid agent configuration")?;

    let queue = ctx.open_queue().await?;

    info!(program = %executor.program().display(), "Using command executor");
    let executors = ExecutorRegistry::new().with_default(Arc::new(executor));
    let dispatcher = FailoverDispatcher::new(
        Arc::new(catalog),
        executors,
        Arc::new(LogNotifier),
        ctx.config.dispatch_config(),
    );

    let runner = Runner::new(queue, dispatcher, ctx.config.runner_config());
    let handle = runner.handle();

    #[cfg(unix)]
    {
        let trigger = handle.clone();
        listen_for_wakeups(move || trigger.trigger())
            .context("Failed to install SIGUSR1 handler")?;
        info!(pid = std::process::id(), "Send SIGUSR1 to trigger an immediate pass");
    }

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                handle.shutdown();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    runner.run().await.context("Runner stopped with an error")?;
    Ok(())
}

/// Calls `on_wakeup` for every `SIGUSR1` the process receives.
///
/// The handler is installed before this returns.
#[cfg(unix)]
fn listen_for_wakeups(on_wakeup: impl Fn() + Send + 'static) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut wakeups = signal(SignalKind::user_defined1())?;
    tokio::spawn(async move {
        while wakeups.recv().await.is_some() {
            debug!("SIGUSR1 received, triggering runner");
            on_wakeup();
        }
    });
    Ok(())
}
