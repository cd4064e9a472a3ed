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

//! Implementation of the `recover` command.
//!
//! Runs the same reconciliation the runner performs at startup. Use it after
//! a crash when the runner is not going to be restarted soon.

use super::{parse_duration, CommandContext};
use anyhow::{Context, Result};
use tracing::info;

pub async fn run(ctx: &CommandContext, older_than: &str) -> Result<()> {
    let threshold = parse_duration(older_than)
        .with_context(|| format!("Invalid duration: '{}'", older_than))?;

    let queue = ctx.open_queue().await?;
    let report = queue
        .recover_stale(threshold)
        .await
        .context("Failed to recover stale tasks")?;

    if report.is_empty() {
        info!("No in_progress tasks older than {}", older_than);
        return Ok(());
    }

    for id in &report.requeued {
        println!("requeued  {}", id);
    }
    for id in &report.abandoned {
        println!("failed    {}", id);
    }
    info!(
        "Recovered {} task(s): {} requeued, {} failed",
        report.total(),
        report.requeued.len(),
        report.abandoned.len()
    );
    Ok(())
}
