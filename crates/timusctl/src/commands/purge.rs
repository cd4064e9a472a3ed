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

//! Implementation of the `purge` command.
//!
//! Deletes finished tasks based on a retention period.

use super::{parse_duration, CommandContext};
use anyhow::{Context, Result};
use tracing::info;

/// Run the purge command.
///
/// # Arguments
///
/// * `older_than` - Duration string (e.g., "30d", "12h")
/// * `dry_run` - If true, only report what would be deleted
pub async fn run(ctx: &CommandContext, older_than: &str, dry_run: bool) -> Result<()> {
    let retention = parse_duration(older_than)
        .with_context(|| format!("Invalid duration: '{}'", older_than))?;

    info!("Purging finished tasks older than {}", older_than);

    let queue = ctx.open_queue().await?;
    let count = queue
        .purge_finished(retention, dry_run)
        .await
        .context("Failed to purge tasks")?;

    if count == 0 {
        info!("No finished tasks older than {}", older_than);
    } else if dry_run {
        info!(
            "[DRY RUN] Would delete {} finished task(s) older than {}",
            count, older_than
        );
    } else {
        info!("Deleted {} finished task(s) older than {}", count, older_than);
    }
    println!("{}", count);
    Ok(())
}
