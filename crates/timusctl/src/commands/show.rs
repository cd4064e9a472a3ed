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

use super::CommandContext;
use anyhow::{Context, Result};
use timus::UniversalUuid;

pub async fn run(ctx: &CommandContext, id: &str) -> Result<()> {
    let id: UniversalUuid = id
        .trim()
        .parse()
        .with_context(|| format!("Invalid task id: '{}'", id))?;

    let queue = ctx.open_queue().await?;
    let task = queue.get(id).await.context("Failed to load task")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&task).context("Failed to serialize task")?
    );
    Ok(())
}
