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

pub async fn run(ctx: &CommandContext) -> Result<()> {
    let queue = ctx.open_queue().await?;
    let stats = queue.stats().await.context("Failed to read queue stats")?;

    println!("pending:     {}", stats.pending);
    println!("in_progress: {}", stats.in_progress);
    println!("completed:   {}", stats.completed);
    println!("failed:      {}", stats.failed);
    println!("total:       {}", stats.total());
    Ok(())
}
