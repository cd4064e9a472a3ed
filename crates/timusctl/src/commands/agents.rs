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

pub fn run(ctx: &CommandContext) -> Result<()> {
    let catalog = ctx
        .config
        .agent_catalog()
        .context("Invalid agent configuration")?;

    println!("{:<12}  {:<40}  FALLBACKS", "AGENT", "MODEL");
    for profile in catalog.profiles() {
        let fallbacks: Vec<String> = profile.fallbacks.iter().map(|a| a.to_string()).collect();
        let fallbacks = if fallbacks.is_empty() {
            "-".to_string()
        } else {
            fallbacks.join(" -> ")
        };
        println!(
            "{:<12}  {:<40}  {}",
            profile.kind.to_string(),
            profile.model.to_string(),
            fallbacks
        );
    }
    Ok(())
}
