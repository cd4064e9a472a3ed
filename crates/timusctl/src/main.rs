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

//! timusctl - command-line interface for the Timus task queue and agent runner.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use timus::agent::AgentKind;
use timus::{ConfigLoader, Priority, TaskStatus};

mod commands;

use commands::CommandContext;

/// timusctl - operate the Timus task queue and agent runner
#[derive(Parser)]
#[command(name = "timusctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (overrides [database].url; can also be set via DATABASE_URL)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Configuration file (defaults to TIMUS_CONFIG or the standard search paths)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task to the queue and print its id
    Enqueue {
        /// What the agent should do
        description: String,

        /// Scheduling priority (critical, high, normal, low)
        #[arg(long, default_value = "normal")]
        priority: Priority,

        /// Send the task to this agent instead of routing by description
        #[arg(long)]
        agent: Option<AgentKind>,

        /// Delay before the task becomes ready (e.g., "15m", "2h")
        #[arg(long, conflicts_with = "run_at")]
        delay: Option<String>,

        /// Earliest start time as an RFC 3339 timestamp
        #[arg(long)]
        run_at: Option<String>,

        /// How many times a retriable failure is requeued
        #[arg(long, default_value_t = timus::NewTask::DEFAULT_MAX_RETRIES)]
        max_retries: u32,

        /// Metadata entry as key=value (repeatable; JSON values are parsed)
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// List tasks in claim order
    List {
        /// Only show tasks in this status
        #[arg(long)]
        status: Option<TaskStatus>,

        /// Maximum number of tasks to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Print one task as JSON
    Show {
        /// Task id
        id: String,
    },

    /// Show task counts per status
    Stats,

    /// Requeue or fail in_progress tasks abandoned by a crashed runner
    Recover {
        /// Treat tasks claimed longer ago than this as abandoned
        #[arg(long, default_value = "30m")]
        older_than: String,
    },

    /// Delete completed and failed tasks
    Purge {
        /// Delete tasks that finished longer ago than this (e.g., "30d", "12h")
        #[arg(long)]
        older_than: String,

        /// Preview what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the task runner until interrupted
    Run,

    /// List agents with their models and fallback chains
    Agents,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load_config(cli.config.as_deref())
        .context("Failed to load configuration")?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    timus::init_logging(Some(level));

    let ctx = CommandContext::new(config, cli.database_url);

    match cli.command {
        Commands::Enqueue {
            description,
            priority,
            agent,
            delay,
            run_at,
            max_retries,
            meta,
        } => {
            let args = commands::enqueue::EnqueueArgs {
                description,
                priority,
                agent,
                delay,
                run_at,
                max_retries,
                meta,
            };
            commands::enqueue::run(&ctx, args).await?;
        }
        Commands::List { status, limit } => commands::list::run(&ctx, status, limit).await?,
        Commands::Show { id } => commands::show::run(&ctx, &id).await?,
        Commands::Stats => commands::stats::run(&ctx).await?,
        Commands::Recover { older_than } => commands::recover::run(&ctx, &older_than).await?,
        Commands::Purge {
            older_than,
            dry_run,
        } => commands::purge::run(&ctx, &older_than, dry_run).await?,
        Commands::Run => commands::run::run(&ctx).await?,
        Commands::Agents => commands::agents::run(&ctx)?,
    }

    Ok(())
}
