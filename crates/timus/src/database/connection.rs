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

//! SQLite connection management.
//!
//! Provides an async connection pool built on `deadpool-diesel`. The pool is
//! `Clone` and every clone shares the same underlying connections.
//!
//! # Example
//!
//! ```rust,ignore
//! use timus::database::Database;
//!
//! let db = Database::try_new("sqlite:///var/lib/timus/tasks.db")?;
//! db.run_migrations().await?;
//! ```

use deadpool_diesel::sqlite::{Manager, Pool, Runtime};
use diesel_migrations::MigrationHarness;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while creating or preparing the database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to create connection pool: {0}")]
    Pool(String),

    #[error("Failed to run migrations: {0}")]
    Migration(String),
}

/// Pooled handle to the task record store.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
    url: String,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Creates a new pool for the given SQLite location.
    ///
    /// Accepts a `sqlite://` URL, a plain file path, or `:memory:`. The URL is
    /// validated up front; connections are opened lazily by the pool.
    pub fn try_new(connection_string: &str) -> Result<Self, DatabaseError> {
        let url = Self::build_sqlite_url(connection_string)?;
        let manager = Manager::new(url.clone(), Runtime::Tokio1);
        // SQLite serializes writers even in WAL mode. One connection avoids
        // "database is locked" errors under concurrent claimers.
        let sqlite_pool_size = 1;
        let pool = Pool::builder(manager)
            .max_size(sqlite_pool_size)
            .build()
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        info!(
            "SQLite connection pool initialized (size: {})",
            sqlite_pool_size
        );

        Ok(Self { pool, url })
    }

    /// Returns the normalized connection target.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns a clone of the connection pool.
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }

    /// Gets a pooled SQLite connection.
    pub async fn get_connection(
        &self,
    ) -> Result<deadpool::managed::Object<Manager>, deadpool::managed::PoolError<deadpool_diesel::Error>>
    {
        self.pool.get().await
    }

    fn build_sqlite_url(connection_string: &str) -> Result<String, DatabaseError> {
        let trimmed = connection_string.trim();
        let path = trimmed.strip_prefix("sqlite://").unwrap_or(trimmed);
        if path.is_empty() {
            return Err(DatabaseError::InvalidUrl(connection_string.to_string()));
        }
        if path.contains("://") {
            return Err(DatabaseError::InvalidUrl(format!(
                "{} (only sqlite:// URLs and file paths are supported)",
                connection_string
            )));
        }
        Ok(path.to_string())
    }

    /// Applies connection pragmas and runs pending migrations.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        let applied = conn
            .interact(|conn| -> Result<usize, String> {
                use diesel::prelude::*;

                // WAL lets readers proceed during writes.
                diesel::sql_query("PRAGMA journal_mode=WAL;")
                    .execute(conn)
                    .map_err(|e| format!("failed to set WAL mode: {}", e))?;
                // Wait up to 30s on a locked database instead of failing immediately.
                diesel::sql_query("PRAGMA busy_timeout=30000;")
                    .execute(conn)
                    .map_err(|e| format!("failed to set busy_timeout: {}", e))?;

                conn.run_pending_migrations(crate::database::SQLITE_MIGRATIONS)
                    .map(|versions| versions.len())
                    .map_err(|e| e.to_string())
            })
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?
            .map_err(DatabaseError::Migration)?;

        debug!(applied, "SQLite migrations complete");
        Ok(())
    }
}
