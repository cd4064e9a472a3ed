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

//! Database layer for the task record store.
//!
//! The store is an embedded SQLite database accessed through Diesel and a
//! `deadpool-diesel` pool. Migrations are compiled into the binary and applied
//! with [`Database::run_migrations`].

pub mod connection;
pub mod schema;
pub mod universal_types;

pub use connection::{Database, DatabaseError};
pub use universal_types::{current_timestamp, UniversalTimestamp, UniversalUuid};

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

/// Embedded SQLite migrations for the task record store.
pub const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");
