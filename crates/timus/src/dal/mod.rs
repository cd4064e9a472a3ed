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

//! Data access layer.
//!
//! [`DAL`] owns the database handle and hands out per-entity accessors that
//! borrow it:
//!
//! ```rust,ignore
//! let dal = DAL::new(database);
//! let task = dal.task().get_by_id(id).await?;
//! ```
//!
//! Rows are converted into domain types at this boundary; nothing above the
//! DAL sees raw strings or integers from the store.

pub mod task;

pub use task::{FailOutcome, RecoveryReport, TaskDAL};

use crate::database::Database;

/// Entry point for all store access.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn task(&self) -> TaskDAL<'_> {
        TaskDAL::new(self)
    }
}
