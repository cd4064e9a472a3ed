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

//! TOML configuration.
//!
//! ```toml
//! [database]
//! url = "${TIMUS_DATABASE_URL:-sqlite:///var/lib/timus/tasks.db}"
//!
//! [runner]
//! heartbeat_interval_secs = 900
//!
//! [agents.developer]
//! model = "mercury-coder"
//! fallbacks = ["reasoning", "executor"]
//!
//! [executor]
//! program = "/usr/local/bin/timus-agent"
//! ```
//!
//! Every section and field is optional.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod types;
pub mod validation;

pub use error::{ConfigError, ValidationError};
pub use loader::ConfigLoader;
pub use types::*;
pub use validation::Validate;
