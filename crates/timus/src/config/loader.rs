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

use crate::config::{ConfigError, TimusConfig, Validate};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "TIMUS_CONFIG";

pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory
        search_paths.push(PathBuf::from("./timus.toml"));

        // 2. User config directory
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("timus").join("config.toml"));
        }

        // 3. System config directory
        search_paths.push(PathBuf::from("/etc/timus/config.toml"));

        Self { search_paths }
    }

    /// Create a config loader with custom search paths
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Loads and validates the configuration.
    ///
    /// An explicit path, then `TIMUS_CONFIG`, must name an existing file.
    /// Otherwise the search paths are tried in order, and the built-in
    /// defaults are used when none exists.
    pub fn load_config(&self, config_file: Option<&Path>) -> Result<TimusConfig, ConfigError> {
        let config_path = if let Some(path) = config_file {
            Some(path.to_path_buf())
        } else if let Ok(env_config) = env::var(CONFIG_ENV_VAR) {
            Some(PathBuf::from(env_config))
        } else {
            self.find_config_file()
        };

        let config = match config_path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::ConfigNotFound(path));
                }
                info!("Loading configuration from {}", path.display());
                self.load_config_from_file(&path)?
            }
            None => {
                debug!("No configuration file found, using defaults");
                TimusConfig::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_config_from_file(&self, path: &Path) -> Result<TimusConfig, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let substituted_content = substitute_env_vars(&content)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") | None => Ok(toml::from_str::<TimusConfig>(&substituted_content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat {
                extension: ext.to_string(),
            }),
        }
    }

    /// Find the first existing configuration file in search paths
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .find(|path| path.is_file())
            .cloned()
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn env_var_pattern() -> Result<&'static Regex, ConfigError> {
    static PATTERN: OnceCell<Regex> = OnceCell::new();
    PATTERN
        .get_or_try_init(|| Regex::new(r"\$\{([^}]+)\}"))
        .map_err(|e| ConfigError::EnvSubstitutionError(e.to_string()))
}

/// Replaces `${VAR}`, `${VAR:-default}` and `${VAR:?message}` references.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let pattern = env_var_pattern()?;
    let mut result = String::with_capacity(content.len());
    let mut last = 0;

    for cap in pattern.captures_iter(content) {
        let (Some(whole), Some(expr)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        result.push_str(&content[last..whole.start()]);
        result.push_str(&process_var_expression(expr.as_str())?);
        last = whole.end();
    }
    result.push_str(&content[last..]);

    Ok(result)
}

fn process_var_expression(expr: &str) -> Result<String, ConfigError> {
    if let Some((var_name, default_value)) = expr.split_once(":-") {
        Ok(env::var(var_name).unwrap_or_else(|_| default_value.to_string()))
    } else if let Some((var_name, error_msg)) = expr.split_once(":?") {
        env::var(var_name).map_err(|_| {
            ConfigError::EnvSubstitutionError(format!(
                "Required environment variable '{}' is not set: {}",
                var_name, error_msg
            ))
        })
    } else {
        env::var(expr).map_err(|_| {
            ConfigError::EnvSubstitutionError(format!(
                "Required environment variable '{}' is not set",
                expr
            ))
        })
    }
}
