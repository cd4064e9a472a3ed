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

//! Canonical action signatures.
//!
//! [`canonicalize`] turns a raw [`Action`] into an [`ActionKey`] such that
//! near-identical actions compare equal:
//!
//! - spatial actions have their coordinates bucketed to a tolerance grid, so
//!   clicks a few pixels apart share a key
//! - tool calls have their name normalized and their JSON arguments rewritten
//!   with sorted keys, null fields dropped, whitespace collapsed and integral
//!   floats folded to integers
//!
//! Grid bucketing is approximate at cell edges: two points closer than the
//! tolerance can straddle a boundary and land in neighbouring cells.

use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// An action reported by an executing agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// A pointer action at screen or page coordinates.
    Spatial { name: String, x: f64, y: f64 },
    /// A tool invocation with JSON arguments.
    Call { name: String, arguments: Value },
}

impl Action {
    pub fn spatial(name: impl Into<String>, x: f64, y: f64) -> Self {
        Action::Spatial {
            name: name.into(),
            x,
            y,
        }
    }

    pub fn call(name: impl Into<String>, arguments: Value) -> Self {
        Action::Call {
            name: name.into(),
            arguments,
        }
    }

    /// Builds an action from a tool call, treating calls that carry numeric
    /// `x` and `y` arguments as spatial.
    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        let name = name.into();
        let coords = arguments
            .get("x")
            .and_then(Value::as_f64)
            .zip(arguments.get("y").and_then(Value::as_f64));
        match coords {
            Some((x, y)) => Action::Spatial { name, x, y },
            None => Action::Call { name, arguments },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Action::Spatial { name, .. } | Action::Call { name, .. } => name,
        }
    }
}

/// Canonical key of an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ActionKey(String);

impl ActionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The action could not be reduced to a key.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SignatureError {
    #[error("Action has an empty name")]
    EmptyName,

    #[error("Action '{name}' has a non-finite coordinate")]
    NonFiniteCoordinate { name: String },

    #[error("Coordinate tolerance must be positive and finite, got {0}")]
    InvalidTolerance(f64),

    #[error("Failed to serialize action arguments: {0}")]
    Serialization(String),
}

/// Reduces an action to its canonical key.
pub fn canonicalize(action: &Action, tolerance: f64) -> Result<ActionKey, SignatureError> {
    let name = normalize_name(action.name());
    if name.is_empty() {
        return Err(SignatureError::EmptyName);
    }

    match action {
        Action::Spatial { x, y, .. } => {
            if !tolerance.is_finite() || tolerance <= 0.0 {
                return Err(SignatureError::InvalidTolerance(tolerance));
            }
            if !x.is_finite() || !y.is_finite() {
                return Err(SignatureError::NonFiniteCoordinate { name });
            }
            let bx = bucket(*x, tolerance);
            let by = bucket(*y, tolerance);
            Ok(ActionKey(format!("spatial:{}@{},{}", name, bx, by)))
        }
        Action::Call { arguments, .. } => {
            let normalized = normalize_value(arguments);
            let args = serde_json::to_string(&normalized)
                .map_err(|e| SignatureError::Serialization(e.to_string()))?;
            Ok(ActionKey(format!("call:{}:{}", name, args)))
        }
    }
}

fn bucket(value: f64, tolerance: f64) -> i64 {
    (value / tolerance).round() as i64
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

fn normalize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, normalize_value(v)))
                .collect();
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k.trim().to_string(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_value).collect()),
        Value::String(s) => Value::String(s.split_whitespace().collect::<Vec<_>>().join(" ")),
        Value::Number(n) => normalize_number(n),
        other => other.clone(),
    }
}

fn normalize_number(n: &Number) -> Value {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
            Value::Number(Number::from(f as i64))
        }
        _ => Value::Number(n.clone()),
    }
}
