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

//! Domain wrappers for identifiers and timestamps.
//!
//! These are the types used at the API boundary and in business logic. The
//! Diesel row types in [`crate::dal`] store plain `TEXT` and convert to and
//! from these wrappers at the DAL boundary, which keeps Diesel trait impls out
//! of the domain model.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Task identifier.
///
/// Stored as the hyphenated string form in SQLite.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct UniversalUuid(pub Uuid);

impl UniversalUuid {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Hyphenated lowercase form used for `TEXT` storage.
    pub fn to_storage(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl fmt::Display for UniversalUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UniversalUuid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(UniversalUuid)
    }
}

impl From<Uuid> for UniversalUuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<UniversalUuid> for Uuid {
    fn from(wrapper: UniversalUuid) -> Self {
        wrapper.0
    }
}

// 9999-12-31T23:59:59Z and 0000-01-01T00:00:00Z
const LATEST_STORABLE_SECS: i64 = 253_402_300_799;
const EARLIEST_STORABLE_SECS: i64 = -62_167_219_200;

/// UTC timestamp wrapper.
///
/// The storage form is RFC 3339 with microsecond precision and a `Z` suffix.
/// Every stored value between years 0 and 9999 has the same width, so SQLite
/// string comparison orders timestamps chronologically. Claim ordering and
/// readiness checks rely on it.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct UniversalTimestamp(pub DateTime<Utc>);

impl UniversalTimestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }

    /// Fixed-width RFC 3339 form for SQLite `TEXT` storage.
    pub fn to_storage(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Parse any RFC 3339 string, normalizing to UTC.
    pub fn from_rfc3339(s: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(s).map(|dt| UniversalTimestamp(dt.with_timezone(&Utc)))
    }

    /// Latest instant with a fixed-width storage form (`9999-12-31T23:59:59.999999Z`).
    pub fn latest_storable() -> Self {
        Self(
            DateTime::from_timestamp(LATEST_STORABLE_SECS, 999_999_000)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    /// Earliest instant with a fixed-width storage form (`0000-01-01T00:00:00.000000Z`).
    pub fn earliest_storable() -> Self {
        Self(DateTime::from_timestamp(EARLIEST_STORABLE_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    /// Whether [`to_storage`](Self::to_storage) yields a four-digit year.
    /// Years outside 0..=9999 gain a sign prefix and break string ordering.
    pub fn is_storable(&self) -> bool {
        *self >= Self::earliest_storable() && *self <= Self::latest_storable()
    }

    /// Returns this timestamp shifted by `duration`, saturating at
    /// [`latest_storable`](Self::latest_storable).
    pub fn plus(&self, duration: std::time::Duration) -> Self {
        let latest = Self::latest_storable();
        Duration::from_std(duration)
            .ok()
            .and_then(|delta| self.0.checked_add_signed(delta))
            .map(Self)
            .filter(|shifted| *shifted <= latest)
            .unwrap_or(latest)
    }

    /// Returns this timestamp moved back by `duration`, saturating at
    /// [`earliest_storable`](Self::earliest_storable).
    pub fn minus(&self, duration: std::time::Duration) -> Self {
        let earliest = Self::earliest_storable();
        Duration::from_std(duration)
            .ok()
            .and_then(|delta| self.0.checked_sub_signed(delta))
            .map(Self)
            .filter(|shifted| *shifted >= earliest)
            .unwrap_or(earliest)
    }
}

impl fmt::Display for UniversalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_storage())
    }
}

impl From<DateTime<Utc>> for UniversalTimestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<UniversalTimestamp> for DateTime<Utc> {
    fn from(wrapper: UniversalTimestamp) -> Self {
        wrapper.0
    }
}

/// Helper function for current timestamp
pub fn current_timestamp() -> UniversalTimestamp {
    UniversalTimestamp::now()
}
