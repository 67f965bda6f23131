//! Trigger entries and their durable key/value layout.

use crate::store::{StoreError, StoreResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespace of durable monitor keys: `monitor:{pair}:{direction}`.
pub const MONITOR_PREFIX: &str = "monitor:";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Which side of the market a trigger watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "l" => Ok(Direction::Long),
            "short" | "s" => Ok(Direction::Short),
            other => Err(format!("invalid direction '{other}', expected 'long' or 'short'")),
        }
    }
}

/// User-configured price trigger for a (pair, direction).
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorEntry {
    pub pair: String,
    pub direction: Direction,
    pub limit_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl MonitorEntry {
    pub fn new(pair: impl Into<String>, direction: Direction, limit_price: Decimal) -> Self {
        Self {
            pair: pair.into(),
            direction,
            limit_price,
            updated_at: Utc::now(),
        }
    }

    /// Entries with a non-positive limit never trigger.
    pub fn is_actionable(&self) -> bool {
        self.limit_price > Decimal::ZERO
    }

    pub fn durable_key(&self) -> String {
        durable_key(&self.pair, self.direction)
    }

    /// Serialize the durable snapshot.
    pub fn to_record_json(&self) -> StoreResult<String> {
        let record = MonitorRecord {
            timestamp: self.updated_at.format(TIMESTAMP_FORMAT).to_string(),
            pair: self.pair.clone(),
            direct: self.direction.as_str().to_string(),
            price: self.limit_price,
        };
        Ok(serde_json::to_string(&record)?)
    }

    /// Rebuild an entry from a durable key and its value.
    ///
    /// Pair and direction come from the key; the payload only has to carry
    /// the price.
    pub fn from_record(key: &str, value: &str) -> StoreResult<Self> {
        let (pair, direction) = parse_durable_key(key)?;
        let record: MonitorRecord = serde_json::from_str(value)?;
        let updated_at = NaiveDateTime::parse_from_str(&record.timestamp, TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .unwrap_or_else(|_| Utc::now());

        Ok(Self {
            pair,
            direction,
            limit_price: record.price,
            updated_at,
        })
    }
}

/// Durable snapshot of a trigger.
#[derive(Debug, Serialize, Deserialize)]
struct MonitorRecord {
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    pair: String,
    #[serde(default)]
    direct: String,
    #[serde(with = "rust_decimal::serde::float")]
    price: Decimal,
}

pub(crate) fn durable_key(pair: &str, direction: Direction) -> String {
    format!("{MONITOR_PREFIX}{pair}:{direction}")
}

/// Split `monitor:{pair}:{direction}`. Pairs may contain `:`, so the
/// direction is whatever follows the last separator.
pub(crate) fn parse_durable_key(key: &str) -> StoreResult<(String, Direction)> {
    let rest = key
        .strip_prefix(MONITOR_PREFIX)
        .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
    let (pair, direction) = rest
        .rsplit_once(':')
        .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
    if pair.is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    let direction = direction
        .parse::<Direction>()
        .map_err(|_| StoreError::InvalidKey(key.to_string()))?;
    Ok((pair.to_string(), direction))
}
