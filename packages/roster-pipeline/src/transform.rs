//! Field Transformer primitives
//!
//! Every function here is total: bad input becomes [`Parsed::Invalid`] (or an
//! empty default) and is judged later by validation. Nothing in this module
//! rejects a record.

use chrono::{DateTime, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};

use crate::extract::RawRecord;

/// A source column: the persisted field name plus legacy header spellings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

impl Column {
    pub const fn new(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { name, aliases }
    }

    /// Header spellings, preferred first
    pub fn spellings(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

/// Outcome of coercing one raw value
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    /// Column missing or empty
    Absent,
    /// Text that could not be coerced (kept for the violation message)
    Invalid(String),
    Valid(T),
}

impl<T> Parsed<T> {
    pub fn valid(&self) -> Option<&T> {
        match self {
            Parsed::Valid(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Parsed::Absent)
    }
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Parsed::Absent
    }
}

impl<T: Default> Parsed<T> {
    /// Treat a missing value as the type's default (empty list, zero)
    pub fn or_default(self) -> Self {
        match self {
            Parsed::Absent => Parsed::Valid(T::default()),
            other => other,
        }
    }
}

// Only valid values reach the store; validation guarantees required fields are Valid.
impl<T: Serialize> Serialize for Parsed<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Parsed::Valid(v) => v.serialize(serializer),
            Parsed::Absent | Parsed::Invalid(_) => serializer.serialize_none(),
        }
    }
}

fn lookup<'r>(raw: &'r RawRecord, column: &Column) -> Option<&'r str> {
    raw.get(column).filter(|v| !v.is_empty())
}

/// Trimmed text, empty when missing
pub fn text(raw: &RawRecord, column: &Column) -> String {
    lookup(raw, column).unwrap_or_default().to_string()
}

/// Text mapped to its canonical spelling when recognised, unchanged otherwise
pub fn canonical(
    raw: &RawRecord,
    column: &Column,
    canonicalize: fn(&str) -> Option<&'static str>,
) -> String {
    let value = text(raw, column);
    match canonicalize(&value) {
        Some(canon) => canon.to_string(),
        None => value,
    }
}

pub fn integer(raw: &RawRecord, column: &Column) -> Parsed<i64> {
    match lookup(raw, column) {
        None => Parsed::Absent,
        Some(v) => v
            .parse::<i64>()
            .map(Parsed::Valid)
            .unwrap_or_else(|_| Parsed::Invalid(v.to_string())),
    }
}

pub fn number(raw: &RawRecord, column: &Column) -> Parsed<f64> {
    match lookup(raw, column) {
        None => Parsed::Absent,
        Some(v) => match v.parse::<f64>() {
            Ok(n) if n.is_finite() => Parsed::Valid(n),
            _ => Parsed::Invalid(v.to_string()),
        },
    }
}

pub fn date(raw: &RawRecord, column: &Column) -> Parsed<NaiveDate> {
    match lookup(raw, column) {
        None => Parsed::Absent,
        Some(v) => parse_date(v)
            .map(Parsed::Valid)
            .unwrap_or_else(|| Parsed::Invalid(v.to_string())),
    }
}

/// `YYYY-MM-DD`, or an RFC 3339 timestamp whose date part is kept
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

/// Comma-separated ids, order kept, blanks dropped
pub fn id_list(raw: &RawRecord, column: &Column) -> Vec<String> {
    lookup(raw, column)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Embedded JSON array; missing means empty, malformed is `Invalid(reason)`
pub fn json_list<T: DeserializeOwned>(raw: &RawRecord, column: &Column) -> Parsed<Vec<T>> {
    match lookup(raw, column) {
        None => Parsed::Valid(Vec::new()),
        Some(v) => serde_json::from_str::<Vec<T>>(v)
            .map(Parsed::Valid)
            .unwrap_or_else(|e| Parsed::Invalid(e.to_string())),
    }
}
