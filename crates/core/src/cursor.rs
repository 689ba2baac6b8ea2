//! Opaque, lexically-sortable cursors over a tenant's event timeline.
//!
//! A cursor is a 13-digit zero-padded millisecond epoch followed by an
//! underscore and a short random disambiguator, e.g.
//! `1770000000000_3fa9c1d24b07`. Zero-padding keeps lexical order equal
//! to chronological order for any epoch that fits in 13 digits (until
//! roughly the year 2286).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TIMESTAMP_DIGITS: usize = 13;
const DISAMBIGUATOR_CHARS: usize = 12;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Cursor positioned at the given instant, with a fresh disambiguator.
    /// Pre-epoch instants clamp to the epoch.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        let millis = timestamp.timestamp_millis().max(0);
        let disambiguator = Uuid::new_v4().simple().to_string();
        Self(format!("{millis:013}_{}", &disambiguator[..DISAMBIGUATOR_CHARS]))
    }

    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Wrap a caller-supplied token without validating it. Comparison stays
    /// purely lexical, so an arbitrary token still partitions the timeline;
    /// only `timestamp()` requires the encoded form.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Decode the embedded instant. Returns `None` for tokens that do not
    /// carry a 13-digit millisecond prefix.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let prefix = self.0.split_once('_').map(|(head, _)| head).unwrap_or(self.0.as_str());
        if prefix.len() != TIMESTAMP_DIGITS || !prefix.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        let millis = prefix.parse::<i64>().ok()?;
        DateTime::from_timestamp_millis(millis)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
