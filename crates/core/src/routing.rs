//! Call-routing rules and the time-window matcher.
//!
//! Rules are authored in an external admin surface and arrive as JSON, so
//! field values are treated as untrusted: a time range that does not parse
//! as `HH:MM` never matches, an unknown weekday tag is ignored, and a
//! missing priority sorts last. The matcher itself only ever compares
//! wall-clock time-of-day and weekday; resolving the tenant's timezone
//! (including DST) is the caller's job.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Priority assigned to rules without a usable one; sorts after any
/// explicitly prioritized rule.
pub const FALLBACK_PRIORITY: i32 = 9999;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl TimeRange {
    /// Half-open containment with overnight wraparound: `start < end` means
    /// `start <= t < end`; `start >= end` wraps midnight, matching
    /// `t >= start || t < end` (e.g. 22:00-06:00). Unparseable bounds never
    /// match.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let (Some(start), Some(end)) = (parse_hhmm(&self.start), parse_hhmm(&self.end)) else {
            return false;
        };
        if start < end {
            start <= time && time < end
        } else {
            time >= start || time < end
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoutingAction {
    Forward { number: String },
    ConnectAgent { agent: Option<String> },
    Voicemail,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub name: String,
    /// Weekday tags such as `"mon"` or `"Friday"`. An empty list never
    /// matches; it is not shorthand for "every day".
    #[serde(default)]
    pub days: Vec<String>,
    #[serde(default)]
    pub time_ranges: Vec<TimeRange>,
    pub action: RoutingAction,
    #[serde(default)]
    pub priority: Option<i32>,
}

impl RoutingRule {
    pub fn effective_priority(&self) -> i32 {
        self.priority.unwrap_or(FALLBACK_PRIORITY)
    }

    fn applies_on(&self, weekday: Weekday) -> bool {
        self.days.iter().filter_map(|tag| tag.trim().parse::<Weekday>().ok()).any(|d| d == weekday)
    }

    fn matches(&self, at: NaiveDateTime) -> bool {
        self.applies_on(at.weekday()) && self.time_ranges.iter().any(|range| range.contains(at.time()))
    }
}

/// Resolve which rule handles a call at the given wall-clock instant.
///
/// Rules are stable-sorted by (priority ascending, original position), and
/// the first rule with a matching weekday and time range wins. `None` means
/// no rule matched; the caller owns the default-routing decision.
pub fn resolve(at: NaiveDateTime, rules: &[RoutingRule]) -> Option<&RoutingRule> {
    let mut ordered: Vec<(usize, &RoutingRule)> = rules.iter().enumerate().collect();
    ordered.sort_by_key(|(index, rule)| (rule.effective_priority(), *index));

    ordered.into_iter().map(|(_, rule)| rule).find(|rule| rule.matches(at))
}

fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}
