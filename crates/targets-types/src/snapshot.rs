//! Aggregate snapshot types consumed by the rendering layer.
//!
//! These are exported to `TypeScript` via `ts-rs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::definition::{TargetDefinition, TargetKind};
use crate::ids::TargetId;

/// An inclusive date range in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FilterInterval {
    /// First included instant.
    #[ts(type = "number")]
    pub start: i64,
    /// Last included instant.
    #[ts(type = "number")]
    pub end: i64,
}

impl FilterInterval {
    /// Create an interval from epoch milliseconds.
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Create an interval from two UTC instants.
    pub fn from_datetimes(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: start.timestamp_millis(),
            end: end.timestamp_millis(),
        }
    }

    /// Whether `date` lies within the interval, bounds included.
    ///
    /// A missing date is never contained. An inverted interval contains
    /// nothing.
    pub const fn contains(&self, date: Option<i64>) -> bool {
        match date {
            Some(date) => self.start <= date && date <= self.end,
            None => false,
        }
    }
}

/// Computed score of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TargetValue {
    /// Passing emissions, or passing groups for threshold targets.
    #[ts(type = "number")]
    pub pass: u64,
    /// Counted emissions, or distinct groups for threshold targets.
    #[ts(type = "number")]
    pub total: u64,
    /// Rounded `pass * 100 / total`; only set for percent targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub percent: Option<u32>,
}

/// A target descriptor together with its computed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AggregatedTarget {
    /// Target identifier.
    pub id: TargetId,
    /// Scoring kind.
    #[serde(rename = "type", default)]
    #[ts(type = "string")]
    pub kind: TargetKind,
    /// Goal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional, type = "number")]
    pub goal: Option<i64>,
    /// Translation key of the title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub translation_key: Option<String>,
    /// Literal title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub name: Option<String>,
    /// Icon name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub icon: Option<String>,
    /// Translation key of the subtitle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub subtitle_translation_key: Option<String>,
    /// Visibility flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub visible: Option<bool>,
    /// Computed score.
    pub value: TargetValue,
}

impl AggregatedTarget {
    /// Copy the whitelisted descriptive fields of `definition`.
    pub fn describe(definition: &TargetDefinition, value: TargetValue) -> Self {
        Self {
            id: definition.id.clone(),
            kind: definition.kind.clone(),
            goal: definition.goal,
            translation_key: definition.translation_key.clone(),
            name: definition.name.clone(),
            icon: definition.icon.clone(),
            subtitle_translation_key: definition.subtitle_translation_key.clone(),
            visible: definition.visible,
            value,
        }
    }
}

/// Point-in-time scores for every target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AggregateSnapshot {
    /// The interval the snapshot was computed over; `None` means all time.
    #[serde(rename = "filterInterval", default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub filter_interval: Option<FilterInterval>,
    /// One entry per target, in definition order.
    #[serde(default)]
    pub targets: Vec<AggregatedTarget>,
}

impl AggregateSnapshot {
    /// Find the entry for a target.
    pub fn find(&self, id: &str) -> Option<&AggregatedTarget> {
        self.targets.iter().find(|target| target.id.as_str() == id)
    }

    /// Whether no target has been aggregated yet.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn interval_bounds_are_inclusive() {
        let interval = FilterInterval::new(100, 200);
        assert!(interval.contains(Some(100)));
        assert!(interval.contains(Some(200)));
        assert!(!interval.contains(Some(99)));
        assert!(!interval.contains(Some(201)));
        assert!(!interval.contains(None));
    }

    #[test]
    fn interval_from_datetimes() {
        let start = DateTime::from_timestamp_millis(1_000).unwrap_or_default();
        let end = DateTime::from_timestamp_millis(2_000).unwrap_or_default();
        assert_eq!(FilterInterval::from_datetimes(start, end), FilterInterval::new(1_000, 2_000));
    }

    #[test]
    fn aggregated_target_omits_absent_fields() {
        let definition = TargetDefinition::new("visits", TargetKind::Count).with_goal(10);
        let value = TargetValue {
            pass: 1,
            total: 2,
            percent: None,
        };
        let target = AggregatedTarget::describe(&definition, value);
        assert_eq!(
            serde_json::to_value(&target).ok(),
            Some(json!({
                "id": "visits",
                "type": "count",
                "goal": 10,
                "value": { "pass": 1, "total": 2 }
            }))
        );
    }

    #[test]
    fn empty_cache_parses_from_empty_object() {
        let snapshot: Result<AggregateSnapshot, _> = serde_json::from_value(json!({}));
        assert!(matches!(snapshot, Ok(ref s) if s.is_empty() && s.filter_interval.is_none()));
    }
}
