//! Target definitions supplied once at state creation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::TargetId;

/// The scoring type of a target.
///
/// Serialized as the bare string. Kinds other than `count` and `percent`
/// are kept verbatim so a stored definition round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TargetKind {
    /// Plain pass count.
    #[default]
    Count,
    /// Pass count plus a rounded percentage of the total.
    Percent,
    /// Any other kind reported by the configuration.
    Other(String),
}

impl TargetKind {
    /// The wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Count => "count",
            Self::Percent => "percent",
            Self::Other(kind) => kind,
        }
    }

    /// Whether aggregation should report a percentage.
    pub const fn is_percent(&self) -> bool {
        matches!(self, Self::Percent)
    }
}

impl From<String> for TargetKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "count" => Self::Count,
            "percent" => Self::Percent,
            _ => Self::Other(kind),
        }
    }
}

impl From<TargetKind> for String {
    fn from(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Count => Self::from("count"),
            TargetKind::Percent => Self::from("percent"),
            TargetKind::Other(kind) => kind,
        }
    }
}

/// The `passesIfGroupCount` threshold of a grouped target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupCountThreshold {
    /// Minimum number of passing emissions a group needs to pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<i64>,
}

impl GroupCountThreshold {
    /// The threshold in effect, if any. A zero threshold is inactive.
    pub fn active(&self) -> Option<i64> {
        self.gte.filter(|gte| *gte != 0)
    }
}

/// A monitored metric definition.
///
/// Display metadata is carried through to the aggregate untouched. Fields
/// the engine does not know about are kept in [`extra`](Self::extra) so
/// the stored state round-trips, but they never reach the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDefinition {
    /// Target identifier; emissions reference it through their `type`.
    pub id: TargetId,

    /// Scoring kind.
    #[serde(rename = "type", default)]
    pub kind: TargetKind,

    /// Goal shown next to the score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<i64>,

    /// Translation key of the target title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation_key: Option<String>,

    /// Literal target title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Icon name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Translation key of the subtitle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle_translation_key: Option<String>,

    /// Whether the target is shown to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,

    /// Group threshold; switches scoring to per-group counting.
    #[serde(
        rename = "passesIfGroupCount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub passes_if_group_count: Option<GroupCountThreshold>,

    /// Unrecognised definition fields, preserved as-is.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TargetDefinition {
    /// Create a definition with no display metadata.
    pub fn new(id: impl Into<TargetId>, kind: TargetKind) -> Self {
        Self {
            id: id.into(),
            kind,
            goal: None,
            translation_key: None,
            name: None,
            icon: None,
            subtitle_translation_key: None,
            visible: None,
            passes_if_group_count: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the goal.
    #[must_use]
    pub const fn with_goal(mut self, goal: i64) -> Self {
        self.goal = Some(goal);
        self
    }

    /// Set the group threshold.
    #[must_use]
    pub const fn with_group_threshold(mut self, gte: i64) -> Self {
        self.passes_if_group_count = Some(GroupCountThreshold { gte: Some(gte) });
        self
    }

    /// Set the literal name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The group threshold in effect, if any.
    pub fn group_threshold(&self) -> Option<i64> {
        self.passes_if_group_count
            .as_ref()
            .and_then(GroupCountThreshold::active)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unknown_kind_round_trips() {
        let kind: TargetKind = serde_json::from_value(json!("ratio")).unwrap_or_default();
        assert_eq!(kind, TargetKind::Other("ratio".to_owned()));
        assert_eq!(serde_json::to_value(&kind).ok(), Some(json!("ratio")));
    }

    #[test]
    fn parses_full_definition() {
        let raw = json!({
            "id": "pregnancy-registrations",
            "type": "percent",
            "goal": 80,
            "translation_key": "targets.pregnancy.title",
            "icon": "icon-pregnancy",
            "visible": true,
            "passesIfGroupCount": { "gte": 2 },
            "context": "user.parent.type === 'health_center'"
        });
        let def: Result<TargetDefinition, _> = serde_json::from_value(raw);
        assert!(def.is_ok());
        let def = def.unwrap_or_else(|_| TargetDefinition::new("x", TargetKind::Count));
        assert!(def.kind.is_percent());
        assert_eq!(def.goal, Some(80));
        assert_eq!(def.group_threshold(), Some(2));
        assert!(def.extra.contains_key("context"));
    }

    #[test]
    fn zero_threshold_is_inactive() {
        let def = TargetDefinition::new("t", TargetKind::Count).with_group_threshold(0);
        assert_eq!(def.group_threshold(), None);
    }

    #[test]
    fn missing_type_defaults_to_count() {
        let def: Result<TargetDefinition, _> = serde_json::from_value(json!({ "id": "t" }));
        assert!(matches!(def, Ok(ref d) if d.kind == TargetKind::Count));
    }
}
