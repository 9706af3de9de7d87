//! The target state store.
//!
//! A [`TargetState`] holds one [`Target`] per definition. Each target keeps
//! the compact projection of every emission it has received:
//!
//! ```text
//! targets:
//!   <target id>:
//!     id, type, goal, ...           (the definition, flattened)
//!     emissions:
//!       <emission id>:
//!         <contact id>: { pass, groupBy, date, order }
//! aggregate: { filterInterval, targets: [...] }
//! ```
//!
//! At most one [`RequestorEntry`] exists per (target, emission, contact);
//! a resubmission overwrites it in place.
//!
//! # Persisted blobs
//!
//! Older releases stored the bare `targets` map without the wrapping
//! object. [`StoredState::from_value`] classifies a raw blob as
//! [`StoredState::Current`] or [`StoredState::Legacy`], and [`migrate`]
//! turns either into a [`TargetState`].

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use targets_types::coerce::{deserialize_group_key, deserialize_truthy, is_truthy};
use targets_types::timestamp::deserialize_lenient;
use targets_types::{
    AggregateSnapshot, ContactId, Emission, EmissionId, TargetDefinition, TargetId,
};

use crate::error::TargetStateError;

/// Order value older blobs wrote for contacts without a `reported_date`.
const LEGACY_NO_ORDER: i64 = -1;

/// Requestor entries of one emission, keyed by reporting contact.
pub type Requestors = BTreeMap<ContactId, RequestorEntry>;

/// Targets keyed by id, in definition order.
pub type Targets = IndexMap<TargetId, Target>;

// ---------------------------------------------------------------------------
// Requestor entry
// ---------------------------------------------------------------------------

/// One emission as contributed by one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestorEntry {
    /// Whether the emission passed.
    #[serde(default, deserialize_with = "deserialize_truthy")]
    pub pass: bool,

    /// Grouping key for threshold targets.
    #[serde(
        rename = "groupBy",
        default,
        deserialize_with = "deserialize_group_key",
        skip_serializing_if = "Option::is_none"
    )]
    pub group_by: Option<String>,

    /// Event time in epoch milliseconds.
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<i64>,

    /// The contact's reported date. Only used to pick one entry when
    /// several contacts report the same emission; entries without an order
    /// lose to any entry with one.
    #[serde(
        default,
        deserialize_with = "deserialize_order",
        skip_serializing_if = "Option::is_none"
    )]
    pub order: Option<i64>,
}

impl RequestorEntry {
    /// Project an emission into its stored form.
    pub fn from_emission(emission: &Emission) -> Self {
        Self {
            pass: emission.passes(),
            group_by: emission.group_by.clone(),
            date: emission.date,
            order: emission.reported_date(),
        }
    }
}

fn deserialize_order<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let order = deserialize_lenient(deserializer)?;
    Ok(order.filter(|order| *order != LEGACY_NO_ORDER))
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// A target definition plus the emissions stored against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// The immutable definition.
    #[serde(flatten)]
    pub definition: TargetDefinition,

    /// Emission id to requestor entries.
    #[serde(default)]
    pub emissions: BTreeMap<EmissionId, Requestors>,
}

impl Target {
    /// Create a target with no emissions.
    pub const fn new(definition: TargetDefinition) -> Self {
        Self {
            definition,
            emissions: BTreeMap::new(),
        }
    }

    /// The target id.
    pub const fn id(&self) -> &TargetId {
        &self.definition.id
    }

    /// Requestor entries stored for one emission.
    pub fn requestors(&self, emission_id: &str) -> Option<&Requestors> {
        self.emissions.get(emission_id)
    }

    /// Number of requestor entries across all emissions.
    pub fn requestor_count(&self) -> usize {
        self.emissions.values().map(BTreeMap::len).sum()
    }
}

// ---------------------------------------------------------------------------
// Target state
// ---------------------------------------------------------------------------

/// The complete engine state: targets plus the cached aggregate.
///
/// Mutation goes through `&mut TargetState`, so a reader holding a shared
/// reference never observes a half-applied merge. Targets keep the order of
/// their definitions, which is the order the aggregate reports them in.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TargetState {
    pub(crate) targets: Targets,
    pub(crate) aggregate: AggregateSnapshot,
}

impl TargetState {
    /// Build an empty state with one target per definition.
    ///
    /// A repeated definition id replaces the earlier definition but keeps
    /// its position.
    pub fn new(definitions: &[TargetDefinition]) -> Self {
        let targets = definitions
            .iter()
            .map(|definition| (definition.id.clone(), Target::new(definition.clone())))
            .collect();
        Self {
            targets,
            aggregate: AggregateSnapshot::default(),
        }
    }

    /// Rehydrate a persisted blob, migrating it if it is stale.
    pub fn from_value(value: Value) -> Self {
        migrate(StoredState::from_value(value))
    }

    /// Serialize the state for persistence.
    pub fn to_value(&self) -> Result<Value, TargetStateError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Look up a target.
    pub fn target(&self, id: &str) -> Option<&Target> {
        self.targets.get(id)
    }

    /// All targets, in definition order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    /// Number of targets.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// The aggregate cached by the last updating aggregation.
    pub const fn cached_aggregate(&self) -> &AggregateSnapshot {
        &self.aggregate
    }

    /// Number of requestor entries across all targets.
    pub fn requestor_count(&self) -> usize {
        self.targets.values().map(Target::requestor_count).sum()
    }
}

// ---------------------------------------------------------------------------
// Persisted shapes and migration
// ---------------------------------------------------------------------------

/// A persisted blob, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredState {
    /// The current `{ targets, aggregate }` shape.
    Current(TargetState),
    /// A bare targets map written by an older release.
    Legacy(Targets),
}

impl StoredState {
    /// Classify a raw blob.
    ///
    /// Never fails. Stored content is read entry by entry: a requestor
    /// entry that cannot be read is dropped on its own, a target without an
    /// `id` takes its map key, and an unreadable cached aggregate is
    /// discarded.
    pub fn from_value(value: Value) -> Self {
        if is_stale(&value) {
            let targets = match value {
                Value::Object(map) => read_targets(map),
                _ => Targets::new(),
            };
            return Self::Legacy(targets);
        }

        let Value::Object(mut map) = value else {
            return Self::Legacy(Targets::new());
        };
        let targets = match map.remove("targets") {
            Some(Value::Object(targets)) => read_targets(targets),
            _ => Targets::new(),
        };
        let aggregate = map
            .remove("aggregate")
            .and_then(|aggregate| serde_json::from_value(aggregate).ok())
            .unwrap_or_default();
        Self::Current(TargetState { targets, aggregate })
    }

    /// Whether the blob needs migration.
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}

impl From<StoredState> for TargetState {
    fn from(stored: StoredState) -> Self {
        migrate(stored)
    }
}

/// Whether a raw blob lacks the `targets` or `aggregate` field.
///
/// `null`, non-objects, and fields holding a falsy value all count as
/// stale.
pub fn is_stale(value: &Value) -> bool {
    match value {
        Value::Object(map) => !is_truthy(map.get("targets")) || !is_truthy(map.get("aggregate")),
        _ => true,
    }
}

/// Upgrade a classified blob to the current shape.
///
/// A legacy map becomes the `targets` of the new state with its emissions
/// kept; the cached aggregate starts empty.
pub fn migrate(stored: StoredState) -> TargetState {
    match stored {
        StoredState::Current(state) => state,
        StoredState::Legacy(targets) => {
            debug!(targets = targets.len(), "migrating stale target state");
            TargetState {
                targets,
                aggregate: AggregateSnapshot::default(),
            }
        }
    }
}

fn read_targets(map: Map<String, Value>) -> Targets {
    map.into_iter()
        .filter_map(|(key, value)| {
            let target = read_target(&key, value)?;
            Some((TargetId::new(key), target))
        })
        .collect()
}

fn read_target(key: &str, value: Value) -> Option<Target> {
    let Value::Object(mut fields) = value else {
        warn!(target_id = %key, "dropping stored target that is not an object");
        return None;
    };

    let emissions = match fields.remove("emissions") {
        Some(Value::Object(emissions)) => read_emissions(key, emissions),
        _ => BTreeMap::new(),
    };
    let has_id = fields
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    if !has_id {
        fields.insert("id".to_owned(), Value::String(key.to_owned()));
    }

    match TargetDefinition::deserialize(Value::Object(fields)) {
        Ok(definition) => Some(Target {
            definition,
            emissions,
        }),
        Err(e) => {
            warn!(target_id = %key, error = %e, "dropping unreadable stored target");
            None
        }
    }
}

fn read_emissions(
    target_id: &str,
    emissions: Map<String, Value>,
) -> BTreeMap<EmissionId, Requestors> {
    let mut kept = BTreeMap::new();
    for (emission_id, requestors) in emissions {
        let Value::Object(requestors) = requestors else {
            warn!(target_id, emission_id = %emission_id, "dropping unreadable stored emission");
            continue;
        };
        let requestors: Requestors = requestors
            .into_iter()
            .filter_map(|(contact_id, entry)| match RequestorEntry::deserialize(entry) {
                Ok(entry) => Some((ContactId::new(contact_id), entry)),
                Err(e) => {
                    warn!(
                        target_id,
                        emission_id = %emission_id,
                        contact_id = %contact_id,
                        error = %e,
                        "dropping unreadable requestor entry"
                    );
                    None
                }
            })
            .collect();
        if !requestors.is_empty() {
            kept.insert(EmissionId::new(emission_id), requestors);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use targets_types::TargetKind;

    use super::*;

    fn definitions() -> Vec<TargetDefinition> {
        vec![
            TargetDefinition::new("visits", TargetKind::Count).with_goal(10),
            TargetDefinition::new("coverage", TargetKind::Percent),
        ]
    }

    #[test]
    fn new_state_has_empty_targets() {
        let state = TargetState::new(&definitions());
        assert_eq!(state.target_count(), 2);
        assert_eq!(state.requestor_count(), 0);
        assert!(state.cached_aggregate().is_empty());
        assert!(state.target("visits").is_some_and(|t| t.emissions.is_empty()));
    }

    #[test]
    fn new_state_without_definitions_is_empty() {
        let state = TargetState::new(&[]);
        assert_eq!(state.target_count(), 0);
    }

    #[test]
    fn serialized_state_is_not_stale() {
        let state = TargetState::new(&definitions());
        let value = state.to_value().unwrap_or(Value::Null);
        assert!(!is_stale(&value));
        assert_eq!(TargetState::from_value(value), state);
    }

    #[test]
    fn stale_shapes() {
        assert!(is_stale(&Value::Null));
        assert!(is_stale(&json!({ "targets": {} })));
        assert!(is_stale(&json!({ "aggregate": {} })));
        assert!(is_stale(&json!({ "targets": {}, "aggregate": null })));
        assert!(!is_stale(&json!({ "targets": {}, "aggregate": {} })));
    }

    #[test]
    fn legacy_map_keeps_emissions() {
        let legacy = json!({
            "visits": {
                "id": "visits",
                "type": "count",
                "emissions": {
                    "e1": { "c1": { "pass": true, "date": 5, "order": 10 } }
                }
            }
        });
        let stored = StoredState::from_value(legacy);
        assert!(stored.is_stale());

        let state = migrate(stored);
        assert!(state.cached_aggregate().is_empty());
        let entry = state
            .target("visits")
            .and_then(|t| t.requestors("e1"))
            .and_then(|r| r.get("c1"));
        assert_eq!(
            entry,
            Some(&RequestorEntry {
                pass: true,
                group_by: None,
                date: Some(5),
                order: Some(10),
            })
        );
    }

    #[test]
    fn unreadable_legacy_entries_are_dropped() {
        let legacy = json!({
            "visits": { "id": "visits" },
            "broken": "not a target",
        });
        let state = TargetState::from_value(legacy);
        assert_eq!(state.target_count(), 1);
        assert!(state.target("broken").is_none());
    }

    #[test]
    fn unreadable_requestor_entries_are_dropped_alone() {
        let legacy = json!({
            "visits": {
                "id": "visits",
                "type": "count",
                "emissions": {
                    "e1": { "c1": { "pass": true, "date": 5, "order": 10 } },
                    "e2": {
                        "c2": { "pass": 1, "date": 6, "groupBy": 7 },
                        "c3": "not an entry"
                    },
                    "e3": { "c4": 42 }
                }
            },
            "noid": {
                "type": "count",
                "emissions": { "e1": { "c1": { "pass": true } } }
            }
        });

        let state = TargetState::from_value(legacy);

        assert_eq!(state.target_count(), 2);
        assert_eq!(state.requestor_count(), 3);

        let visits = state.target("visits");
        assert!(visits.is_some_and(|t| t.requestors("e1").is_some_and(|r| r.len() == 1)));
        assert!(visits.is_some_and(|t| t.requestors("e3").is_none()));
        let coerced = visits
            .and_then(|t| t.requestors("e2"))
            .and_then(|r| r.get("c2"));
        assert_eq!(
            coerced,
            Some(&RequestorEntry {
                pass: true,
                group_by: Some("7".to_owned()),
                date: Some(6),
                order: None,
            })
        );

        let noid = state.target("noid");
        assert_eq!(noid.map(|t| t.id().as_str()), Some("noid"));
        assert!(noid.is_some_and(|t| t.requestor_count() == 1));
    }

    #[test]
    fn duplicate_definition_ids_keep_the_last_definition() {
        let state = TargetState::new(&[
            TargetDefinition::new("visits", TargetKind::Count).with_goal(1),
            TargetDefinition::new("coverage", TargetKind::Percent),
            TargetDefinition::new("visits", TargetKind::Percent).with_goal(5),
        ]);

        assert_eq!(state.target_count(), 2);
        let visits = state.target("visits").map(|t| &t.definition);
        assert_eq!(visits.and_then(|d| d.goal), Some(5));
        assert!(visits.is_some_and(|d| d.kind.is_percent()));
    }

    #[test]
    fn targets_keep_definition_order() {
        let state = TargetState::new(&[
            TargetDefinition::new("zeta", TargetKind::Count),
            TargetDefinition::new("alpha", TargetKind::Count),
        ]);
        let ids: Vec<&str> = state.targets().map(|t| t.id().as_str()).collect();
        assert_eq!(ids, ["zeta", "alpha"]);

        let restored = TargetState::from_value(state.to_value().unwrap_or(Value::Null));
        let ids: Vec<&str> = restored.targets().map(|t| t.id().as_str()).collect();
        assert_eq!(ids, ["zeta", "alpha"]);
    }

    #[test]
    fn null_blob_migrates_to_empty_state() {
        let state = TargetState::from_value(Value::Null);
        assert_eq!(state, TargetState::default());
    }

    #[test]
    fn legacy_sentinel_order_reads_as_none() {
        let entry: Result<RequestorEntry, _> =
            serde_json::from_value(json!({ "pass": false, "date": 1, "order": -1 }));
        assert!(matches!(entry, Ok(ref e) if e.order.is_none()));

        let zero: Result<RequestorEntry, _> =
            serde_json::from_value(json!({ "pass": false, "order": 0 }));
        assert!(matches!(zero, Ok(ref e) if e.order == Some(0)));
    }

    #[test]
    fn unknown_definition_fields_round_trip() {
        let raw = json!({
            "targets": {
                "visits": { "id": "visits", "type": "count", "context": "true", "emissions": {} }
            },
            "aggregate": {}
        });
        let state = TargetState::from_value(raw);
        let value = state.to_value().unwrap_or(Value::Null);
        assert_eq!(value["targets"]["visits"]["context"], json!("true"));
    }
}
