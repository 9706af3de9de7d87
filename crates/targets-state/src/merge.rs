//! The emission merge engine.
//!
//! Each call runs two phases against the state:
//!
//! 1. **Clear** -- every entry previously contributed by the given contacts
//!    is removed (all entries when no contacts are given). A contact that
//!    resubmits its observations supersedes everything it sent before.
//! 2. **Merge** -- each usable emission is upserted as
//!    `targets[type].emissions[id][contact]`.
//!
//! Emissions for an unknown target, without a contact id, or flagged as
//! deleted are dropped without error. Drops can be observed through a
//! [`MergeObserver`]; observing never changes what is merged.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use targets_types::{ContactId, Emission, EmissionId};

use crate::error::TargetStateError;
use crate::store::{RequestorEntry, TargetState};

/// Why an emission was left out of the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    /// The record could not be read as an emission.
    Malformed,
    /// No target with the emission's `type` exists.
    UnknownTarget,
    /// The emission has no usable contact id.
    MissingRequestor,
    /// The emission is a tombstone.
    Deleted,
}

/// Counts for a single merge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeStats {
    /// Requestor entries removed by the clear phase.
    pub cleared: usize,
    /// Requestor entries written by the merge phase.
    pub written: usize,
    /// Writes that inserted a new entry or replaced a different one.
    pub changed: usize,
    /// Emissions dropped.
    pub dropped: usize,
}

impl MergeStats {
    /// Whether either phase changed the state.
    pub const fn is_updated(&self) -> bool {
        self.cleared > 0 || self.changed > 0
    }
}

/// Diagnostics hook for the merge engine.
pub trait MergeObserver {
    /// Called once for every dropped emission.
    fn emission_dropped(&mut self, emission_id: Option<&EmissionId>, reason: DropReason);

    /// Called once when the merge call finishes.
    fn merge_completed(&mut self, _stats: &MergeStats) {}
}

/// An observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl MergeObserver for NoopObserver {
    fn emission_dropped(&mut self, _emission_id: Option<&EmissionId>, _reason: DropReason) {}
}

/// An observer that tallies drops by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountingObserver {
    /// Unreadable records.
    pub malformed: usize,
    /// Emissions referencing an unknown target.
    pub unknown_target: usize,
    /// Emissions without a contact id.
    pub missing_requestor: usize,
    /// Deleted emissions.
    pub deleted: usize,
    /// Completed merge calls.
    pub merges: usize,
}

impl CountingObserver {
    /// Total drops across all reasons.
    pub const fn total_dropped(&self) -> usize {
        self.malformed
            .saturating_add(self.unknown_target)
            .saturating_add(self.missing_requestor)
            .saturating_add(self.deleted)
    }
}

impl MergeObserver for CountingObserver {
    fn emission_dropped(&mut self, _emission_id: Option<&EmissionId>, reason: DropReason) {
        let counter = match reason {
            DropReason::Malformed => &mut self.malformed,
            DropReason::UnknownTarget => &mut self.unknown_target,
            DropReason::MissingRequestor => &mut self.missing_requestor,
            DropReason::Deleted => &mut self.deleted,
        };
        *counter = counter.saturating_add(1);
    }

    fn merge_completed(&mut self, _stats: &MergeStats) {
        self.merges = self.merges.saturating_add(1);
    }
}

/// Apply a batch of emissions reported by `contact_ids`.
///
/// Returns `true` when the clear or merge phase changed at least one
/// requestor entry.
pub fn store_emissions(
    state: &mut TargetState,
    contact_ids: Option<&[ContactId]>,
    emissions: &[Emission],
) -> bool {
    store_emissions_observed(state, contact_ids, emissions, &mut NoopObserver).is_updated()
}

/// [`store_emissions`], reporting drops and counts to `observer`.
pub fn store_emissions_observed(
    state: &mut TargetState,
    contact_ids: Option<&[ContactId]>,
    emissions: &[Emission],
    observer: &mut dyn MergeObserver,
) -> MergeStats {
    let mut stats = MergeStats {
        cleared: clear_emissions(state, contact_ids),
        ..MergeStats::default()
    };
    merge_emissions(state, emissions, observer, &mut stats);
    finish(&stats, observer);
    stats
}

/// Apply a batch given as an untyped JSON value.
///
/// `emissions` must be a JSON array; anything else is rejected with
/// [`TargetStateError::InvalidArgument`] before the state is touched.
/// Array elements that do not read as emissions are dropped.
pub fn store_emission_values(
    state: &mut TargetState,
    contact_ids: Option<&[ContactId]>,
    emissions: &Value,
) -> Result<bool, TargetStateError> {
    store_emission_values_observed(state, contact_ids, emissions, &mut NoopObserver)
        .map(|stats| stats.is_updated())
}

/// [`store_emission_values`], reporting drops and counts to `observer`.
pub fn store_emission_values_observed(
    state: &mut TargetState,
    contact_ids: Option<&[ContactId]>,
    emissions: &Value,
    observer: &mut dyn MergeObserver,
) -> Result<MergeStats, TargetStateError> {
    let Value::Array(records) = emissions else {
        return Err(TargetStateError::InvalidArgument {
            reason: format!("emissions must be an array, got {}", json_kind(emissions)),
        });
    };

    let mut malformed = 0_usize;
    let parsed: Vec<Emission> = records
        .iter()
        .filter_map(|record| match Emission::deserialize(record) {
            Ok(emission) => Some(emission),
            Err(e) => {
                trace!(error = %e, "dropping unreadable emission record");
                observer.emission_dropped(None, DropReason::Malformed);
                malformed = malformed.saturating_add(1);
                None
            }
        })
        .collect();

    let mut stats = MergeStats {
        cleared: clear_emissions(state, contact_ids),
        dropped: malformed,
        ..MergeStats::default()
    };
    merge_emissions(state, &parsed, observer, &mut stats);
    finish(&stats, observer);
    Ok(stats)
}

/// Remove prior contributions. Returns the number of entries removed.
fn clear_emissions(state: &mut TargetState, contact_ids: Option<&[ContactId]>) -> usize {
    let mut cleared = 0_usize;

    for target in state.targets.values_mut() {
        match contact_ids {
            None => {
                cleared = cleared.saturating_add(target.requestor_count());
                target.emissions.clear();
            }
            Some(contact_ids) => {
                for requestors in target.emissions.values_mut() {
                    for contact_id in contact_ids {
                        if requestors.remove(contact_id).is_some() {
                            cleared = cleared.saturating_add(1);
                        }
                    }
                }
                target.emissions.retain(|_, requestors| !requestors.is_empty());
            }
        }
    }

    cleared
}

fn merge_emissions(
    state: &mut TargetState,
    emissions: &[Emission],
    observer: &mut dyn MergeObserver,
    stats: &mut MergeStats,
) {
    for emission in emissions {
        let Some(target) = state.targets.get_mut(&emission.target) else {
            drop_emission(emission, DropReason::UnknownTarget, observer, stats);
            continue;
        };
        let Some(requestor) = emission.requestor() else {
            drop_emission(emission, DropReason::MissingRequestor, observer, stats);
            continue;
        };
        if emission.is_deleted() {
            drop_emission(emission, DropReason::Deleted, observer, stats);
            continue;
        }

        let entry = RequestorEntry::from_emission(emission);
        let requestors = target.emissions.entry(emission.id.clone()).or_default();
        let unchanged = requestors.get(requestor) == Some(&entry);
        requestors.insert(requestor.clone(), entry);

        stats.written = stats.written.saturating_add(1);
        if !unchanged {
            stats.changed = stats.changed.saturating_add(1);
        }
    }
}

fn drop_emission(
    emission: &Emission,
    reason: DropReason,
    observer: &mut dyn MergeObserver,
    stats: &mut MergeStats,
) {
    trace!(emission_id = %emission.id, target_id = %emission.target, ?reason, "dropping emission");
    observer.emission_dropped(Some(&emission.id), reason);
    stats.dropped = stats.dropped.saturating_add(1);
}

fn finish(stats: &MergeStats, observer: &mut dyn MergeObserver) {
    debug!(
        cleared = stats.cleared,
        written = stats.written,
        changed = stats.changed,
        dropped = stats.dropped,
        "stored target emissions"
    );
    observer.merge_completed(stats);
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
