//! The aggregation engine.
//!
//! Rolls stored emissions up into one [`TargetValue`] per target over an
//! optional inclusive date window. Per target:
//!
//! 1. Entries outside the window are ignored.
//! 2. Among the remaining entries of one emission id, the entry with the
//!    greatest `order` is selected; entries without an order lose to any
//!    entry with one, and the first entry in contact id order wins ties.
//! 3. Without a group threshold, `pass` counts passing selections and
//!    `total` counts all selections. With `passesIfGroupCount.gte = T`,
//!    selections without a `groupBy` are ignored, `total` counts distinct
//!    groups, and `pass` counts groups with at least `T` passing entries.
//! 4. Percent targets also get `round(pass * 100 / total)`, or `0` for an
//!    empty total.

use std::collections::BTreeMap;

use tracing::debug;

use targets_types::{AggregateSnapshot, AggregatedTarget, FilterInterval, TargetValue};

use crate::store::{RequestorEntry, Requestors, Target, TargetState};

/// Result of [`aggregate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOutcome {
    /// The freshly computed snapshot.
    pub aggregate: AggregateSnapshot,
    /// Whether any target's `pass` or `total` differs from the cached
    /// snapshot. Always `false` when the state was not updated.
    pub is_updated: bool,
}

/// Compute a snapshot and, when `update_state` is set, cache it on the
/// state for change detection.
///
/// The cached snapshot is replaced whenever `update_state` is set, even if
/// nothing changed.
pub fn aggregate(
    state: &mut TargetState,
    filter_interval: Option<FilterInterval>,
    update_state: bool,
) -> AggregateOutcome {
    let snapshot = compute_aggregate(state, filter_interval);

    if !update_state {
        return AggregateOutcome {
            aggregate: snapshot,
            is_updated: false,
        };
    }

    let is_updated = has_changed(&state.aggregate, &snapshot);
    state.aggregate = snapshot.clone();
    debug!(targets = snapshot.targets.len(), is_updated, "aggregated target emissions");

    AggregateOutcome {
        aggregate: snapshot,
        is_updated,
    }
}

/// Compute a snapshot without touching the state.
pub fn compute_aggregate(
    state: &TargetState,
    filter_interval: Option<FilterInterval>,
) -> AggregateSnapshot {
    let targets = state
        .targets()
        .map(|target| {
            AggregatedTarget::describe(
                &target.definition,
                score_target(target, filter_interval.as_ref()),
            )
        })
        .collect();

    AggregateSnapshot {
        filter_interval,
        targets,
    }
}

/// Score a single target over an optional window.
pub fn score_target(target: &Target, filter_interval: Option<&FilterInterval>) -> TargetValue {
    let selected = target
        .emissions
        .values()
        .filter_map(|requestors| select_latest(requestors, filter_interval));

    let (pass, total) = match target.definition.group_threshold() {
        None => count_entries(selected),
        Some(threshold) => count_groups(selected, threshold),
    };

    let percent = target
        .definition
        .kind
        .is_percent()
        .then(|| rounded_percent(pass, total));

    TargetValue {
        pass,
        total,
        percent,
    }
}

/// Pick the entry of the latest requestor among those inside the window.
fn select_latest<'a>(
    requestors: &'a Requestors,
    filter_interval: Option<&FilterInterval>,
) -> Option<&'a RequestorEntry> {
    requestors
        .values()
        .filter(|entry| filter_interval.is_none_or(|interval| interval.contains(entry.date)))
        .fold(None::<&RequestorEntry>, |best, entry| match best {
            Some(best) if entry.order <= best.order => Some(best),
            _ => Some(entry),
        })
}

fn count_entries<'a>(entries: impl Iterator<Item = &'a RequestorEntry>) -> (u64, u64) {
    entries.fold((0, 0), |(pass, total), entry| {
        (
            if entry.pass { pass.saturating_add(1) } else { pass },
            total.saturating_add(1),
        )
    })
}

fn count_groups<'a>(
    entries: impl Iterator<Item = &'a RequestorEntry>,
    threshold: i64,
) -> (u64, u64) {
    // group -> passing entries
    let mut groups: BTreeMap<&str, i64> = BTreeMap::new();
    for entry in entries {
        let Some(group) = entry.group_by.as_deref().filter(|group| !group.is_empty()) else {
            continue;
        };
        let passed = groups.entry(group).or_insert(0);
        if entry.pass {
            *passed = passed.saturating_add(1);
        }
    }

    groups.values().fold((0, 0), |(pass, total), passed| {
        (
            if *passed >= threshold { pass.saturating_add(1) } else { pass },
            total.saturating_add(1),
        )
    })
}

/// Half-up rounded percentage in exact integer arithmetic.
fn rounded_percent(pass: u64, total: u64) -> u32 {
    let percent = pass
        .saturating_mul(200)
        .saturating_add(total)
        .checked_div(total.saturating_mul(2))
        .unwrap_or(0);
    u32::try_from(percent).unwrap_or(u32::MAX)
}

fn has_changed(previous: &AggregateSnapshot, current: &AggregateSnapshot) -> bool {
    current.targets.iter().any(|target| {
        previous.find(target.id.as_str()).is_none_or(|cached| {
            cached.value.pass != target.value.pass || cached.value.total != target.value.total
        })
    })
}
