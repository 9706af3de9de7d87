//! Replays emission batches against a persisted target state.
//!
//! A batch file is a JSON array of
//! `{ "contactIds": [..] | null, "emissions": [..] }` objects, applied in
//! order. `contactIds: null` resets every stored emission before merging.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use targets_state::{CountingObserver, TargetState, is_stale, store_emission_values_observed};
use targets_types::{ContactId, TargetDefinition};

use crate::error::CliError;

/// One batch of emissions reported for a set of contacts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmissionBatch {
    /// Contacts whose previous emissions are cancelled; `None` clears all.
    #[serde(rename = "contactIds", default)]
    pub contact_ids: Option<Vec<ContactId>>,

    /// The emission records, passed to the engine unvalidated.
    #[serde(default)]
    pub emissions: Value,
}

/// Summary of a replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Batches read from the file.
    pub batches: usize,
    /// Batches that changed the state.
    pub updated: usize,
    /// Batches rejected as invalid. They leave the state untouched.
    pub rejected: usize,
    /// Drop counters across all batches.
    pub drops: CountingObserver,
}

/// Load the persisted state, or build a fresh one from `definitions` when
/// no state file exists. Stale blobs are migrated.
pub fn load_state(path: &Path, definitions: &[TargetDefinition]) -> Result<TargetState, CliError> {
    if !path.exists() {
        info!(
            path = %path.display(),
            targets = definitions.len(),
            "No state file, creating empty state"
        );
        return Ok(TargetState::new(definitions));
    }

    let contents = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let blob: Value = serde_json::from_str(&contents)?;
    if is_stale(&blob) {
        warn!(path = %path.display(), "State file has a stale shape, migrating");
    }
    Ok(TargetState::from_value(blob))
}

/// Write the state back as pretty-printed JSON.
pub fn save_state(path: &Path, state: &TargetState) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(&state.to_value()?)?;
    std::fs::write(path, json).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a batch file.
pub fn load_batches(path: &Path) -> Result<Vec<EmissionBatch>, CliError> {
    let contents = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&contents)?)
}

/// Apply every batch in order.
///
/// A batch whose `emissions` is not an array is rejected and skipped; the
/// remaining batches still apply.
pub fn apply_batches(state: &mut TargetState, batches: &[EmissionBatch]) -> ReplayReport {
    let mut report = ReplayReport {
        batches: batches.len(),
        ..ReplayReport::default()
    };

    for (index, batch) in batches.iter().enumerate() {
        let result = store_emission_values_observed(
            state,
            batch.contact_ids.as_deref(),
            &batch.emissions,
            &mut report.drops,
        );
        match result {
            Ok(stats) if stats.is_updated() => {
                report.updated = report.updated.saturating_add(1);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(batch = index, error = %e, "Rejected emission batch");
                report.rejected = report.rejected.saturating_add(1);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use targets_types::TargetKind;

    use super::*;

    fn batches(raw: Value) -> Vec<EmissionBatch> {
        serde_json::from_value(raw).unwrap_or_default()
    }

    #[test]
    fn applies_batches_in_order() {
        let mut state = TargetState::new(&[TargetDefinition::new("visits", TargetKind::Count)]);
        let raw = json!([
            {
                "contactIds": ["c1"],
                "emissions": [
                    { "_id": "e1", "type": "visits", "contact": { "_id": "c1" }, "pass": true },
                    { "_id": "e2", "type": "unknown", "contact": { "_id": "c1" }, "pass": true }
                ]
            },
            { "contactIds": ["c1"], "emissions": "not an array" },
            { "contactIds": ["c1"], "emissions": [] }
        ]);

        let report = apply_batches(&mut state, &batches(raw));

        assert_eq!(report.batches, 3);
        assert_eq!(report.updated, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.drops.unknown_target, 1);
        assert_eq!(report.drops.merges, 2);
        assert_eq!(state.requestor_count(), 0);
    }

    #[test]
    fn missing_contact_ids_reads_as_full_reset() {
        let parsed = batches(json!([{ "emissions": [] }]));
        assert_eq!(parsed.len(), 1);
        assert!(parsed.iter().all(|b| b.contact_ids.is_none()));
    }
}
