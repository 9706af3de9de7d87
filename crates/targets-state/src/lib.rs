//! Target state store, emission merge, and aggregation engine.
//!
//! This crate turns a stream of target emissions into per-target scores.
//! It performs no I/O: the caller owns the [`TargetState`], feeds it
//! emission batches, asks it for snapshots, and persists it however it
//! likes.
//!
//! # Architecture
//!
//! - [`store`] -- The [`TargetState`] shape, persisted-blob classification,
//!   and migration of stale blobs.
//! - [`merge`] -- Cancellation-then-merge of emission batches.
//! - [`aggregate`] -- Windowed scoring and cached-snapshot change detection.
//!
//! # Concurrency
//!
//! Everything is synchronous. Merging and updating aggregation take
//! `&mut TargetState`, so the borrow checker enforces the single-writer
//! discipline; [`compute_aggregate`] takes `&TargetState` and may run on
//! many readers at once.
//!
//! # Usage
//!
//! ```
//! use targets_state::{aggregate, store_emissions, TargetState};
//! use targets_types::{ContactId, Emission, FilterInterval, TargetDefinition, TargetKind};
//!
//! let mut state = TargetState::new(&[
//!     TargetDefinition::new("visits", TargetKind::Percent).with_goal(80),
//! ]);
//!
//! let contact = ContactId::new("chw-1");
//! let batch = [
//!     Emission::new("report-1~visits", "visits", "chw-1", true).with_date(1_000),
//!     Emission::new("report-2~visits", "visits", "chw-1", false).with_date(2_000),
//! ];
//! assert!(store_emissions(&mut state, Some(std::slice::from_ref(&contact)), &batch));
//!
//! let outcome = aggregate(&mut state, Some(FilterInterval::new(0, 5_000)), true);
//! let visits = outcome.aggregate.find("visits");
//! assert_eq!(visits.map(|t| t.value.percent), Some(Some(50)));
//! assert!(outcome.is_updated);
//! ```

pub mod aggregate;
pub mod error;
pub mod merge;
pub mod store;

// Re-export primary types at crate root.
pub use aggregate::{AggregateOutcome, aggregate, compute_aggregate, score_target};
pub use error::TargetStateError;
pub use merge::{
    CountingObserver, DropReason, MergeObserver, MergeStats, NoopObserver, store_emission_values,
    store_emission_values_observed, store_emissions, store_emissions_observed,
};
pub use store::{
    RequestorEntry, Requestors, StoredState, Target, TargetState, Targets, is_stale, migrate,
};
