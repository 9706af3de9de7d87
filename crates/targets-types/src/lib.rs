//! Shared type definitions for the target aggregation engine.
//!
//! Everything that crosses the engine boundary lives here: target
//! definitions coming from configuration, emission records coming from the
//! rules engine, and the aggregate snapshot handed to the rendering layer.
//! Snapshot types flow downstream to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`coerce`] -- Truthy flags and stringified grouping keys
//! - [`ids`] -- String newtypes for target, contact, and emission ids
//! - [`definition`] -- Target definitions and group thresholds
//! - [`emission`] -- Emission event records
//! - [`snapshot`] -- Filter interval and aggregate snapshot
//! - [`timestamp`] -- Lenient epoch-millisecond parsing

pub mod coerce;
pub mod definition;
pub mod emission;
pub mod ids;
pub mod snapshot;
pub mod timestamp;

// Re-export all public types at crate root for convenience.
pub use definition::{GroupCountThreshold, TargetDefinition, TargetKind};
pub use emission::{Emission, EmissionContact};
pub use ids::{ContactId, EmissionId, TargetId};
pub use snapshot::{AggregateSnapshot, AggregatedTarget, FilterInterval, TargetValue};
