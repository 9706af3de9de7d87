//! Emission event records as produced by the rules engine.
//!
//! Emissions are transient input: the merge engine projects each one into a
//! compact requestor entry and never stores the record itself. Every field
//! is read leniently so one odd record cannot fail a whole batch.

use serde::{Deserialize, Serialize};

use crate::coerce::{deserialize_group_key, deserialize_optional_truthy};
use crate::ids::{ContactId, EmissionId, TargetId};
use crate::timestamp::deserialize_lenient;

/// The contact an emission is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmissionContact {
    /// Contact document id.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ContactId>,

    /// When the contact was reported, in epoch milliseconds.
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub reported_date: Option<i64>,
}

/// One reported pass/fail event for a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emission {
    /// Emission id; the same id reported by two contacts is one emission.
    #[serde(rename = "_id")]
    pub id: EmissionId,

    /// The target this emission counts towards.
    #[serde(rename = "type")]
    pub target: TargetId,

    /// Reporting contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<EmissionContact>,

    /// Whether the monitored condition was satisfied. Absent means `false`;
    /// other values are read by truthiness.
    #[serde(
        default,
        deserialize_with = "deserialize_optional_truthy",
        skip_serializing_if = "Option::is_none"
    )]
    pub pass: Option<bool>,

    /// Event time in epoch milliseconds.
    #[serde(
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<i64>,

    /// Grouping key for threshold targets. Numbers read as their string
    /// form.
    #[serde(
        rename = "groupBy",
        default,
        deserialize_with = "deserialize_group_key",
        skip_serializing_if = "Option::is_none"
    )]
    pub group_by: Option<String>,

    /// Tombstone flag.
    #[serde(
        default,
        deserialize_with = "deserialize_optional_truthy",
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted: Option<bool>,
}

impl Emission {
    /// Create an emission reported by `contact`.
    pub fn new(
        id: impl Into<EmissionId>,
        target: impl Into<TargetId>,
        contact: impl Into<ContactId>,
        pass: bool,
    ) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            contact: Some(EmissionContact {
                id: Some(contact.into()),
                reported_date: None,
            }),
            pass: Some(pass),
            date: None,
            group_by: None,
            deleted: None,
        }
    }

    /// Set the event date.
    #[must_use]
    pub const fn with_date(mut self, date: i64) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the grouping key.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group_by = Some(group.into());
        self
    }

    /// Set the contact's reported date.
    #[must_use]
    pub fn reported_at(mut self, reported_date: i64) -> Self {
        if let Some(contact) = self.contact.as_mut() {
            contact.reported_date = Some(reported_date);
        }
        self
    }

    /// Mark the emission as deleted.
    #[must_use]
    pub const fn deleted(mut self) -> Self {
        self.deleted = Some(true);
        self
    }

    /// The reporting contact id, if present and non-empty.
    pub fn requestor(&self) -> Option<&ContactId> {
        self.contact
            .as_ref()
            .and_then(|contact| contact.id.as_ref())
            .filter(|id| !id.is_empty())
    }

    /// The contact's reported date, used to order competing requestors.
    pub fn reported_date(&self) -> Option<i64> {
        self.contact.as_ref().and_then(|contact| contact.reported_date)
    }

    /// Whether the emission passed.
    pub fn passes(&self) -> bool {
        self.pass.unwrap_or(false)
    }

    /// Whether the emission is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_rules_engine_record() {
        let raw = json!({
            "_id": "report-1~pregnancy-registrations",
            "type": "pregnancy-registrations",
            "contact": { "_id": "patient-1", "reported_date": 1_600_000_000_000_i64 },
            "pass": true,
            "date": 1_600_000_100_000_i64,
            "groupBy": "household-1"
        });
        let emission: Result<Emission, _> = serde_json::from_value(raw);
        assert!(emission.is_ok());
        if let Ok(emission) = emission {
            assert!(emission.passes());
            assert!(!emission.is_deleted());
            assert_eq!(emission.requestor().map(ContactId::as_str), Some("patient-1"));
            assert_eq!(emission.reported_date(), Some(1_600_000_000_000));
            assert_eq!(emission.group_by.as_deref(), Some("household-1"));
        }
    }

    #[test]
    fn empty_contact_id_has_no_requestor() {
        let emission = Emission::new("e", "t", "", true);
        assert!(emission.requestor().is_none());
    }

    #[test]
    fn loose_flags_and_numeric_group_are_coerced() {
        let raw = json!({
            "_id": "e",
            "type": "t",
            "contact": { "_id": "c" },
            "pass": 1,
            "groupBy": 42,
            "deleted": 0
        });
        let emission: Result<Emission, _> = serde_json::from_value(raw);
        assert!(matches!(emission, Ok(ref e) if e.passes() && !e.is_deleted()));
        assert_eq!(
            emission.ok().and_then(|e| e.group_by),
            Some("42".to_owned())
        );
    }

    #[test]
    fn malformed_date_reads_as_none() {
        let raw = json!({ "_id": "e", "type": "t", "date": "soon" });
        let emission: Result<Emission, _> = serde_json::from_value(raw);
        assert!(matches!(emission, Ok(ref e) if e.date.is_none() && !e.passes()));
    }
}
