//! Type-safe identifier wrappers around document id strings.
//!
//! Targets, contacts, and emissions are all keyed by opaque string ids
//! coming from the document store. Wrapping them keeps a contact id from
//! being used where an emission id is expected.

use std::borrow::Borrow;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner [`String`] value.
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Whether the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Identifier of a target definition (e.g. `households-visited`).
    TargetId
}

define_id! {
    /// Identifier of a reporting contact (the requestor of an emission).
    ContactId
}

define_id! {
    /// Identifier of an emission. Several contacts may report the same one.
    EmissionId
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn id_serializes_as_bare_string() {
        let id = ContactId::new("chw-1");
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json.as_deref(), Some("\"chw-1\""));
    }

    #[test]
    fn id_display_matches_inner() {
        let id = TargetId::from("deliveries");
        assert_eq!(id.to_string(), "deliveries");
        assert_eq!(id.as_str(), "deliveries");
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = BTreeMap::new();
        map.insert(EmissionId::new("e1"), 1_u8);
        assert_eq!(map.get("e1"), Some(&1));
    }
}
