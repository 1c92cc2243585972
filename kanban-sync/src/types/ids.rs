//! Strongly-typed identifiers
//!
//! New ids are ULIDs. Ids hydrated from the remote service are accepted as-is,
//! so any non-empty string is a valid id.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh ULID-backed id
            pub fn new() -> Self {
                Self(Ulid::new().to_string())
            }

            /// Wrap an existing id string
            pub fn from_string(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the inner string value
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&$name> for $name {
            fn from(id: &$name) -> Self {
                id.clone()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Identifier of a project (one board per project)
    ProjectId
);
define_id!(
    /// Identifier of a column
    ColumnId
);
define_id!(
    /// Identifier of an item (card)
    ItemId
);
define_id!(
    /// Identifier of an emitted activity event
    ActivityEventId
);
define_id!(
    /// Identifier of a single pipeline invocation
    MutationId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_ulids() {
        let id = ItemId::new();
        assert_eq!(id.as_str().len(), 26);
        assert_ne!(id, ItemId::new());
    }

    #[test]
    fn test_from_string_roundtrips_display() {
        let id = ColumnId::from_string("todo");
        assert_eq!(id.to_string(), "todo");
        assert_eq!(ColumnId::from("todo"), id);
    }

    #[test]
    fn test_serializes_transparently() {
        let id = ProjectId::from("p1");
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("p1"));
    }
}
