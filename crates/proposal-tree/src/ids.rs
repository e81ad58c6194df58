//! Identifier newtypes
//!
//! Backend ids are opaque strings. Locally created nodes get a ULID so an
//! optimistic insert has a stable id before the backend confirms it.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh id (ULID)
            #[inline]
            #[must_use]
            pub fn generate() -> Self {
                Self(Ulid::new().to_string())
            }

            /// Borrow as string slice
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Section identifier
    SectionId
);

string_id!(
    /// Task identifier
    TaskId
);

string_id!(
    /// Project identifier (scopes every backend query)
    ProjectId
);

/// Id of any outline node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// A section
    Section(SectionId),
    /// A task
    Task(TaskId),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Section(id) => write!(f, "section {id}"),
            Self::Task(id) => write!(f, "task {id}"),
        }
    }
}

impl From<SectionId> for NodeId {
    fn from(id: SectionId) -> Self {
        Self::Section(id)
    }
}

impl From<TaskId> for NodeId {
    fn from(id: TaskId) -> Self {
        Self::Task(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = SectionId::generate();
        let b = SectionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 26);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = TaskId::from("t-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"t-1\"");
        let back: TaskId = serde_json::from_str("\"t-1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn node_id_display_names_kind() {
        assert_eq!(NodeId::from(SectionId::from("s")).to_string(), "section s");
        assert_eq!(NodeId::from(TaskId::from("t")).to_string(), "task t");
    }
}
