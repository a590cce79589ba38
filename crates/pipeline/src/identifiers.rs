//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! a [`CredentialSlot`] with a [`SubQuestionIndex`] even though both are `usize`
//! under the hood, or passing a search keyword where a document URL is expected.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new value, returning `None` if it is empty or whitespace.
            ///
            /// Surrounding whitespace is trimmed.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Self(trimmed.to_string()))
                }
            }

            /// Returns the value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for usize-wrapped positional newtypes.
// Generates: struct (Copy), new(), as_usize(), Display.
// ---------------------------------------------------------------------------
macro_rules! index_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new index from a raw position.
            pub fn new(value: usize) -> Self {
                Self(value)
            }

            /// Returns the underlying position.
            pub fn as_usize(self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single research job from submission to terminal state.
///
/// Generated at submission time and returned to the caller immediately; used
/// as the Job Store key and propagated through every span of the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a new random job identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`JobId`] from an existing UUID (e.g. parsed from a request path).
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: positional
// ---------------------------------------------------------------------------

index_id! {
    /// Position of a credential within its rotation pool.
    ///
    /// Slots are stable for the lifetime of the pool; rotation moves a cursor
    /// over them, never reorders them.
    CredentialSlot
}

index_id! {
    /// Position of a sub-question within the decomposition of its job.
    ///
    /// Sub-questions run concurrently, but the final answer always presents
    /// them in ascending index order.
    SubQuestionIndex
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed (generated or discovered text)
// ---------------------------------------------------------------------------

string_id! {
    /// A web-search keyword produced by keyword generation.
    ///
    /// Empty keywords returned by a model are discarded at construction.
    Keyword
}

string_id! {
    /// Absolute URL of a downloadable document discovered by a [`crate::DocumentFinder`].
    DocumentUrl
}
