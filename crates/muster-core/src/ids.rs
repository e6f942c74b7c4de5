//! Branded integer identifiers.
//!
//! Entities and sessions are keyed by `INTEGER PRIMARY KEY` rows, not UUIDs —
//! these newtypes keep a profile id from being passed where a session id is
//! expected without paying for a string allocation on every lookup.

use std::fmt;

macro_rules! int_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            #[must_use]
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

int_id!(ProfileId);
int_id!(InfoCopyId);
int_id!(RequestId);
int_id!(SessionId);

/// A group id is generic over the kind of member it holds; the kind is
/// tracked separately (see [`crate::kinds::GroupKind`]) rather than encoded
/// into the type, since groups of all three kinds share one code path in
/// the store layer.
int_id!(GroupId);
