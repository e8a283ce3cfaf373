//! Strong type definitions for docsync.
//!
//! Server identifiers are opaque strings. They are wrapped in newtypes so a
//! change token can never be passed where an object id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a raw server string.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow the raw server string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_string_id!(
    /// Server-assigned identifier of a document, folder or working copy.
    RemoteId
);

opaque_string_id!(
    /// Server-issued opaque version stamp.
    ///
    /// Equality implies no remote change since the token was observed.
    ChangeToken
);

/// What kind of object a record or event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    File,
    Folder,
    Unknown,
}

impl ObjectKind {
    /// Stable name used by persistent stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::File => "File",
            ObjectKind::Folder => "Folder",
            ObjectKind::Unknown => "Unknown",
        }
    }

    /// Parse a stored name. Anything unrecognised maps to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "File" => ObjectKind::File,
            "Folder" => ObjectKind::Folder,
            _ => ObjectKind::Unknown,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
