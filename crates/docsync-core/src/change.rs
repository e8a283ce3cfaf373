//! Change classifications.
//!
//! Local and remote sides are tracked independently: an event may carry
//! `local = Changed` and `remote = Changed` at the same time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How one side of an object changed since the last successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeType {
    None,
    Created,
    Changed,
    Deleted,
    Moved,
}

impl ChangeType {
    /// Every change type, in declaration order.
    pub const ALL: [ChangeType; 5] = [
        ChangeType::None,
        ChangeType::Created,
        ChangeType::Changed,
        ChangeType::Deleted,
        ChangeType::Moved,
    ];

    /// True for `None`.
    pub fn is_none(&self) -> bool {
        matches!(self, ChangeType::None)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::None => "NONE",
            ChangeType::Created => "CREATED",
            ChangeType::Changed => "CHANGED",
            ChangeType::Deleted => "DELETED",
            ChangeType::Moved => "MOVED",
        };
        f.write_str(name)
    }
}

/// Whether the bytes of a file changed, independent of its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentChangeType {
    None,
    Created,
    Changed,
    Deleted,
}

impl ContentChangeType {
    /// True for anything other than `None`.
    pub fn is_changed(&self) -> bool {
        !matches!(self, ContentChangeType::None)
    }
}

impl Default for ContentChangeType {
    fn default() -> Self {
        ContentChangeType::None
    }
}

/// Change kind reported by the server's change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteChangeType {
    Created,
    Updated,
    Deleted,
    Security,
}

impl RemoteChangeType {
    /// Specificity used when several log entries name the same object in one
    /// poll. Higher wins.
    pub fn specificity(&self) -> u8 {
        match self {
            RemoteChangeType::Security => 0,
            RemoteChangeType::Updated => 1,
            RemoteChangeType::Created => 2,
            RemoteChangeType::Deleted => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deletion_is_most_specific() {
        let others = [
            RemoteChangeType::Created,
            RemoteChangeType::Updated,
            RemoteChangeType::Security,
        ];
        for other in others {
            assert!(RemoteChangeType::Deleted.specificity() > other.specificity());
        }
    }

    #[test]
    fn test_change_type_display() {
        assert_eq!(ChangeType::Moved.to_string(), "MOVED");
        assert!(ChangeType::None.is_none());
        assert!(!ContentChangeType::None.is_changed());
        assert!(ContentChangeType::Deleted.is_changed());
    }
}
