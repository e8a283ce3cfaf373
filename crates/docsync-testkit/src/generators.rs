//! Proptest generators for property-based testing.

use proptest::prelude::*;

use docsync_core::{ChangeType, ContentChangeType, ObjectKind, RemoteChangeType, WatcherChangeType};

/// Generate a per-side change type.
pub fn change_type() -> impl Strategy<Value = ChangeType> {
    prop_oneof![
        Just(ChangeType::None),
        Just(ChangeType::Created),
        Just(ChangeType::Changed),
        Just(ChangeType::Deleted),
        Just(ChangeType::Moved),
    ]
}

/// Generate a content change type.
pub fn content_change_type() -> impl Strategy<Value = ContentChangeType> {
    prop_oneof![
        Just(ContentChangeType::None),
        Just(ContentChangeType::Created),
        Just(ContentChangeType::Changed),
        Just(ContentChangeType::Deleted),
    ]
}

/// Generate a synchronizable object kind.
pub fn object_kind() -> impl Strategy<Value = ObjectKind> {
    prop_oneof![Just(ObjectKind::File), Just(ObjectKind::Folder)]
}

/// Generate a change-log entry type.
pub fn remote_change_type() -> impl Strategy<Value = RemoteChangeType> {
    prop_oneof![
        Just(RemoteChangeType::Created),
        Just(RemoteChangeType::Updated),
        Just(RemoteChangeType::Deleted),
        Just(RemoteChangeType::Security),
    ]
}

/// Generate a raw watcher notification kind.
pub fn watcher_change_type() -> impl Strategy<Value = WatcherChangeType> {
    prop_oneof![
        Just(WatcherChangeType::Created),
        Just(WatcherChangeType::Changed),
        Just(WatcherChangeType::Deleted),
    ]
}

/// Generate a file name valid on every platform.
pub fn file_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}\\.(txt|docx|bin)".prop_map(String::from)
}

/// Generate a folder name valid on every platform.
pub fn folder_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}".prop_map(String::from)
}

/// Generate file content of at most `max_len` bytes.
pub fn content(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn prop_file_names_have_extension(name in file_name()) {
            prop_assert!(name.contains('.'));
            prop_assert!(!name.ends_with('.'));
        }

        #[test]
        fn prop_folder_names_are_plain(name in folder_name()) {
            prop_assert!(!name.contains('.'));
            prop_assert!(!name.is_empty());
        }
    }
}
