//! Configuration for the engine components.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use docsync_core::HashAlgorithm;
use docsync_transfer::DEFAULT_CHUNK_SIZE;

/// Filesystem watcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// How long a notification stays buffered waiting for its move partner.
    pub threshold: Duration,

    /// Emit `Created` for every existing child of a newly created directory.
    pub backfill: bool,
}

impl WatcherConfig {
    /// Threshold clamped to its 1 ms floor.
    pub fn effective_threshold(&self) -> Duration {
        self.threshold.max(Duration::from_millis(1))
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::from_millis(100),
            backfill: true,
        }
    }
}

/// Content transfer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    pub chunk_size: usize,
    pub algorithm: HashAlgorithm,

    /// Upload through private working copies when the repository allows it.
    pub use_pwc: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            algorithm: HashAlgorithm::Sha1,
            use_pwc: true,
        }
    }
}

/// Change-log polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogConfig {
    /// Entries requested per page.
    pub page_size: usize,
}

impl Default for ChangeLogConfig {
    fn default() -> Self {
        Self { page_size: 100 }
    }
}

/// Name-based filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Shell-style wildcards for file names that are never synced.
    pub ignored_file_names: Vec<String>,

    /// Shell-style wildcards for folder names that are never synced.
    pub ignored_folder_names: Vec<String>,

    /// Characters a name may not contain on either side.
    pub reserved_characters: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ignored_file_names: ["*~", ".~lock*", "~$*", "*.tmp", "*.sync"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignored_folder_names: vec![".*".to_string()],
            reserved_characters: "\\/:*?\"<>|".to_string(),
        }
    }
}

/// What happens when both sides changed the same content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// The newer modification time wins and overwrites the other side.
    #[default]
    LastWriteWins,

    /// The local version is kept as a conflict copy next to the remote one.
    RenamedCopy,
}

/// Settings of every engine component.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    pub watcher: WatcherConfig,
    pub transfer: TransferConfig,
    pub change_log: ChangeLogConfig,
    pub filter: FilterConfig,
    pub conflict: ConflictPolicy,
}

/// Translate a shell-style wildcard (`*`, `?`) into an anchored regex.
pub fn wildcard_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcards() {
        let tmp = wildcard_to_regex("*.tmp").unwrap();
        assert!(tmp.is_match("a.tmp"));
        assert!(!tmp.is_match("a.tmpx"));
        assert!(!tmp.is_match("atmp"));

        let lock = wildcard_to_regex(".~lock*").unwrap();
        assert!(lock.is_match(".~lock.report.odt#"));

        let office = wildcard_to_regex("~$*").unwrap();
        assert!(office.is_match("~$report.docx"));

        let single = wildcard_to_regex("a?c").unwrap();
        assert!(single.is_match("abc"));
        assert!(!single.is_match("abbc"));
    }

    #[test]
    fn test_threshold_floor() {
        let config = WatcherConfig {
            threshold: Duration::ZERO,
            backfill: false,
        };
        assert_eq!(config.effective_threshold(), Duration::from_millis(1));
    }
}
