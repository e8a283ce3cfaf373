//! Wildcard-based name ignores (editor backups, lock files, our own download
//! cache files, hidden folders).

use std::path::{Component, Path};

use async_trait::async_trait;
use regex::Regex;

use docsync_core::{ObjectKind, SyncEvent};

use crate::bus::{priority, SyncEventHandler};
use crate::config::{wildcard_to_regex, FilterConfig};
use crate::context::SyncContext;
use crate::error::Result;

/// Compiled ignore wildcards.
#[derive(Debug, Clone)]
pub struct NameMatcher {
    files: Vec<Regex>,
    folders: Vec<Regex>,
}

impl NameMatcher {
    pub fn new(config: &FilterConfig) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| wildcard_to_regex(p).map_err(Into::into))
                .collect()
        };
        Ok(Self {
            files: compile(&config.ignored_file_names)?,
            folders: compile(&config.ignored_folder_names)?,
        })
    }

    pub fn is_ignored_file(&self, name: &str) -> bool {
        self.files.iter().any(|re| re.is_match(name))
    }

    pub fn is_ignored_folder(&self, name: &str) -> bool {
        self.folders.iter().any(|re| re.is_match(name))
    }

    /// Whether the entry at `relative`, or one of its ancestor folders, is
    /// ignored by name.
    pub fn is_ignored_path(&self, relative: &Path, is_dir: bool) -> bool {
        let names: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let Some((last, ancestors)) = names.split_last() else {
            return false;
        };
        if ancestors.iter().any(|name| self.is_ignored_folder(name)) {
            return true;
        }
        if is_dir {
            self.is_ignored_folder(last)
        } else {
            self.is_ignored_file(last)
        }
    }
}

/// Drops events for names matching the ignore wildcards. Moves are judged by
/// their destination.
pub struct IgnoredNamesFilter {
    ctx: SyncContext,
    matcher: NameMatcher,
}

impl IgnoredNamesFilter {
    pub fn new(ctx: SyncContext) -> Result<Self> {
        let matcher = NameMatcher::new(&ctx.config.filter)?;
        Ok(Self { ctx, matcher })
    }

    fn local_ignored(&self, absolute: &Path, is_dir: bool) -> bool {
        match self.ctx.root.relative(absolute) {
            Ok(relative) => self.matcher.is_ignored_path(&relative, is_dir),
            Err(_) => false,
        }
    }

    fn remote_ignored(&self, name: &str, kind: ObjectKind) -> bool {
        match kind {
            ObjectKind::Folder => self.matcher.is_ignored_folder(name),
            _ => self.matcher.is_ignored_file(name),
        }
    }
}

#[async_trait]
impl SyncEventHandler for IgnoredNamesFilter {
    fn name(&self) -> &'static str {
        "ignored-names-filter"
    }

    fn priority(&self) -> i32 {
        priority::FILTER
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        let ignored = match event {
            SyncEvent::Fs(e) => self.local_ignored(&e.path, e.is_directory),
            SyncEvent::FsMoved(e) => self.local_ignored(&e.new_path, e.is_directory),
            SyncEvent::ContentChange(e) => match &e.object {
                Some(object) => match self.ctx.local_path_for(object.parent_id(), object.name()).await {
                    Ok(path) => self.local_ignored(&path, object.kind() == ObjectKind::Folder),
                    Err(_) => self.remote_ignored(object.name(), object.kind()),
                },
                None => false,
            },
            SyncEvent::File(e) => match (&e.local_path, e.remote_document()) {
                (Some(path), _) => self.local_ignored(path, false),
                (None, Some(doc)) => self.remote_ignored(&doc.name, ObjectKind::File),
                (None, None) => false,
            },
            SyncEvent::Folder(e) => match (&e.local_path, e.remote_snapshot()) {
                (Some(path), _) => self.local_ignored(path, true),
                (None, Some(folder)) => self.remote_ignored(&folder.name, ObjectKind::Folder),
                (None, None) => false,
            },
            _ => false,
        };
        if ignored {
            tracing::debug!(%event, "ignored by name");
        }
        Ok(ignored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::context;
    use docsync_core::{FileEvent, FsEvent, FsMovedEvent, WatcherChangeType};
    use docsync_testkit::TestFixture;

    #[test]
    fn test_default_patterns() {
        let matcher = NameMatcher::new(&FilterConfig::default()).unwrap();
        assert!(matcher.is_ignored_file("report.docx~"));
        assert!(matcher.is_ignored_file("~$report.docx"));
        assert!(matcher.is_ignored_file("a.bin.sync"));
        assert!(!matcher.is_ignored_file("report.docx"));
        assert!(matcher.is_ignored_folder(".git"));
        assert!(!matcher.is_ignored_folder("git"));

        assert!(matcher.is_ignored_path(Path::new(".git/config"), false));
        assert!(matcher.is_ignored_path(Path::new("a/.cache/b/c.txt"), false));
        assert!(!matcher.is_ignored_path(Path::new("a/.profile"), false));
        assert!(!matcher.is_ignored_path(Path::new(""), true));
    }

    #[tokio::test]
    async fn test_filter_events() {
        let fx = TestFixture::new().await;
        let (ctx, _rx) = context(&fx);
        let filter = IgnoredNamesFilter::new(ctx).unwrap();

        let mut tmp = SyncEvent::Fs(FsEvent {
            kind: WatcherChangeType::Created,
            path: fx.local("draft.tmp"),
            is_directory: false,
            local_id: None,
        });
        assert!(filter.handle(&mut tmp).await.unwrap());

        // Renaming a temp file to its final name must go through.
        let mut save = SyncEvent::FsMoved(FsMovedEvent {
            old_path: fx.local("draft.tmp"),
            new_path: fx.local("draft.docx"),
            is_directory: false,
            local_id: None,
        });
        assert!(!filter.handle(&mut save).await.unwrap());

        let mut file = SyncEvent::File(FileEvent::local(fx.local("notes.txt")));
        assert!(!filter.handle(&mut file).await.unwrap());
    }
}
