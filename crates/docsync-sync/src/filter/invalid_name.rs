//! Rejects names the opposing filesystem cannot hold.

use std::path::{Component, Path};

use async_trait::async_trait;

use docsync_core::{RemoteId, RequestIgnoredEvent, SyncEvent};

use crate::bus::{priority, SyncEventHandler};
use crate::context::SyncContext;
use crate::error::Result;

/// Why `name` cannot be synced, or `None` when it can.
pub fn invalid_name_reason(name: &str, reserved: &str) -> Option<String> {
    if name.is_empty() {
        return Some("empty name".into());
    }
    if let Some(c) = name.chars().find(|c| reserved.contains(*c)) {
        return Some(format!("name {:?} contains reserved character {:?}", name, c));
    }
    if name.chars().any(char::is_control) {
        return Some(format!("name {:?} contains a control character", name));
    }
    if name.ends_with('.') || name.ends_with(' ') {
        return Some(format!("name {:?} ends with a dot or a space", name));
    }
    None
}

enum NameCheck {
    Valid,
    Invalid(String),
    InvalidAncestor,
}

/// Drops events for invalid names and reports them as
/// [`RequestIgnoredEvent`]s. Descendants of an invalid folder are dropped
/// without a report.
pub struct InvalidNameFilter {
    ctx: SyncContext,
}

impl InvalidNameFilter {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    fn reserved(&self) -> &str {
        &self.ctx.config.filter.reserved_characters
    }

    fn check_local(&self, absolute: &Path) -> NameCheck {
        let Ok(relative) = self.ctx.root.relative(absolute) else {
            return NameCheck::Valid;
        };
        let names: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let Some((last, ancestors)) = names.split_last() else {
            return NameCheck::Valid;
        };
        if ancestors
            .iter()
            .any(|name| invalid_name_reason(name, self.reserved()).is_some())
        {
            return NameCheck::InvalidAncestor;
        }
        match invalid_name_reason(last, self.reserved()) {
            Some(reason) => NameCheck::Invalid(reason),
            None => NameCheck::Valid,
        }
    }

    fn report(&self, reason: String, path: Option<&Path>, remote_id: Option<&RemoteId>) {
        tracing::warn!(%reason, path = ?path, remote_id = ?remote_id, "request ignored");
        self.ctx.queue.add_event(SyncEvent::RequestIgnored(RequestIgnoredEvent {
            reason,
            path: path.map(Path::to_path_buf),
            remote_id: remote_id.cloned(),
        }));
    }

    fn judge_local(&self, path: &Path, remote_id: Option<&RemoteId>) -> bool {
        match self.check_local(path) {
            NameCheck::Valid => false,
            NameCheck::Invalid(reason) => {
                self.report(reason, Some(path), remote_id);
                true
            }
            NameCheck::InvalidAncestor => true,
        }
    }

    fn judge_remote(&self, name: &str, remote_id: &RemoteId) -> bool {
        match invalid_name_reason(name, self.reserved()) {
            Some(reason) => {
                self.report(reason, None, Some(remote_id));
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SyncEventHandler for InvalidNameFilter {
    fn name(&self) -> &'static str {
        "invalid-name-filter"
    }

    fn priority(&self) -> i32 {
        priority::FILTER
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        let invalid = match event {
            SyncEvent::Fs(e) => self.judge_local(&e.path, None),
            SyncEvent::FsMoved(e) => self.judge_local(&e.new_path, None),
            SyncEvent::ContentChange(e) => match &e.object {
                Some(object) => self.judge_remote(object.name(), object.id()),
                None => false,
            },
            SyncEvent::File(e) => match (&e.local_path, e.remote_document()) {
                (Some(path), _) => self.judge_local(path, e.remote_id()),
                (None, Some(doc)) => self.judge_remote(&doc.name, &doc.id),
                (None, None) => false,
            },
            SyncEvent::Folder(e) => match (&e.local_path, e.remote_snapshot()) {
                (Some(path), _) => self.judge_local(path, e.remote_id()),
                (None, Some(folder)) => self.judge_remote(&folder.name, &folder.id),
                (None, None) => false,
            },
            _ => false,
        };
        Ok(invalid)
    }
}
