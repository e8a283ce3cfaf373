//! Filters run before the transformers and drop events that must not reach
//! the solver. A filter returns `Ok(true)` for an event it drops.
//!
//! | Filter | Drops |
//! |---|---|
//! | [`AlreadyHandledFilter`] | local notifications that already match the records |
//! | [`ChangeLogLoopFilter`] | change-log entries caused by our own writes |
//! | [`SelectiveIgnoreFilter`] | anything under an ignored subtree |
//! | [`InvalidNameFilter`] | names the other side cannot hold |
//! | [`IgnoredNamesFilter`] | names matching the ignore wildcards |

pub mod already_handled;
pub mod ignored;
pub mod ignored_names;
pub mod invalid_name;
pub mod loop_filter;

pub use already_handled::AlreadyHandledFilter;
pub use ignored::{IgnoredEntitiesStorage, IgnoredState, SelectiveIgnoreFilter};
pub use ignored_names::{IgnoredNamesFilter, NameMatcher};
pub use invalid_name::{invalid_name_reason, InvalidNameFilter};
pub use loop_filter::ChangeLogLoopFilter;
