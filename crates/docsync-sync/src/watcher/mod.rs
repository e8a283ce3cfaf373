//! Filesystem watcher producer.
//!
//! Raw notifications are classified, debounced and move-correlated before
//! they reach the bus as `FsEvent`/`FsMovedEvent`; [`FsEventTransformer`]
//! later turns them into canonical events.

pub mod debounce;
pub mod producer;
pub mod transformer;

pub use debounce::{Debouncer, Notification};
pub use producer::{FsWatcher, NotificationClassifier};
pub use transformer::FsEventTransformer;
