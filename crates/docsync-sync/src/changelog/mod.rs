//! Remote change-log producer.
//!
//! [`ContentChanges`] pages through the server change log on every
//! incremental sync request and emits one [`docsync_core::ContentChangeEvent`]
//! per distinct object. [`ContentChangeAccumulator`] attaches a fresh
//! snapshot to each, and [`ContentChangeEventTransformer`] turns the result
//! into a canonical file or folder event once the filters have run.

pub mod accumulator;
pub mod poller;
pub mod transformer;

pub use accumulator::ContentChangeAccumulator;
pub use poller::ContentChanges;
pub use transformer::ContentChangeEventTransformer;
