//! Full-tree comparison of disk, repository and records.
//!
//! The crawler is the ground-truth path of the engine: the initial sync,
//! recovery after an inconsistency and repositories without a change log
//! all go through it.

pub mod cycle;
pub mod generator;
pub mod handler;
pub mod tree;

pub use cycle::{plan_moves, MoveNode, MovePlan};
pub use generator::{generate, CrawlEventCollection, CrawlPlan, Mergable, MoveSide, PendingMove};
pub use handler::DescendantsCrawler;
pub use tree::{LocalEntry, RemoteEntry, StoredEntry, TreeSnapshot, TreeWalker};
