//! The situation solver.
//!
//! [`SyncMechanism`] receives canonical file and folder events last on the
//! bus. [`SituationDetector`] settles each against the records and both
//! sides, [`Strategy::select`] picks the resolution for the resulting
//! `(local, remote)` pair, and [`FileSolver`] or [`FolderSolver`] applies
//! it. File content moves through [`ContentTransfer`].

pub mod conflict;
pub mod content;
pub mod file;
pub mod folder;
pub mod mechanism;
pub mod moves;
pub mod record;
pub mod situation;
pub mod strategy;

pub use conflict::{conflict_copy_name, conflict_copy_path};
pub use content::{ContentTransfer, Uploaded};
pub use file::FileSolver;
pub use folder::FolderSolver;
pub use mechanism::SyncMechanism;
pub use situation::{Situation, SituationDetector};
pub use strategy::Strategy;
