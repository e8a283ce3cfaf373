//! # docsync testkit
//!
//! Testing utilities for docsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a temporary sync root wired to an in-memory metadata store
//!   and an in-memory repository, with helpers to seed both sides
//! - **Generators**: Proptest strategies for change types, object kinds and
//!   file names
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use docsync_testkit::generators::change_type;
//!
//! proptest! {
//!     #[test]
//!     fn every_pair_has_a_strategy(local in change_type(), remote in change_type()) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::TestFixture;
