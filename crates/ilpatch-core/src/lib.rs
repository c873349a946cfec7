#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core primitives shared by the ilpatch crates.
//!
//! - [`Colors`]: ANSI palette for human-readable dumps.

mod colors;

pub use colors::Colors;
