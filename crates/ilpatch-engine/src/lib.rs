//! ilpatch engine: rule-driven patching of compiled method bodies.
//!
//! - `resolve` - signature to symbol resolution with caching
//! - `pattern` / `cursor` - predicate search and cursor-relative edits
//! - `edit` - guard insertion, call-site retargeting, hook insertion
//! - `walker` - backward stack walk that widens arithmetic leaves
//! - `registry` - named rules and the context they run in
//! - `manifest` - which rules run on which methods
//! - `build` - the patch-build driver

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod build;
pub mod cursor;
pub mod edit;
pub mod error;
pub mod manifest;
pub mod pattern;
pub mod registry;
pub mod resolve;
pub mod walker;

#[cfg(test)]
mod build_tests;
#[cfg(test)]
pub mod test_utils;
#[cfg(test)]
mod walker_tests;

pub use build::{BuildReport, TargetReport, run};
pub use cursor::{Cursor, Direction, MoveType, Window};
pub use edit::{insert_guard, insert_hook_after_store, replace_range, retarget_call_site};
pub use error::{BuildError, PatchError, PatchResult};
pub use manifest::{Application, Manifest, ManifestEntry, ManifestError, MethodKey, PatchPlan};
pub use pattern::{Pred, describe, describe_in};
pub use registry::{PatchContext, RuleFn, RuleRegistry, decode_arg};
pub use resolve::{ResolveStats, Resolver};
pub use walker::{WalkReport, WalkStep, Widening, walk_back_from};
