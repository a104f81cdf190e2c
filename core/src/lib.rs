//! Semantic-equivalence comparator for pairs of LLVM IR modules: decides,
//! function by function, whether two compiled versions of a codebase behave
//! the same way, tolerating a catalogue of compiler- and refactor-induced
//! differences that are not behavioral (§1, §4.3).
//!
//! The entry point for a host is [`module_comparator::ModuleComparator`];
//! [`collaborators`] describes the traits a host must supply (debug info,
//! simplification, inlining) and [`config::ComparatorConfig`] the benign-
//! pattern flags that tune the comparison.

pub mod collaborators;
pub mod config;
pub mod correspondence;
pub mod differential;
pub mod error;
pub mod function_comparator;
pub mod ir;
pub mod model;
pub mod module_comparator;
pub mod pattern;

pub use config::ComparatorConfig;
pub use error::{CompareError, Result};
pub use model::{CallFrame, CallStack, MissingDef, NonFunctionDifference, SourceLoc};
pub use module_comparator::{ModuleComparator, PairOutcome, Verdict};
pub use pattern::PatternSet;
