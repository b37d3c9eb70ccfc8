//! Analyses for flow graphs under construction.
//!
//! The analyses construct data-structures that make answering certain
//! queries about partially built graphs easier.

mod merge_domination;

pub use merge_domination::{DominatorError, DominatorResolver};
