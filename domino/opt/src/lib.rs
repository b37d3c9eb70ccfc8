//! Analyses over domino flow graphs.
//!
//! The crate currently hosts a single analysis family: merge domination,
//! which answers immediate-dominator queries against graphs that are still
//! being constructed. See [analysis::DominatorResolver] for the entry point.
pub mod analysis;
