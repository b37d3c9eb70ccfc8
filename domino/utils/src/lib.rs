//! Shared utilities for the domino crates.
mod errors;
mod idx;

pub use errors::{DominoResult, Error};
pub use idx::{IndexRef, IndexedMap};
