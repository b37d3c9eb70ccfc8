//! Errors shared across the domino crates.
use thiserror::Error;

/// Convenience alias for results produced while building a flow graph.
pub type DominoResult<T> = Result<T, Error>;

/// Errors raised while constructing or validating a flow graph.
#[derive(Error, Debug)]
pub enum Error {
    /// The graph under construction violates a structural invariant.
    #[error("malformed flow graph: {0}")]
    MalformedGraph(String),
}

impl Error {
    /// Construct a [Error::MalformedGraph] from anything printable.
    pub fn malformed<S: ToString>(msg: S) -> Self {
        Error::MalformedGraph(msg.to_string())
    }
}
