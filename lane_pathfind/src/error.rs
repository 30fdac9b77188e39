use std::{error, fmt};

/// Why a request didn't produce a path. Callers decide whether to retry or reroute.
#[derive(Clone, Debug, PartialEq)]
pub enum PathFailure {
    /// The search exhausted the frontier without reaching a start lane.
    NoPath,
    OutOfPathUnits,
    /// Following the per-lane back-pointers didn't arrive at an end position.
    CorruptChain,
    Panicked(String),
    /// The worker shut down before getting to the request.
    Terminated,
}

impl fmt::Display for PathFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PathFailure::NoPath => write!(f, "no path found"),
            PathFailure::OutOfPathUnits => write!(f, "ran out of path units"),
            PathFailure::CorruptChain => write!(f, "lane targets don't lead to the destination"),
            PathFailure::Panicked(msg) => write!(f, "search panicked: {}", msg),
            PathFailure::Terminated => write!(f, "worker shut down"),
        }
    }
}

impl error::Error for PathFailure {}
