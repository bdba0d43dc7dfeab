//! Error type shared by graph construction, sampling and I/O helpers.

use crate::graph::Phase;

/// Errors reported by the inference engine.
///
/// Potential evaluations never produce errors; degenerate geometry is
/// regularized to the ε floor instead. Everything listed here is a contract
/// violation on the caller's side or an I/O failure.
#[derive(Debug)]
pub enum PbpError {
    /// A configuration value is out of its valid range.
    InvalidConfig(String),
    /// An algorithm name did not match any known message-passing variant.
    UnknownAlgorithm(String),
    /// A state matrix does not match the node's particle count or state dimension.
    StateShape {
        /// Node index in the topology.
        node: usize,
        /// Expected `(rows, cols)`.
        expected: (usize, usize),
        /// Provided `(rows, cols)`.
        got: (usize, usize),
    },
    /// A weight vector is not a usable categorical distribution.
    InvalidWeights(String),
    /// No pixel of the observation carries the requested tag.
    MissingTag {
        /// Part tag that was searched for.
        tag: u8,
    },
    /// The observation does not have the size the graph was built for.
    ImageSize {
        /// Expected `[width, height]`.
        expected: [u32; 2],
        /// Observed `[width, height]`.
        got: [u32; 2],
    },
    /// A phase of the iteration cycle was called out of order.
    PhaseOrder {
        /// Phase that was requested.
        requested: Phase,
        /// Phase the graph was in.
        current: Phase,
    },
    /// Particle state was requested before any initializer ran.
    NotInitialized,
    /// A per-part state list has the wrong number of parts or values.
    MalformedPose(String),
    /// Reading or writing a file failed.
    Io(std::io::Error),
    /// JSON (de)serialization failed.
    Json(serde_json::Error),
}

impl std::fmt::Display for PbpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            Self::UnknownAlgorithm(name) => write!(
                f,
                "unknown algorithm '{}' (expected 'sum-product' or 'max-product')",
                name
            ),
            Self::StateShape {
                node,
                expected,
                got,
            } => write!(
                f,
                "state matrix for node {} has shape {}x{}, expected {}x{}",
                node, got.0, got.1, expected.0, expected.1
            ),
            Self::InvalidWeights(msg) => write!(f, "invalid weights: {}", msg),
            Self::MissingTag { tag } => {
                write!(f, "observation has no pixel labelled with tag {}", tag)
            }
            Self::ImageSize { expected, got } => write!(
                f,
                "observation is {}x{}, graph was built for {}x{}",
                got[0], got[1], expected[0], expected[1]
            ),
            Self::PhaseOrder { requested, current } => write!(
                f,
                "cannot run {:?} while the graph is in phase {:?}",
                requested, current
            ),
            Self::NotInitialized => {
                write!(f, "graph has no particles yet; call an initializer first")
            }
            Self::MalformedPose(msg) => write!(f, "malformed pose: {}", msg),
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for PbpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PbpError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for PbpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

pub type Result<T> = std::result::Result<T, PbpError>;
