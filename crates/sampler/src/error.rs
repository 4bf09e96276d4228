use std::{error::Error, fmt::Display};

/// Error kinds raised by the sampling kernel (spec.md §7).
///
/// Mirrors the teacher's hand-rolled `graph_rs::GraphError`: a plain enum
/// implementing `std::error::Error` by hand, no `thiserror`.
#[derive(Debug)]
pub enum SamplerError {
    /// An area could not be grown to `initial_size` within `max_attempts`
    /// total retries across all areas (spec.md §4.7, §7).
    GrowthStuck { attempts: usize },
    /// Disjointness or a simplex-sum invariant was violated after an
    /// accepted step. Fatal: the chain that produced it is aborted.
    InvariantViolation(String),
    /// The oracle raised while evaluating a proposed or current sample.
    OracleFailure(String),
    /// A configuration value violates the constraints in spec.md §6
    /// (`SamplerConfig`), e.g. `min_size > max_size`.
    InvalidConfig(String),
}

impl Error for SamplerError {}

impl Display for SamplerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GrowthStuck { attempts } => write!(
                f,
                "failed to grow initial areas after {attempts} attempts: insufficient space"
            ),
            Self::InvariantViolation(msg) => write!(f, "invariant violated: {msg}"),
            Self::OracleFailure(msg) => write!(f, "oracle failure: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid sampler configuration: {msg}"),
        }
    }
}

/// `OperatorBlocked` (spec.md §7) is deliberately not a variant of
/// [`SamplerError`]: it is encoded as an ordinary rejected proposal
/// (`q_back == 0`, see [`crate::operators::Proposal`]), not an error.
/// `Cancelled` likewise never surfaces as an `Err` — see
/// [`crate::driver::ChainDriver::run`].
pub type SamplerResult<T> = Result<T, SamplerError>;
