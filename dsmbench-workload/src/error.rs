use thiserror::Error;

/// Invalid parameters for one of the request generators.
#[derive(Debug, Error, PartialEq)]
pub enum WorkloadError {
    /// The Zipf generator needs at least one rank to draw from.
    #[error("zipf universe must contain at least one item")]
    EmptyUniverse,

    /// The key space must contain at least one key.
    #[error("key space must contain at least one key")]
    EmptyKeySpace,

    /// The skew is outside of the supported ranges.
    #[error("zipf theta {0} is not supported, expected -1, [0, 1) or >= 40")]
    UnsupportedTheta(f64),

    /// The read ratio is a percentage.
    #[error("read ratio {0} is not a percentage")]
    ReadRatio(u8),
}
