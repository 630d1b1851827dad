use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// User-facing scheduler failures.
///
/// Unknown symbolic extents are deliberately not represented here: they are
/// a normal signal in the search space, carried by [`crate::cost::Cost`].
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// An output dimension has no size estimate.
    #[snafu(display("output {func} is missing an estimate for dimension {var}"))]
    MissingEstimate { func: String, var: String },

    /// An estimate names a variable the output does not have.
    #[snafu(display("output {func} has no dimension {var} to estimate"))]
    UnknownEstimateDimension { func: String, var: String },

    /// Estimate endpoints must be integer literals.
    #[snafu(display("estimate for {var} of output {func} must have literal min and extent"))]
    NonLiteralEstimate { func: String, var: String },

    /// A schedule directive failed to apply to the host IR.
    #[snafu(context(false), display("schedule application failed: {source}"))]
    Apply { source: mosaic_ir::Error },
}
