use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A schedule directive referenced a loop variable the stage does not have.
    #[snafu(display("{func}.{stage} has no dimension named {var}"))]
    UnknownDimension { func: String, stage: String, var: String },

    /// A stage index past the last update definition.
    #[snafu(display("{func} has {num_stages} stages, requested stage {stage_num}"))]
    StageOutOfRange { func: String, stage_num: usize, num_stages: usize },

    /// Reorder listed the same variable twice.
    #[snafu(display("{func}.{stage} reorder lists {var} more than once"))]
    DuplicateReorderVar { func: String, stage: String, var: String },

    /// A function was given a pure definition twice.
    #[snafu(display("{func} is already defined"))]
    AlreadyDefined { func: String },

    /// An update was added before the pure definition.
    #[snafu(display("{func} must have a pure definition before updates"))]
    UpdateBeforeDefinition { func: String },
}
