//! Error types for pipeline construction and execution.

/// Errors raised while building or validating a plan, compiling it into a
/// pipeline, or driving the pipeline.
///
/// Construction-time failures carry typed variants; runtime failures from
/// operators are wrapped transparently.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Op name not present in the registry.
    #[error("unknown op: {0}")]
    UnknownOp(String),

    /// A required argument is absent or empty.
    #[error("op `{op}`: missing required arg `{arg}`")]
    MissingArg { op: String, arg: String },

    /// An argument is present but malformed.
    #[error("op `{op}`: {msg}")]
    BadArg { op: String, msg: String },

    /// Structural plan failure (empty plan, codec placement, bad JSON).
    #[error("invalid plan: {0}")]
    Plan(String),

    /// Expression text rejected by the oracle.
    #[error("expression error: {0}")]
    Expr(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
