//! Error of chordal.

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

fn merged_desc(errs: &[Error]) -> String {
    errs.iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors collection in chordal.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("ring state lock poisoned")]
    StateLock,

    #[error("transport unreachable: {0}")]
    Unreachable(String),

    #[error("vnode {id} is not registered on {host}")]
    VnodeNotFound { host: String, id: String },

    #[error("all known successors dead")]
    AllSuccessorsDead,

    #[error("exhausted all preceding nodes")]
    ExhaustedPrecedingNodes,

    #[error("cannot ask for more than {max} successors, got {requested}")]
    TooManySuccessors { requested: usize, max: usize },

    #[error("seed host {0} has no vnodes")]
    EmptySeed(String),

    #[error("ring is shutting down")]
    ShuttingDown,

    #[error("{}", merged_desc(.0))]
    Merged(Vec<Error>),
}
