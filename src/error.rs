use parse_display::Display;

use crate::core::{Level, TransactionId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by [`Transaction::commit`](crate::Transaction::commit).
#[non_exhaustive]
#[derive(Display, Debug)]
pub enum Error {
    /// A node hook failed. The rest of the propagation pass was aborted.
    #[display("evaluation failed: {0}")]
    Evaluation(Box<dyn std::error::Error + 'static>),

    /// A commit was started while `running` was committing on the same context.
    #[display("{running} is already committing on this evaluation context")]
    NestedCommit { running: TransactionId },

    /// A node had to be processed above [`MAX_LEVEL`](crate::core::MAX_LEVEL).
    #[display("level {level} exceeds the maximum level")]
    LevelOverflow { level: Level },
}

impl Error {
    pub fn evaluation(e: impl Into<Box<dyn std::error::Error + 'static>>) -> Self {
        Error::Evaluation(e.into())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Evaluation(e) => Some(&**e),
            Error::NestedCommit { .. } | Error::LevelOverflow { .. } => None,
        }
    }
}
