//! Cross-layer error classification.
//!
//! Each layer keeps its own error enum; callers that only need to decide
//! how to respond (status code, retry, exit code) ask for an [`ErrorKind`].

use std::fmt::{Display, Formatter};

/// Coarse error category shared by every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    /// Expected version did not match; re-read and retry.
    VersionConflict,
    Validation,
    Authorization,
    /// Engine, pool or transport failure.
    Infrastructure,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::VersionConflict)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::VersionConflict => "version_conflict",
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::Infrastructure => "infrastructure",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
