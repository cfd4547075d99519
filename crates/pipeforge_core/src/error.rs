use thiserror::Error;

/// Failures raised while parsing or merging a managed document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// A required operation could not be resolved because an ancestor is not a mapping,
    /// or its path was missing once every operation had been applied.
    #[error("structural error at `{path}`: {reason}")]
    Structural { path: String, reason: String },

    /// The existing document text is not a document this engine can merge into.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl MergeError {
    pub fn structural(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Structural {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
