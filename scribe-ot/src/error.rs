use thiserror::Error;

/// Errors raised by the pure OT core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OtError {
    /// Live content does not match what an op claims to delete, insert or rewind.
    /// The document has diverged; never auto-corrected.
    #[error("consistency error in {context}: expected '{expected}', found '{found}'")]
    Consistency {
        context: String,
        expected: String,
        found: String,
    },
    /// Two ops handed to transform were not generated against the same base.
    #[error("transform precondition violated: {0}")]
    TransformPrecondition(String),
}

impl OtError {
    pub(crate) fn consistency(
        context: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        OtError::Consistency {
            context: context.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Prefix the context of a consistency error, leaving other variants untouched.
    pub fn within(self, outer: impl std::fmt::Display) -> Self {
        match self {
            OtError::Consistency { context, expected, found } => OtError::Consistency {
                context: format!("{outer}: {context}"),
                expected,
                found,
            },
            other => other,
        }
    }
}
