use thiserror::Error;

/// Source location: line and column (both 1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl Span {
    #[must_use]
    pub fn new(line: usize, col: usize) -> Self {
        Span { line, col }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Everything that can abort a normalization run.
///
/// No pass recovers internally: a run either finishes or surfaces one of
/// these to the caller, which decides whether the whole run failed.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed program text handed to the parser.
    #[error("{span}: {message}")]
    Parse { span: Span, message: String },

    /// A delimiter or structure the extraction step relies on is missing.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// A substitution pass was invoked without its alias map.
    #[error("no alias map supplied for binding `{binding}`")]
    MissingAlias { binding: String },

    /// A construct matched part of a known shape but not all of it.
    #[error("ambiguous pattern: {0}")]
    AmbiguousPattern(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn parse(span: Span, message: impl Into<String>) -> Self {
        Error::Parse { span, message: message.into() }
    }

    /// True for errors caused by the input text rather than the caller.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::Parse { .. } | Error::Extraction(_) | Error::AmbiguousPattern(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
