use std::path::PathBuf;

use thiserror::Error;

use crate::config::OnParseFailure;

/// Errors surfaced to the host before or while a comparison is set up.
///
/// Once a function-pair walk has started, every outcome is representable in
/// [`crate::module_comparator::PairOutcome`] — these variants only cover the
/// boundary the core cannot paper over: bad input, bad pattern catalogues,
/// and filesystem failures while loading either.
#[derive(Debug, Error)]
pub enum CompareError {
    #[error("symbol `{0}` was not found in the {1} module")]
    UnresolvedSymbol(String, &'static str),

    #[error("module is malformed: {0}")]
    MalformedModule(String),

    #[error("failed to load pattern module {path}: {reason}")]
    PatternLoad {
        path: PathBuf,
        reason: String,
        policy: OnParseFailure,
    },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, CompareError>;
