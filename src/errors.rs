use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::DependencyId;

/// Error type for query validation, backend access, strategies, and export failures.
#[derive(Debug, Error)]
pub enum VioGenError {
    #[error("violation query '{dependency}' compares variables with equalities, which is not supported")]
    EqualityComparison { dependency: DependencyId },
    #[error(
        "violation query '{dependency}' spans {found} table aliases; only cross products between two aliases are supported"
    )]
    CrossProductArity {
        dependency: DependencyId,
        found: usize,
    },
    #[error("inequality violation sampling requires a random execution; set generate_all_changes to false")]
    ExhaustiveMode,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("query backend failure: {details}")]
    Backend { details: String },
    #[error("strategy failure: {0}")]
    Strategy(String),
    #[error("unable to export cell changes to '{}': {source}", path.display())]
    DataAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl VioGenError {
    /// True for the fail-fast rejections raised before any materialization.
    pub fn is_configuration_rejection(&self) -> bool {
        matches!(
            self,
            VioGenError::EqualityComparison { .. }
                | VioGenError::CrossProductArity { .. }
                | VioGenError::ExhaustiveMode
        )
    }
}
