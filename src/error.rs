//src/error.rs

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PhyloError>;

/// Every way the species pipeline can fail.
///
/// Parsing and table-loading errors abort the run: a partially written
/// abundance table is never produced.
#[derive(Debug, Error)]
pub enum PhyloError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{kind} '{id}' not found in reference data")]
    MissingReferenceData { kind: &'static str, id: String },

    #[error("cluster '{cluster_id}' has {bases} aligned bases but zero total gene length")]
    ZeroDenominator { cluster_id: String, bases: u64 },

    #[error("invalid normalization: {0}")]
    InvalidNormalization(String),

    #[error("empty result: {0}")]
    EmptyResult(String),

    #[error("failed to start worker threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl PhyloError {
    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        PhyloError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse<P: Into<PathBuf>, M: Into<String>>(path: P, line: usize, message: M) -> Self {
        PhyloError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub(crate) fn missing_cluster(id: &str) -> Self {
        PhyloError::MissingReferenceData {
            kind: "cluster",
            id: id.to_string(),
        }
    }
}
