use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PimcError {
    #[error("Invalid replica count: requested {requested}, observed {observed} (path integrals need 2^N >= 4 beads)")]
    InvalidReplicaCount { requested: usize, observed: usize },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("No molecules eligible for a Monte Carlo move in replica {replica}")]
    NoMoleculesInSystem { replica: usize },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Missing required datum: {0}")]
    MissingRequiredDatum(String),

    #[error("Unsupported setting under path integrals: {0}")]
    UnsupportedSetting(String),

    #[error("Invalid Monte Carlo move: {0}")]
    InvalidMonteCarloMove(String),

    #[error("Replica group broken: rank {rank} left before a collective completed")]
    GroupAborted { rank: usize },

    #[error("Could not write {path:?}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML Parsing Error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
}

impl PimcError {
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PimcError::FileWrite {
            path: path.into(),
            source,
        }
    }
}

pub type PimcResult<T> = Result<T, PimcError>;
