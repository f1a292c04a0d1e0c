use sortmerge_operators::OpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] sortmerge_core::error::Error),

    #[error("spill: {0}")]
    Spill(#[from] sortmerge_mem::error::Error),

    #[error(transparent)]
    Join(#[from] OpError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for OpError {
    fn from(e: Error) -> Self {
        match e {
            Error::Join(op) => op,
            Error::Spill(s) => OpError::Spill(s),
            other => OpError::Stream(other.to_string()),
        }
    }
}
