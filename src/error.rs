use crate::mnist::DatasetError;
use burn::config::ConfigError;
use burn::record::RecorderError;
use std::ffi::OsString;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to parse arguments: {0}")]
    Args(#[from] pico_args::Error),

    #[error("unused arguments: {0:?}")]
    UnusedArguments(Vec<OsString>),

    #[error("MNIST data not found at {}", .0.display())]
    DatasetNotFound(PathBuf),

    #[error("invalid value for --{name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to record the model: {0}")]
    Recorder(#[from] RecorderError),

    #[error("failed to load a config: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to (de)serialize the saved model manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("export directory {} already exists", .0.display())]
    ExportDirExists(PathBuf),

    #[error("no examples available for evaluation")]
    EmptyEvaluation,
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidOption {
            name,
            reason: reason.into(),
        }
    }
}
