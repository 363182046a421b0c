use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config at {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("doc directory not found: {}", .0.display())]
    DocDirMissing(PathBuf),

    #[error("config already exists at {}", .0.display())]
    ConfigExists(PathBuf),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("preview server failed: {0}")]
    Server(#[from] hyper::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
