use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("could not read media players data: {}", path.display())]
    Empty { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid player data: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("platform detection failed: {0}")]
    Platform(String),

    #[error("player detection is not supported on this platform")]
    Unsupported,
}
