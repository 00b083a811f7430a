use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("registry error: {0}")]
    Registry(#[from] tsuiseki_detect::RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
