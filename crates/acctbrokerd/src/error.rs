use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error(
        "No base email configured. Set `broker {{ base-email \"...\" }}` in the config file \
        or the BASE_EMAIL environment variable"
    )]
    MissingBaseEmail,

    #[error("Invalid base email {email:?}: {reason}")]
    InvalidBaseEmail { email: String, reason: String },

    #[error("Unsupported DATABASE_URL {0:?}: only file: URLs and plain paths are supported")]
    UnsupportedDatabase(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
