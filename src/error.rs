use std::{path::PathBuf, time::Duration};

/// Failure kinds the runner tells apart. Everything else is plain `anyhow`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingConfig(Vec<String>),

    #[error("invalid config value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("login failed: {0}")]
    Auth(String),

    #[error("alist api error: {0}")]
    Api(String),

    #[error("cannot parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("remote path {path} not confirmed within {waited:?}")]
    Timeout { path: String, waited: Duration },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
