use thiserror::Error;

/// Configuration problems. All of these are fatal at loop startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("unknown client: {0}")]
    UnknownClient(String),

    #[error("unknown strategy '{name}' in '{spec}'")]
    UnknownStrategy { name: String, spec: String },

    #[error("empty strategy list")]
    EmptyStrategy,
}
