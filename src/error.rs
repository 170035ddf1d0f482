use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    /// Raised while building steps, before any run starts
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Resolution failure: {0}")]
    Resolution(String),

    #[error("Resource failure: {0}")]
    Resource(String),

    #[error("Browser automation error: {0}")]
    Browser(String),

    #[error("Input injection error: {0}")]
    Input(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BotError {
    /// Short label used when reporting a failure in the action log
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::Configuration(_) => "configuration",
            BotError::Resolution(_) => "resolution",
            BotError::Resource(_) => "resource",
            BotError::Browser(_) => "browser",
            BotError::Input(_) => "input",
            BotError::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Resource(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
