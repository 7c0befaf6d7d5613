use prism_es_query::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Engine returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ClientError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ClientError::Config(_) => "config",
            ClientError::Http(_) => "http",
            ClientError::Status { .. } => "status",
            ClientError::InvalidUrl(_) => "invalid_url",
            ClientError::InvalidArgument(_) => "invalid_argument",
            ClientError::Json(_) => "json",
            ClientError::Io(_) => "io",
            ClientError::Toml(_) => "toml",
        }
    }
}

impl From<ClientError> for EngineError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Status { status, body } => EngineError::Status { status, body },
            ClientError::Http(e) if e.is_decode() => EngineError::Malformed(e.to_string()),
            ClientError::Json(e) => EngineError::Malformed(e.to_string()),
            other => EngineError::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
