use rust_tokenizers::error::TokenizerError;
use tch::TchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TildeError {
    #[error("IO error: {0}")]
    IOError(String),

    #[error("Tch tensor error: {0}")]
    TchError(String),

    #[error("Tokenizer error: {0}")]
    TokenizerError(String),

    #[error("Invalid configuration error: {0}")]
    InvalidConfigurationError(String),

    #[error("Value error: {0}")]
    ValueError(String),
}

impl From<std::io::Error> for TildeError {
    fn from(error: std::io::Error) -> Self {
        TildeError::IOError(error.to_string())
    }
}

impl From<TchError> for TildeError {
    fn from(error: TchError) -> Self {
        TildeError::TchError(error.to_string())
    }
}

impl From<TokenizerError> for TildeError {
    fn from(error: TokenizerError) -> Self {
        TildeError::TokenizerError(error.to_string())
    }
}

impl From<serde_json::Error> for TildeError {
    fn from(error: serde_json::Error) -> Self {
        TildeError::IOError(error.to_string())
    }
}
