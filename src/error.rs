use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferError {
    #[error("read template {path:?}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, InferError>;
