use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Function already exists: {0}")]
    FunctionExists(String),

    #[error("Sandbox creation failed: {0}")]
    BackendCreation(String),

    #[error("Output stream failed: {0}")]
    Stream(String),

    #[error("Docker API error: {status} - {message}")]
    Docker { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("Invalid HTTP request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("Materialization failed: {0}")]
    Materialize(String),

    #[error("Function store error: {0}")]
    Store(String),

    #[error("Metrics sink error: {0}")]
    Metrics(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
