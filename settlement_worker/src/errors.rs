use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Could not initialize worker. {0}")]
    InitializeError(String),
    #[error("Invalid worker configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the worker. {0}")]
    IOError(#[from] std::io::Error),
}
