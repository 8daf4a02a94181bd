use thiserror::Error;

#[derive(Error, Debug)]
pub enum DroverError {
    #[error("Coordinator returned status {0}")]
    CoordinatorStatus(reqwest::StatusCode),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, DroverError>;
