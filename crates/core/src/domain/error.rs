// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Job {0} is not held by any worker")]
    NotLeased(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
