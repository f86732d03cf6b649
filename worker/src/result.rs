use crate::error::WorkerError;

pub type Result<T> = std::result::Result<T, WorkerError>;
