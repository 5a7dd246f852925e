use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("index {index} out of range for {len} patterns")]
    IndexOutOfRange { index: usize, len: usize },
}

impl DomainError {
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Returns `Ok(index)` when it addresses one of `len` items.
    pub fn check_index(index: usize, len: usize) -> Result<usize, Self> {
        if index < len {
            Ok(index)
        } else {
            Err(Self::IndexOutOfRange { index, len })
        }
    }
}
