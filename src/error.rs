use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum PffError {
    InvalidArgument(&'static str),
    AlreadySet(&'static str),
    OutOfBounds(&'static str),
    Missing(&'static str),
    InitializationFailed(&'static str),
    GetFailed(&'static str),
}

impl std::error::Error for PffError {}

impl fmt::Display for PffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PffError::InvalidArgument(operation) => write!(f, "invalid argument: {operation}"),
            PffError::AlreadySet(operation) => write!(f, "value already set: {operation}"),
            PffError::OutOfBounds(operation) => write!(f, "value out of bounds: {operation}"),
            PffError::Missing(operation) => write!(f, "value missing: {operation}"),
            PffError::InitializationFailed(operation) => {
                write!(f, "failed to initialize: {operation}")
            }
            PffError::GetFailed(operation) => write!(f, "failed to retrieve: {operation}"),
        }
    }
}
