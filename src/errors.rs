use rusoto_core::request::TlsError;
use serde_json::Error as SerdeJsonError;
use std::convert::From;
use std::error::Error;
use std::fmt::{self, Display};

/// Errors that stop the worker before the poll loop starts
#[derive(Debug)]
pub enum ProcessorError {
    CommandLineError(String),
    HttpClientError(TlsError),
}

impl Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorError::CommandLineError(e) => {
                write!(f, "A command line error occurred: {}", e)
            }
            ProcessorError::HttpClientError(e) => {
                write!(f, "Could not create an http client: {}", e)
            }
        }
    }
}

impl Error for ProcessorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            ProcessorError::HttpClientError(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<TlsError> for ProcessorError {
    fn from(e: TlsError) -> Self {
        ProcessorError::HttpClientError(e)
    }
}

/// Failures of the queue service, either while polling or deleting
#[derive(Debug, Clone, PartialEq)]
pub enum QueueError {
    NotFound(String),
    Unavailable(String),
}

impl Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::NotFound(queue) => {
                write!(f, "Queue does not exist, check the queue url: {}", queue)
            }
            QueueError::Unavailable(e) => write!(f, "Queue service unavailable: {}", e),
        }
    }
}

impl Error for QueueError {}

/// Failures of the object store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    NotFound(String),
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(key) => write!(f, "No object found at key {}", key),
            StoreError::Unavailable(e) => write!(f, "Object store unavailable: {}", e),
        }
    }
}

impl Error for StoreError {}

/// The ways a single message can fail.
///
/// Neither variant deletes the message: it becomes visible again once its
/// visibility timeout lapses and is picked up by a later poll.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingError {
    /// The body (or the object it points at) is not a valid payload
    MalformedBody(String),
    /// Fetching or writing an object failed
    StoreUnavailable(StoreError),
}

impl Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingError::MalformedBody(e) => write!(f, "MalformedBody: {}", e),
            ProcessingError::StoreUnavailable(e) => write!(f, "StoreUnavailable: {}", e),
        }
    }
}

impl Error for ProcessingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            ProcessingError::StoreUnavailable(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<SerdeJsonError> for ProcessingError {
    fn from(e: SerdeJsonError) -> Self {
        ProcessingError::MalformedBody(e.to_string())
    }
}

impl From<StoreError> for ProcessingError {
    fn from(e: StoreError) -> Self {
        ProcessingError::StoreUnavailable(e)
    }
}
