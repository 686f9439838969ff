use std::fmt::{self, Display};

use redis::RedisError;

/// The library-wide error type for this crate, distinguishing the failure
/// kinds spec'd out in the error handling design: a Redis/infrastructure
/// failure, a corrupt-assignment decode failure, and a generic fatal case
/// (used for the shutdown-interruption path and for handler failures that
/// have already been reported through other means).
#[derive(Debug)]
pub enum ConsumerError {
    Redis(RedisError),
    Decode(serde_json::Error),
    Fatal(String),
}

impl ConsumerError {
    pub fn fatal(message: impl Into<String>) -> Self {
        ConsumerError::Fatal(message.into())
    }
}

impl Display for ConsumerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerError::Redis(err) => write!(f, "redis error: {err}"),
            ConsumerError::Decode(err) => write!(f, "failed to decode assignment: {err}"),
            ConsumerError::Fatal(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ConsumerError {}

impl From<RedisError> for ConsumerError {
    fn from(err: RedisError) -> Self {
        ConsumerError::Redis(err)
    }
}

impl From<serde_json::Error> for ConsumerError {
    fn from(err: serde_json::Error) -> Self {
        ConsumerError::Decode(err)
    }
}
