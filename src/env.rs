use std::env::{self, VarError};

/// A wrapper around variables provided by the current environment, kept
/// as a trait so configuration loading can be exercised in tests without
/// mutating real process state.
pub trait EnvVars: Send + Sync {
    fn var(&self, key: &str) -> Result<String, VarError>;
}

/// Environment variables sourced from the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvVars;

impl EnvVars for ProcessEnvVars {
    fn var(&self, key: &str) -> Result<String, VarError> {
        env::var(key)
    }
}

#[cfg(test)]
pub(crate) struct FakeEnvVars(pub std::collections::HashMap<String, String>);

#[cfg(test)]
impl EnvVars for FakeEnvVars {
    fn var(&self, key: &str) -> Result<String, VarError> {
        self.0.get(key).cloned().ok_or(VarError::NotPresent)
    }
}
