//! # Request Authorization and Credentials
//!
//! Boundary traits for the collaborators that approve a request before any
//! stream opens and supply the key used for upstream calls.

use async_trait::async_trait;

use crate::error::{PipelineError, Result};
use crate::models::GenerationRequest;

/// Approves or refuses a generation request
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Return `Err(reason)` to refuse
    async fn authorize(&self, request: &GenerationRequest) -> std::result::Result<(), String>;
}

/// Authorizer that approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _request: &GenerationRequest) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Supplies the API key for upstream calls
pub trait CredentialProvider: Send + Sync {
    fn api_key(&self) -> Result<Option<String>>;
}

/// Reads the key from an environment variable
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
    required: bool,
}

impl EnvCredentials {
    /// Key is optional; an unset variable sends no auth header
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            required: false,
        }
    }

    /// Fail every upstream call when the variable is unset
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

impl CredentialProvider for EnvCredentials {
    fn api_key(&self) -> Result<Option<String>> {
        match std::env::var(&self.var) {
            Ok(key) if !key.is_empty() => Ok(Some(key)),
            _ if self.required => Err(PipelineError::Credentials(format!(
                "{} is not set",
                self.var
            ))),
            _ => Ok(None),
        }
    }
}

/// Fixed key, e.g. from a CLI flag
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub Option<String>);

impl CredentialProvider for StaticCredentials {
    fn api_key(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let request = GenerationRequest::new("anything");
        tokio_test::assert_ok!(tokio_test::block_on(AllowAll.authorize(&request)));
    }

    #[test]
    fn test_required_env_credentials() {
        let creds = EnvCredentials::new("DECKFORGE_TEST_UNSET_KEY_7F3A").required();
        assert!(matches!(
            creds.api_key(),
            Err(PipelineError::Credentials(_))
        ));

        let optional = EnvCredentials::new("DECKFORGE_TEST_UNSET_KEY_7F3A");
        assert_eq!(optional.api_key().unwrap(), None);
    }

    #[test]
    fn test_static_credentials() {
        let creds = StaticCredentials(Some("sk-test".to_string()));
        assert_eq!(creds.api_key().unwrap().as_deref(), Some("sk-test"));
    }
}
