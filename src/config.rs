use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Construction parameters for a chat session.
///
/// Either `token` alone, or `email` and `password` together, must be set
/// before the session is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub token: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Resume an existing conversation instead of starting a fresh one.
    pub chat_id: Option<String>,
    pub headless: bool,
    /// Installs a DEBUG-level subscriber on initialize when set.
    pub verbose: bool,
    /// Passthrough Chrome launch flags.
    pub chrome_args: Vec<String>,
    pub attempt_cf_bypass: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token: None,
            email: None,
            password: None,
            chat_id: None,
            headless: true,
            verbose: false,
            chrome_args: Vec::new(),
            attempt_cf_bypass: true,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_credentials(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_chrome_args(mut self, args: Vec<String>) -> Self {
        self.chrome_args = args;
        self
    }

    pub fn attempt_cf_bypass(mut self, attempt: bool) -> Self {
        self.attempt_cf_bypass = attempt;
        self
    }

    /// Either the token alone or the email and password both must be provided.
    pub fn validate(&self) -> Result<()> {
        if self.token.is_none() && (self.email.is_none() || self.password.is_none()) {
            return Err(Error::Auth(
                "either a token or an email/password pair must be provided".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert!(config.headless);
        assert!(config.attempt_cf_bypass);
        assert!(!config.verbose);
        assert!(config.chrome_args.is_empty());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_alone_is_valid() {
        let config = SessionConfig::new().with_token("tok");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_email_without_password_is_rejected() {
        let mut config = SessionConfig::new();
        config.email = Some("user@example.com".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_pair_is_valid() {
        let config = SessionConfig::new().with_credentials("user@example.com", "hunter2");
        assert!(config.validate().is_ok());
    }
}
