use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Session transport is not initialized; call initialize() first")]
    NotInitialized,

    #[error("No prior response exists to regenerate")]
    NoPriorMessage,

    #[error("Timed out after {0:?} waiting on the page")]
    Timeout(Duration),

    #[error("Chat reported an error: {0}")]
    Response(String),

    #[error("Could not get past the Cloudflare interstitial within {0:?}")]
    CloudflareBypass(Duration),

    #[error("Element not found: {0}")]
    ElementNotFound(&'static str),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Browser(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
