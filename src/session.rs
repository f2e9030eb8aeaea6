//! One conversation against the chat UI.

use std::time::Duration;

use tracing::debug;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::models::Response;
use crate::poller::ResponsePoller;
use crate::transport::{CdpTransport, Transport};

/// Per-send options. `Default` gives a plain 60-second send.
#[derive(Debug, Clone)]
pub struct SendOptions {
    pub deepthink: bool,
    pub search: bool,
    /// Type the message character by character instead of in one shot.
    /// Resembles human typing and reduces automation-detection risk.
    pub slow_mode: bool,
    /// Pause between characters in slow mode.
    pub slow_mode_delay: Duration,
    pub timeout: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            deepthink: false,
            search: false,
            slow_mode: false,
            slow_mode_delay: Duration::from_millis(250),
            timeout: Duration::from_secs(60),
        }
    }
}

impl SendOptions {
    /// Deep-think replies routinely run long; the site pads its own budget.
    const DEEPTHINK_PADDING: Duration = Duration::from_secs(20);
    const SEARCH_PADDING: Duration = Duration::from_secs(60);

    fn effective_timeout(&self) -> Duration {
        let mut timeout = self.timeout;
        if self.deepthink {
            timeout += Self::DEEPTHINK_PADDING;
        }
        if self.search {
            timeout += Self::SEARCH_PADDING;
        }
        timeout
    }
}

/// A stateful wrapper around one conversation.
///
/// All operations take `&mut self`: overlapping calls on one session are
/// rejected at compile time, which also makes the first-send chat-id pin and
/// `reset_chat` impossible to race.
pub struct ChatSession {
    config: SessionConfig,
    transport: Option<Box<dyn Transport>>,
    poller: ResponsePoller,
    chat_id: Option<String>,
    deepthink_enabled: bool,
    search_enabled: bool,
    message_sent: bool,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("config", &self.config)
            .field("transport", &self.transport.is_some())
            .field("poller", &self.poller)
            .field("chat_id", &self.chat_id)
            .field("deepthink_enabled", &self.deepthink_enabled)
            .field("search_enabled", &self.search_enabled)
            .field("message_sent", &self.message_sent)
            .finish()
    }
}

impl ChatSession {
    /// Validates the credentials and builds an uninitialized session.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let chat_id = config.chat_id.clone();
        Ok(Self {
            config,
            transport: None,
            poller: ResponsePoller::default(),
            chat_id,
            deepthink_enabled: false,
            search_enabled: false,
            message_sent: false,
        })
    }

    /// Builds a session over a caller-supplied transport. The transport is
    /// assumed to already be authenticated.
    pub fn with_transport(config: SessionConfig, transport: Box<dyn Transport>) -> Result<Self> {
        let mut session = Self::new(config)?;
        session.transport = Some(transport);
        Ok(session)
    }

    /// Launches the browser, authenticates, and readies the session.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.config.verbose {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("deepseek_web=debug"))
                .with_target(false)
                .try_init();
        }
        let transport = CdpTransport::connect(&self.config).await?;
        self.transport = Some(Box::new(transport));
        Ok(())
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    /// Sends a message and waits for the finished reply.
    pub async fn send_message(&mut self, text: &str, options: &SendOptions) -> Result<Response> {
        let transport = self.transport.as_deref().ok_or(Error::NotInitialized)?;
        if options.timeout.is_zero() {
            return Err(Error::Timeout(options.timeout));
        }
        let timeout = options.effective_timeout();

        debug!(len = text.len(), slow_mode = options.slow_mode, "sending the message");
        if options.slow_mode {
            for c in text.chars() {
                transport.type_message_char(c).await?;
                tokio::time::sleep(options.slow_mode_delay).await;
            }
        } else {
            transport.insert_message_text(text).await?;
        }

        if options.deepthink != self.deepthink_enabled {
            transport.toggle_deepthink().await?;
            self.deepthink_enabled = options.deepthink;
        }
        if options.search != self.search_enabled {
            transport.toggle_search().await?;
            self.search_enabled = options.search;
        }

        transport.submit_message().await?;
        self.message_sent = true;

        let reply = self
            .poller
            .await_completion(transport, false, timeout, options.deepthink, options.search)
            .await?;

        // First message of a fresh conversation pins the chat id.
        if self.chat_id.is_none() {
            match transport.conversation_id().await {
                Ok(Some(id)) => {
                    debug!(%id, "conversation id established");
                    self.chat_id = Some(id);
                }
                Ok(None) => {}
                Err(e) => debug!("could not read the conversation id back: {e}"),
            }
        }

        Ok(Response::from_reply(reply, self.chat_id.clone()))
    }

    /// Discards the newest reply and waits for a regenerated one.
    pub async fn regenerate_response(&mut self, timeout: Duration) -> Result<Response> {
        if !self.message_sent && self.chat_id.is_none() {
            return Err(Error::NoPriorMessage);
        }
        let transport = self.transport.as_deref().ok_or(Error::NotInitialized)?;
        if timeout.is_zero() {
            return Err(Error::Timeout(timeout));
        }

        debug!("regenerating the response");
        transport.click_regenerate().await?;
        let reply = self
            .poller
            .await_completion(
                transport,
                true,
                timeout,
                self.deepthink_enabled,
                self.search_enabled,
            )
            .await?;
        Ok(Response::from_reply(reply, self.chat_id.clone()))
    }

    /// Starts a fresh conversation. Idempotent.
    pub async fn reset_chat(&mut self) -> Result<()> {
        let transport = self.transport.as_deref().ok_or(Error::NotInitialized)?;
        transport.click_new_chat().await?;
        self.chat_id = None;
        self.message_sent = false;
        debug!("chat reset");
        Ok(())
    }

    /// Reads the session token back out of the site's local storage.
    pub async fn retrieve_token(&self) -> Result<Option<String>> {
        let transport = self.transport.as_deref().ok_or(Error::NotInitialized)?;
        transport.stored_token().await
    }

    /// Clears the stored credentials, closes the browser, and invalidates the
    /// session for further use.
    pub async fn logout(&mut self) -> Result<()> {
        let mut transport = self.transport.take().ok_or(Error::NotInitialized)?;
        let logged_out = transport.logout().await;
        transport.shutdown().await?;
        logged_out
    }

    /// Closes the browser without touching the stored credentials.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.transport.take() {
            Some(mut transport) => transport.shutdown().await,
            None => Ok(()),
        }
    }
}
