//! Completion polling for in-flight replies.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};
use crate::extract;
use crate::models::ExtractedReply;
use crate::transport::Transport;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Polls the page at a fixed short interval until the newest reply finishes
/// rendering, then extracts it. No retry on timeout; the caller decides
/// whether to regenerate.
#[derive(Debug)]
pub struct ResponsePoller {
    interval: Duration,
}

impl Default for ResponsePoller {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
        }
    }
}

impl ResponsePoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Waits up to `timeout` for the reply to start and finish generating,
    /// then extracts its content.
    ///
    /// Two wait phases: generation start is observed first so a previous
    /// reply is never scraped by mistake, then generation end. A zero
    /// `timeout` fails immediately without touching the page.
    pub async fn await_completion(
        &self,
        transport: &dyn Transport,
        regen: bool,
        timeout: Duration,
        include_deepthink: bool,
        include_search: bool,
    ) -> Result<ExtractedReply> {
        if timeout.is_zero() {
            return Err(Error::Timeout(timeout));
        }
        let deadline = Instant::now() + timeout;

        debug!(regen, "waiting for the response to start generating");
        self.poll(deadline, timeout, || transport.generation_started(regen))
            .await?;

        debug!(regen, "waiting for the response to finish generating");
        self.poll(deadline, timeout, || transport.generation_finished(regen))
            .await?;

        let reply = transport
            .extract_reply(include_deepthink, include_search)
            .await?;
        // A busy page renders as an ordinary reply
        if extract::is_server_busy(&reply.text) {
            return Err(Error::Response(reply.text));
        }
        Ok(reply)
    }

    async fn poll<F, Fut>(&self, deadline: Instant, timeout: Duration, mut check: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<bool>>,
    {
        loop {
            if check().await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(timeout));
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Page stand-in that starts immediately and finishes after a fixed
    /// number of finish polls.
    struct ScriptedPage {
        finish_after: usize,
        finish_polls: AtomicUsize,
        text: &'static str,
    }

    impl ScriptedPage {
        fn new(finish_after: usize, text: &'static str) -> Self {
            Self {
                finish_after,
                finish_polls: AtomicUsize::new(0),
                text,
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedPage {
        async fn insert_message_text(&self, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn type_message_char(&self, _c: char) -> Result<()> {
            Ok(())
        }
        async fn toggle_deepthink(&self) -> Result<()> {
            Ok(())
        }
        async fn toggle_search(&self) -> Result<()> {
            Ok(())
        }
        async fn submit_message(&self) -> Result<()> {
            Ok(())
        }
        async fn click_regenerate(&self) -> Result<()> {
            Ok(())
        }
        async fn click_new_chat(&self) -> Result<()> {
            Ok(())
        }
        async fn generation_started(&self, _regen: bool) -> Result<bool> {
            Ok(true)
        }
        async fn generation_finished(&self, _regen: bool) -> Result<bool> {
            let polls = self.finish_polls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(polls >= self.finish_after)
        }
        async fn extract_reply(
            &self,
            _include_deepthink: bool,
            _include_search: bool,
        ) -> Result<ExtractedReply> {
            Ok(ExtractedReply {
                text: self.text.to_string(),
                ..Default::default()
            })
        }
        async fn conversation_id(&self) -> Result<Option<String>> {
            Ok(None)
        }
        async fn stored_token(&self) -> Result<Option<String>> {
            Ok(None)
        }
        async fn logout(&self) -> Result<()> {
            Ok(())
        }
        async fn shutdown(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn poller() -> ResponsePoller {
        ResponsePoller::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_when_timeout_covers_the_poll_cycles() {
        let page = ScriptedPage::new(3, "done");
        let reply = poller()
            .await_completion(&page, false, Duration::from_secs(2), false, false)
            .await
            .unwrap();
        assert_eq!(reply.text, "done");
        assert_eq!(page.finish_polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_timeout_covers_fewer_cycles() {
        // 500ms at a 250ms interval allows three finish polls; completion
        // needs five.
        let page = ScriptedPage::new(5, "late");
        let err = poller()
            .await_completion(&page, false, Duration::from_millis(500), false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_fails_without_polling() {
        let page = ScriptedPage::new(1, "never");
        let err = poller()
            .await_completion(&page, false, Duration::ZERO, false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(page.finish_polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_page_surfaces_as_a_response_error() {
        let page = ScriptedPage::new(1, "The server is busy. Please try again later.");
        let err = poller()
            .await_completion(&page, false, Duration::from_secs(5), false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Response(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_completion_polls_once() {
        let page = ScriptedPage::new(1, "fast");
        let reply = poller()
            .await_completion(&page, true, Duration::from_secs(30), false, false)
            .await
            .unwrap();
        assert_eq!(reply.text, "fast");
        assert_eq!(page.finish_polls.load(Ordering::SeqCst), 1);
    }
}
