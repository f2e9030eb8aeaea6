//! Browser-side of the client: owns the Chrome handle and exposes one typed
//! operation per logical UI control.
//!
//! [`Transport`] is the seam the session and poller consume; [`CdpTransport`]
//! is the production implementation on top of chromiumoxide.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::extract;
use crate::models::ExtractedReply;
use crate::selectors;

/// How long the Cloudflare interstitial may hold the page.
const CF_DEADLINE: Duration = Duration::from_secs(30);
/// How long the post-login textbox probe waits before declaring bad credentials.
const LOGIN_DEADLINE: Duration = Duration::from_secs(5);
const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Element-level operations the chat session and poller need.
///
/// One method per logical control; implementations map lookup misses to
/// [`Error::ElementNotFound`] with the control's name.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Writes the whole message into the composer at once.
    async fn insert_message_text(&self, text: &str) -> Result<()>;
    /// Writes a single character; slow-mode pacing lives in the caller.
    async fn type_message_char(&self, c: char) -> Result<()>;
    async fn toggle_deepthink(&self) -> Result<()>;
    async fn toggle_search(&self) -> Result<()>;
    async fn submit_message(&self) -> Result<()>;
    /// Clicks the regenerate control on the newest reply's toolbar.
    async fn click_regenerate(&self) -> Result<()>;
    async fn click_new_chat(&self) -> Result<()>;
    /// Whether the in-progress indicator for a fresh or regenerated reply is up.
    async fn generation_started(&self, regen: bool) -> Result<bool>;
    /// Whether the newest reply has finished rendering. For regenerations the
    /// action toolbar must also have re-attached, otherwise the previous
    /// reply's node would be scraped.
    async fn generation_finished(&self, regen: bool) -> Result<bool>;
    async fn extract_reply(
        &self,
        include_deepthink: bool,
        include_search: bool,
    ) -> Result<ExtractedReply>;
    /// Conversation id from the current page URL, if one is established.
    async fn conversation_id(&self) -> Result<Option<String>>;
    /// Session token from the site's local storage.
    async fn stored_token(&self) -> Result<Option<String>>;
    async fn logout(&self) -> Result<()>;
    async fn shutdown(&mut self) -> Result<()>;
}

/// Closing Chrome is async: call [`Transport::shutdown`], or drop the
/// transport inside a tokio runtime. A drop outside async context cannot
/// close the process and can only log the leak.
pub struct CdpTransport {
    browser: Option<Browser>,
    page: chromiumoxide::page::Page,
    user_data_dir: Option<PathBuf>,
    _handler: tokio::task::JoinHandle<()>,
}

impl CdpTransport {
    /// Launches Chrome, opens the chat page, waits out the Cloudflare
    /// interstitial and authenticates. The browser is closed on every failure
    /// path past launch.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let user_data_dir = std::env::temp_dir().join(format!(
            "deepseek-web-{}",
            chrono::Utc::now().timestamp_millis()
        ));

        let mut builder = BrowserConfig::builder()
            .window_size(1280, 1024)
            .user_data_dir(&user_data_dir)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-backgrounding-occluded-windows")
            .arg("--disable-renderer-backgrounding")
            .arg("--force-color-profile=srgb")
            // Stealth flags to reduce automation detection
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--exclude-switches=enable-automation")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage");
        for arg in &config.chrome_args {
            builder = builder.arg(arg);
        }
        if config.headless {
            builder = builder.arg("--headless=new").arg("--disable-gpu");
        } else {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(Error::Browser)?;

        debug!(headless = config.headless, "launching Chrome");
        let (browser, mut handler) = Browser::launch(browser_config).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    let msg = format!("{e:?}");
                    // Protocol deserialization mismatches are routine noise
                    if !msg.contains("data did not match any variant") {
                        debug!("browser handler error: {e}");
                    }
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let mut browser = browser;
                let _ = browser.close().await;
                let _ = std::fs::remove_dir_all(&user_data_dir);
                return Err(e.into());
            }
        };

        let mut transport = Self {
            browser: Some(browser),
            page,
            user_data_dir: Some(user_data_dir),
            _handler: handler_task,
        };
        if let Err(e) = transport.establish(config).await {
            let _ = transport.shutdown().await;
            return Err(e);
        }
        Ok(transport)
    }

    async fn establish(&self, config: &SessionConfig) -> Result<()> {
        let url = match &config.chat_id {
            Some(id) => format!("{}a/chat/s/{}", selectors::CHAT_URL, id),
            None => selectors::CHAT_URL.to_string(),
        };
        debug!(%url, "navigating to the chat page");
        self.page.goto(url.as_str()).await?;

        tokio::time::sleep(Duration::from_millis(500)).await;
        match tokio::time::timeout(Duration::from_secs(5), self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("navigation wait error (continuing): {e}"),
            Err(_) => debug!("navigation wait timed out (continuing)"),
        }

        if config.attempt_cf_bypass {
            self.wait_for_cloudflare().await?;
        }

        match &config.token {
            Some(token) => self.login_with_token(token, config).await,
            None => self.login_with_form(config, false).await,
        }
    }

    /// Waits for the "Just a moment..." interstitial to clear.
    async fn wait_for_cloudflare(&self) -> Result<()> {
        debug!("verifying the Cloudflare protection");
        let deadline = tokio::time::Instant::now() + CF_DEADLINE;
        loop {
            let title: String = self
                .page
                .evaluate("document.title")
                .await?
                .into_value()
                .unwrap_or_default();
            if !title.to_lowercase().contains("just a moment") {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::CloudflareBypass(CF_DEADLINE));
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Token login: inject into local storage and reload. Falls back to the
    /// form flow when the token does not take.
    async fn login_with_token(&self, token: &str, config: &SessionConfig) -> Result<()> {
        debug!("logging in using the token");
        let script = format!(
            "localStorage.setItem('userToken', JSON.stringify({{value: {}, __version: '0'}}))",
            serde_json::to_string(token)?
        );
        self.page.evaluate(script.as_str()).await?;
        self.page.reload().await?;

        // An invalid token still renders the chat for a split second after the
        // reload, so give the page time to settle before probing.
        tokio::time::sleep(Duration::from_secs(2)).await;

        if self.selector_appears(selectors::MESSAGE_BOX, LOGIN_DEADLINE).await? {
            debug!("token login successful");
            return Ok(());
        }
        debug!("token failed, logging in using email and password");
        self.login_with_form(config, true).await
    }

    async fn login_with_form(&self, config: &SessionConfig, token_failed: bool) -> Result<()> {
        let email = config
            .email
            .as_deref()
            .ok_or_else(|| Error::Auth("no email to fall back on".into()))?;
        let password = config
            .password
            .as_deref()
            .ok_or_else(|| Error::Auth("no password to fall back on".into()))?;

        debug!("entering the email and password");
        let email_input = self.control(selectors::EMAIL_INPUT, "email input").await?;
        email_input.click().await?;
        email_input.type_str(email).await?;

        let password_input = self
            .control(selectors::PASSWORD_INPUT, "password input")
            .await?;
        password_input.click().await?;
        password_input.type_str(password).await?;

        debug!("checking the consent checkbox and logging in");
        self.control(selectors::CONFIRM_CHECKBOX, "consent checkbox")
            .await?
            .click()
            .await?;
        self.control(selectors::LOGIN_BUTTON, "login button")
            .await?
            .click()
            .await?;

        if !self.selector_appears(selectors::MESSAGE_BOX, LOGIN_DEADLINE).await? {
            return Err(Error::Auth(if token_failed {
                "both the token and the email/password pair were rejected".into()
            } else {
                "the email or password is incorrect".into()
            }));
        }
        debug!("logged in using email and password");
        Ok(())
    }

    async fn control(&self, selector: &str, name: &'static str) -> Result<Element> {
        self.page
            .find_element(selector)
            .await
            .map_err(|_| Error::ElementNotFound(name))
    }

    async fn eval_bool(&self, script: String) -> Result<bool> {
        let result = self.page.evaluate(script.as_str()).await?;
        Ok(result.into_value().unwrap_or(false))
    }

    /// Polls until `selector` matches or `deadline` passes.
    async fn selector_appears(&self, selector: &str, deadline: Duration) -> Result<bool> {
        let until = tokio::time::Instant::now() + deadline;
        loop {
            let script = format!("document.querySelector('{selector}') !== null");
            if self.eval_bool(script).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= until {
                return Ok(false);
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
    }

    async fn click_composer_toggle(&self, index: usize, name: &'static str) -> Result<()> {
        let script = format!(
            r#"() => {{
                const parent = document.querySelector('{sel}');
                if (!parent || parent.children.length <= {index}) return false;
                parent.children[{index}].click();
                return true;
            }}"#,
            sel = selectors::SEND_OPTIONS_PARENT,
        );
        if !self.eval_bool(script).await? {
            return Err(Error::ElementNotFound(name));
        }
        Ok(())
    }

    /// Clicks the "Found N results" chip on the newest reply and returns the
    /// panel's HTML once it is up.
    async fn open_search_results(&self) -> Result<Option<String>> {
        let click = format!(
            r#"() => {{
                const replies = document.querySelectorAll('{generated}');
                if (replies.length === 0) return false;
                const last = replies[replies.length - 1];
                for (const extra of Array.from(last.children).slice(1, 3)) {{
                    if (/found \d+ results/i.test(extra.textContent)) {{
                        extra.click();
                        return true;
                    }}
                }}
                return false;
            }}"#,
            generated = selectors::RESPONSE_GENERATED,
        );
        if !self.eval_bool(click).await? {
            return Ok(None);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let fetch = format!(
            r#"() => {{
                const panels = document.querySelectorAll('{panel}');
                return panels.length ? panels[panels.length - 1].outerHTML : null;
            }}"#,
            panel = selectors::SEARCH_RESULTS_PANEL,
        );
        let result = self.page.evaluate(fetch.as_str()).await?;
        Ok(result.into_value().unwrap_or(None))
    }
}

/// Outer HTML snapshots of the newest reply, pulled in one evaluation.
#[derive(Debug, Deserialize)]
struct ReplySnapshot {
    html: String,
    deepthink_html: Option<String>,
}

#[async_trait]
impl Transport for CdpTransport {
    async fn insert_message_text(&self, text: &str) -> Result<()> {
        let textbox = self.control(selectors::MESSAGE_BOX, "message box").await?;
        textbox.click().await?;
        textbox.type_str(text).await?;
        Ok(())
    }

    async fn type_message_char(&self, c: char) -> Result<()> {
        // Re-resolved per character; slow mode is paced far above lookup cost.
        let textbox = self.control(selectors::MESSAGE_BOX, "message box").await?;
        textbox.type_str(c.to_string()).await?;
        Ok(())
    }

    async fn toggle_deepthink(&self) -> Result<()> {
        self.click_composer_toggle(0, "DeepThink toggle").await
    }

    async fn toggle_search(&self) -> Result<()> {
        self.click_composer_toggle(1, "Search toggle").await
    }

    async fn submit_message(&self) -> Result<()> {
        self.control(selectors::SEND_BUTTON, "send button")
            .await?
            .click()
            .await?;
        Ok(())
    }

    async fn click_regenerate(&self) -> Result<()> {
        let script = format!(
            r#"() => {{
                const toolbars = document.querySelectorAll('{toolbar}');
                if (toolbars.length === 0) return false;
                const last = toolbars[toolbars.length - 1];
                if (last.children.length < 2) return false;
                last.children[1].click();
                return true;
            }}"#,
            toolbar = selectors::RESPONSE_TOOLBAR,
        );
        if !self.eval_bool(script).await? {
            return Err(Error::ElementNotFound("regenerate button"));
        }
        Ok(())
    }

    async fn click_new_chat(&self) -> Result<()> {
        self.control(selectors::NEW_CHAT_BUTTON, "new chat button")
            .await?
            .click()
            .await?;
        Ok(())
    }

    async fn generation_started(&self, regen: bool) -> Result<bool> {
        let selector = if regen {
            selectors::REGEN_LOADING_ICON
        } else {
            selectors::RESPONSE_GENERATING
        };
        self.eval_bool(format!("document.querySelector('{selector}') !== null"))
            .await
    }

    async fn generation_finished(&self, regen: bool) -> Result<bool> {
        let script = format!(
            r#"() => {{
                const replies = document.querySelectorAll('{generated}');
                if (replies.length === 0) return false;
                if (!{regen}) return true;
                const last = replies[replies.length - 1];
                return last.querySelector('{toolbar}') !== null;
            }}"#,
            generated = selectors::RESPONSE_GENERATED,
            toolbar = selectors::RESPONSE_TOOLBAR,
        );
        self.eval_bool(script).await
    }

    async fn extract_reply(
        &self,
        include_deepthink: bool,
        include_search: bool,
    ) -> Result<ExtractedReply> {
        debug!("extracting the response text");
        let script = format!(
            r#"() => {{
                const replies = document.querySelectorAll('{generated}');
                if (replies.length === 0) return null;
                const thoughts = document.querySelectorAll('{deepthink}');
                return {{
                    html: replies[replies.length - 1].outerHTML,
                    deepthink_html: thoughts.length
                        ? thoughts[thoughts.length - 1].outerHTML
                        : null,
                }};
            }}"#,
            generated = selectors::RESPONSE_GENERATED,
            deepthink = selectors::DEEPTHINK_CONTENT,
        );
        let snapshot: Option<ReplySnapshot> =
            self.page.evaluate(script.as_str()).await?.into_value().unwrap_or(None);
        let snapshot = snapshot.ok_or(Error::ElementNotFound("generated response"))?;

        let mut reply = ExtractedReply {
            text: extract::reply_text(&snapshot.html),
            ..Default::default()
        };
        let chips = extract::chip_texts(&snapshot.html);
        if include_deepthink {
            reply.deepthink_duration = chips.iter().find_map(|c| extract::thought_duration(c));
            reply.deepthink_content = snapshot
                .deepthink_html
                .as_deref()
                .and_then(extract::deepthink_text);
        }
        if include_search && chips.iter().any(|c| extract::has_search_results(c)) {
            if let Some(panel_html) = self.open_search_results().await? {
                let results = extract::search_results(&panel_html);
                if !results.is_empty() {
                    reply.search_results = Some(results);
                }
            }
        }
        Ok(reply)
    }

    async fn conversation_id(&self) -> Result<Option<String>> {
        let url = self.page.url().await?;
        Ok(url.as_deref().and_then(parse_conversation_id))
    }

    async fn stored_token(&self) -> Result<Option<String>> {
        let script = r#"() => {
            try {
                return JSON.parse(localStorage.getItem('userToken')).value;
            } catch (e) {
                return null;
            }
        }"#;
        let result = self.page.evaluate(script).await?;
        Ok(result.into_value().unwrap_or(None))
    }

    async fn logout(&self) -> Result<()> {
        debug!("logging out");
        self.page
            .evaluate("localStorage.removeItem('userToken')")
            .await?;
        self.page.reload().await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        debug!("closing the browser");
        if let Some(mut browser) = self.browser.take() {
            browser.close().await?;
        }
        if let Some(dir) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                debug!("failed to remove user data dir {}: {e}", dir.display());
            }
        }
        Ok(())
    }
}

impl Drop for CdpTransport {
    fn drop(&mut self) {
        if self.browser.is_none() && self.user_data_dir.is_none() {
            return;
        }
        let browser = self.browser.take();
        let user_data_dir = self.user_data_dir.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Some(mut browser) = browser {
                        let _ = browser.close().await;
                    }
                    if let Some(dir) = user_data_dir {
                        let _ = std::fs::remove_dir_all(dir);
                    }
                });
            }
            Err(_) => {
                warn!(
                    user_data_dir = ?user_data_dir,
                    "transport dropped outside a tokio runtime; the browser \
                     process was leaked, call shutdown() instead"
                );
            }
        }
    }
}

/// Pulls the conversation id out of a `/a/chat/s/{id}` page URL.
fn parse_conversation_id(page_url: &str) -> Option<String> {
    let parsed = url::Url::parse(page_url).ok()?;
    let segments: Vec<_> = parsed.path_segments()?.collect();
    match segments.as_slice() {
        ["a", "chat", "s", id] if !id.is_empty() => Some((*id).to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conversation_id() {
        assert_eq!(
            parse_conversation_id("https://chat.deepseek.com/a/chat/s/abc-123"),
            Some("abc-123".to_string())
        );
        assert_eq!(parse_conversation_id("https://chat.deepseek.com/"), None);
        assert_eq!(
            parse_conversation_id("https://chat.deepseek.com/a/chat/s/"),
            None
        );
        assert_eq!(parse_conversation_id("not a url"), None);
    }
}
