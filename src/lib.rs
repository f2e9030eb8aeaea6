//! Unofficial DeepSeek chat client that drives a real Chrome session over the
//! DevTools Protocol, simulating human usage of the web UI: login, message
//! sending, response scraping.
//!
//! ```no_run
//! use deepseek_web::{ChatSession, SendOptions, SessionConfig};
//!
//! # async fn run() -> deepseek_web::Result<()> {
//! let config = SessionConfig::new()
//!     .with_token("your session token")
//!     .headless(true);
//!
//! let mut session = ChatSession::new(config)?;
//! session.initialize().await?;
//!
//! let reply = session.send_message("Hello!", &SendOptions::default()).await?;
//! println!("{}", reply.text);
//!
//! session.logout().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod extract;
mod models;
mod poller;
mod selectors;
mod session;
mod transport;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use models::{ExtractedReply, Response, SearchResult};
pub use poller::ResponsePoller;
pub use session::{ChatSession, SendOptions};
pub use transport::{CdpTransport, Transport};
