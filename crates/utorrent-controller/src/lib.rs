//! # uTorrent WebUI client.
//!
//! usage:
//!
//! ```rust,ignore
//! use utorrent_controller::{ClientConfig, WebUiClient};
//! use utorrent_types::TorrentControl;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = WebUiClient::try_new(ClientConfig::from_env())?;
//!     client.register_listener(|credentials| {
//!         println!("new session: {credentials:?}");
//!         Ok(())
//!     });
//!     client.login_with_credentials("127.0.0.1", 8080, "admin", "secret").await?;
//!     let snapshot = client.list_torrents().await?;
//!     for torrent in snapshot.torrents {
//!         println!("{} {}", torrent.hash, torrent.name);
//!     }
//!     Ok(())
//! }
//! ```
//!

mod client;
mod config;
mod conversions;
mod notifier;
mod ops;
mod session;

#[cfg(test)]
mod testutil;

#[cfg(test)]
use {httpmock as _, test_log as _, tracing_subscriber as _};

pub use client::WebUiClient;
pub use config::{ClientConfig, DEFAULT_REQUEST_TIMEOUT, DEFAULT_WEB_ROOT};
pub use notifier::{ListenerError, ListenerId};
pub use ops::HttpTransport;
pub use session::{Credentials, Endpoint, Session, SessionState, Token};
