//! slack-session - Slack credentials from the Slack desktop app
//!
//! Acquires a validated workspace token and session cookie for the Slack
//! Web API by reading what the signed-in desktop app already keeps on disk.
//!
//! ## Features
//!
//! - Session cookie decryption (Chromium cookie store, macOS keychain key)
//! - Per-workspace token extraction from Slack's Local Storage
//! - Live validation via `auth.test` with automatic refresh of stale credentials
//! - Secure credential caching (macOS Keychain, Windows Credential Manager, Linux Secret Service)
//! - Workspace selection by URL or name
//!
//! ## Architecture
//!
//! - **Auth**: extraction, validation, caching and the broker tying them together
//! - **Security**: sanitization and zeroizing secret containers
//! - **Config**: persisted settings
//! - **Platform**: capability check and Slack data locations
//!
//! ## Example
//!
//! ```no_run
//! use slack_session_lib::auth::CredentialBroker;
//! use slack_session_lib::config::AppConfig;
//!
//! # async fn run() -> Result<(), slack_session_lib::auth::CredentialError> {
//! let broker = CredentialBroker::new(&AppConfig::load())?;
//! let credentials = broker.get_credentials(Some("acme")).await?;
//! for token in credentials.tokens.values() {
//!     println!("{} -> {}", token.name, token.url);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod platform;
pub mod security;

use tracing_subscriber::EnvFilter;

/// Default log filter when `RUST_LOG` is not set
const DEFAULT_LOG_FILTER: &str = "slack_session_lib=debug,slack_session=debug,info";

/// Initializes logging
///
/// Honors `RUST_LOG`; does nothing if a subscriber is already installed.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
