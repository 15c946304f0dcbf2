//! Core types, errors and seams for Slack session acquisition
//!
//! Everything the broker orchestrates is expressed against the traits in
//! this file, so cookie extraction, token extraction and the live identity
//! check can each be swapped out independently.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::secure_store::SecureStoreError;
use crate::security::Sanitizer;

/// Prefix every Slack session cookie value starts with
pub const COOKIE_PREFIX: &str = "xoxd-";

/// Prefix every Slack client token starts with
pub const TOKEN_PREFIX: &str = "xoxc-";

/// Errors that can occur while acquiring or validating Slack credentials
#[derive(Debug, Error)]
pub enum CredentialError {
    /// An expected artifact is missing (database, log store, secret, record)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Extraction attempted on a platform it cannot support
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Slack's master key material is not in the OS keychain
    #[error("Encryption key unavailable: {0}")]
    KeyUnavailable(String),

    /// Decrypted cookie does not contain an `xoxd-` value
    #[error("Malformed cookie: no xoxd- value in decrypted cookie '{0}'")]
    MalformedCookie(String),

    /// Several live sessions are present and cannot be told apart
    #[error("Found {count} distinct session cookies; cannot choose between them")]
    AmbiguousCredentials { count: usize },

    /// The local storage holds several local config records
    #[error("Found {count} localConfig_v2 records in Slack's local storage")]
    AmbiguousConfig { count: usize },

    /// Slack's local storage is locked by a running Slack instance
    #[error("Slack's local storage at {path} is locked by a running Slack instance")]
    StoreLocked { path: String },

    /// Slack's local storage could not be opened
    #[error("Failed to open Slack's local storage: {0}")]
    StoreOpen(String),

    /// The remote service rejected the credentials
    #[error("Credential validation failed: {0}")]
    ValidationFailed(String),

    /// Encrypted cookie carries a version prefix other than v10/v11
    #[error("Unsupported cookie encryption version: {0}")]
    UnsupportedCookieVersion(String),

    /// Cookie decryption failed
    #[error("Cookie decryption failed: {0}")]
    Decryption(String),

    /// Stored or extracted data could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Cookie database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Secret store error
    #[error("Storage error: {0}")]
    Storage(#[from] SecureStoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CredentialError {
    /// Returns true for the expected "session expired" path
    ///
    /// This is the only kind the broker recovers from on its own.
    pub fn is_routine(&self) -> bool {
        matches!(self, Self::ValidationFailed(_))
    }

    /// Returns what the user can do about this error, if anything
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::StoreLocked { .. } => Some(
                "Quit Slack completely (including its background helper processes) and try again.",
            ),
            Self::KeyUnavailable(_) => Some(
                "Sign in to the Slack desktop app and allow keychain access when prompted.",
            ),
            Self::AmbiguousCredentials { .. } => Some(
                "Sign out of the extra Slack sessions so only one remains, then try again.",
            ),
            Self::NotFound(_) => Some("Install the Slack desktop app and sign in to a workspace."),
            Self::UnsupportedPlatform(_) => {
                Some("Session extraction is only available on macOS.")
            }
            Self::ValidationFailed(_) => Some("Open Slack and sign in again."),
            _ => None,
        }
    }
}

/// The decrypted Slack `d` session cookie
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    /// Cookie name (always `d` for Slack)
    pub name: String,
    /// Cookie value starting with `xoxd-`
    pub value: String,
}

impl SessionCookie {
    /// Creates a new SessionCookie
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Formats the cookie for use in an HTTP Cookie header
    pub fn to_header_value(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("value", &Sanitizer::sanitize_token(&self.value))
            .finish()
    }
}

/// An API token for one connected workspace
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceToken {
    /// Canonical workspace URL (e.g. `https://acme.slack.com/`)
    pub url: String,
    /// Workspace display name
    pub name: String,
    /// Client token starting with `xoxc-`
    pub token: String,
}

impl WorkspaceToken {
    /// Creates a new WorkspaceToken
    pub fn new(url: impl Into<String>, name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            token: token.into(),
        }
    }

    /// Returns true if the token carries the client-token prefix
    pub fn has_valid_prefix(&self) -> bool {
        self.token.starts_with(TOKEN_PREFIX)
    }
}

impl fmt::Debug for WorkspaceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceToken")
            .field("url", &self.url)
            .field("name", &self.name)
            .field("token", &Sanitizer::sanitize_token(&self.token))
            .finish()
    }
}

/// Identity confirmed by Slack's `auth.test`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValidatedIdentity {
    /// User ID (e.g. `U012345`)
    pub user_id: String,
    /// User handle
    pub user: Option<String>,
    /// Team ID (e.g. `T012345`)
    pub team_id: Option<String>,
    /// Team display name
    pub team: Option<String>,
    /// Workspace URL reported by Slack
    pub url: Option<String>,
}

/// Workspace tokens plus the shared session cookie
///
/// Created fresh by extraction and replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialSet {
    /// Tokens keyed by canonical workspace URL
    pub tokens: BTreeMap<String, WorkspaceToken>,
    /// Session cookie shared by every workspace
    pub cookie: SessionCookie,
    /// Identity from the last successful validation (never persisted)
    #[serde(skip)]
    pub identity: Option<ValidatedIdentity>,
    /// When the identity was confirmed
    #[serde(skip)]
    pub validated_at: Option<DateTime<Utc>>,
}

impl CredentialSet {
    /// Creates a new, not yet validated CredentialSet
    pub fn new(tokens: BTreeMap<String, WorkspaceToken>, cookie: SessionCookie) -> Self {
        Self {
            tokens,
            cookie,
            identity: None,
            validated_at: None,
        }
    }

    /// Attaches the identity confirmed by the validator
    pub fn with_identity(mut self, identity: ValidatedIdentity) -> Self {
        self.identity = Some(identity);
        self.validated_at = Some(Utc::now());
        self
    }

    /// Returns the token used to validate the set (lowest URL first)
    pub fn first_token(&self) -> Option<&WorkspaceToken> {
        self.tokens.values().next()
    }

    /// Returns the Cookie header value for API requests
    pub fn cookie_header(&self) -> String {
        self.cookie.to_header_value()
    }

    /// Returns the token for a workspace URL
    pub fn token_for(&self, url: &str) -> Option<&WorkspaceToken> {
        self.tokens.get(url)
    }

    /// Returns true if there are no workspace tokens
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Source of the Slack session cookie
#[cfg_attr(test, mockall::automock)]
pub trait CookieSource: Send + Sync {
    /// Locates, decrypts and returns the session cookie
    fn extract_cookie(&self) -> Result<SessionCookie, CredentialError>;
}

/// Source of per-workspace API tokens
#[cfg_attr(test, mockall::automock)]
pub trait TokenSource: Send + Sync {
    /// Scans Slack's local storage and returns one token per workspace
    fn extract_tokens(&self) -> Result<BTreeMap<String, WorkspaceToken>, CredentialError>;
}

/// Live check that a token/cookie pair is accepted by Slack
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// Calls the identity endpoint and returns who the credentials belong to
    ///
    /// Any transport error or `ok: false` response is a `ValidationFailed`.
    async fn validate(
        &self,
        token: &WorkspaceToken,
        cookie: &SessionCookie,
    ) -> Result<ValidatedIdentity, CredentialError>;
}
