//! Authentication module - Slack session acquisition
//!
//! Produces a validated `{token, cookie}` pair for the Slack Web API from
//! the Slack desktop app's own on-disk state:
//! - Session cookie decrypted from the Chromium cookie database
//! - Per-workspace client tokens read from Local Storage (LevelDB)
//! - Live check via `auth.test`
//! - Extracted credentials cached in the OS keychain (via keyring crate)

mod base;
mod broker;
mod cookie_vault;
mod secure_store;
mod selector;
mod token_store;
mod validator;

pub use base::{
    CookieSource, CredentialError, CredentialSet, CredentialValidator, SessionCookie, TokenSource,
    ValidatedIdentity, WorkspaceToken, COOKIE_PREFIX, TOKEN_PREFIX,
};
pub use broker::CredentialBroker;
pub use cookie_vault::{
    decrypt_cookie_value, CookieVault, EncryptedCookieRecord, EncryptionKey, KeychainMasterKey,
    MasterKeyProvider,
};
pub use secure_store::{KeyringStore, MemoryStore, SecretStore, SecureStoreError, DEFAULT_SERVICE};
pub use selector::resolve_workspaces;
pub use token_store::{classify_store_error, WorkspaceTokenStore};
pub use validator::SlackValidator;
