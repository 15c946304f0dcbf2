//! Credential broker - validate, refresh and persist Slack credentials
//!
//! The broker trusts stored credentials only after a live check. Stored
//! credentials that Slack rejects are cleared and replaced by a fresh
//! extraction from the desktop app; a fresh set that is rejected too is a
//! hard failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::base::{
    CookieSource, CredentialError, CredentialSet, CredentialValidator, SessionCookie, TokenSource,
    ValidatedIdentity, WorkspaceToken,
};
use super::cookie_vault::CookieVault;
use super::secure_store::{KeyringStore, SecretStore};
use super::token_store::WorkspaceTokenStore;
use super::validator::SlackValidator;
use crate::config::AppConfig;
use crate::platform;
use crate::security::{Sanitizer, SecureString};

/// Secret store key holding the session cookie
const COOKIE_KEY: &str = "cookie";

/// Credentials already confirmed by the validator in this broker's lifetime
struct ValidatedSession {
    token: SecureString,
    cookie: SecureString,
    identity: ValidatedIdentity,
}

impl ValidatedSession {
    fn matches(&self, token: &WorkspaceToken, cookie: &SessionCookie) -> bool {
        self.token == token.token.as_str() && self.cookie == cookie.value.as_str()
    }
}

/// Produces validated Slack credentials for downstream callers
pub struct CredentialBroker {
    store: Arc<dyn SecretStore>,
    cookies: Arc<dyn CookieSource>,
    tokens: Arc<dyn TokenSource>,
    validator: Arc<dyn CredentialValidator>,
    session: RwLock<Option<ValidatedSession>>,
}

impl CredentialBroker {
    /// Creates a broker backed by the keychain, Slack's data directory and
    /// the Slack Web API
    ///
    /// Fails with `UnsupportedPlatform` on anything but macOS.
    pub fn new(config: &AppConfig) -> Result<Self, CredentialError> {
        platform::ensure_supported()?;

        Ok(Self::from_parts(
            Arc::new(KeyringStore::with_service(config.keyring_service.clone())),
            Arc::new(CookieVault::new(config)),
            Arc::new(WorkspaceTokenStore::new(config)),
            Arc::new(SlackValidator::new(config)?),
        ))
    }

    /// Creates a broker from explicit collaborators, skipping the platform check
    pub fn from_parts(
        store: Arc<dyn SecretStore>,
        cookies: Arc<dyn CookieSource>,
        tokens: Arc<dyn TokenSource>,
        validator: Arc<dyn CredentialValidator>,
    ) -> Self {
        Self {
            store,
            cookies,
            tokens,
            validator,
            session: RwLock::new(None),
        }
    }

    /// Returns validated credentials narrowed to `selector`
    ///
    /// A selector matching no workspace returns every workspace.
    pub async fn get_credentials(
        &self,
        selector: Option<&str>,
    ) -> Result<CredentialSet, CredentialError> {
        let stored = match self.load_stored() {
            Ok(stored) => stored,
            Err(CredentialError::Parse(reason)) => {
                warn!("Discarding unreadable stored credentials: {}", reason);
                self.store.clear()?;
                None
            }
            Err(e) => return Err(e),
        };

        match stored {
            Some(set) => match self.validate_set(&set).await {
                Ok(identity) => {
                    info!("Stored Slack credentials are valid");
                    return Ok(set.with_identity(identity).select(selector));
                }
                Err(e) if e.is_routine() => {
                    warn!("Stored Slack credentials rejected ({}); extracting fresh ones", e);
                    self.store.clear()?;
                    self.forget_session().await;
                }
                Err(e) => return Err(e),
            },
            None => info!("No stored Slack credentials; extracting from the desktop app"),
        }

        let fresh = self.extract_fresh().await?;
        let identity = self.validate_set(&fresh).await?;
        self.persist(&fresh)?;

        info!(
            "Extracted and stored credentials for {} Slack workspace(s)",
            fresh.tokens.len()
        );
        Ok(fresh.with_identity(identity).select(selector))
    }

    /// Removes stored credentials and forgets the validated session
    pub async fn clear_credentials(&self) -> Result<(), CredentialError> {
        self.store.clear()?;
        self.forget_session().await;
        info!("Cleared stored Slack credentials");
        Ok(())
    }

    /// Returns true if credentials were validated during this broker's lifetime
    pub async fn has_validated_session(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Reads the stored set; `None` unless both a cookie and tokens exist
    fn load_stored(&self) -> Result<Option<CredentialSet>, CredentialError> {
        let Some(raw_cookie) = self.store.get(COOKIE_KEY)? else {
            return Ok(None);
        };
        let cookie: SessionCookie = serde_json::from_str(&raw_cookie)
            .map_err(|e| CredentialError::Parse(format!("stored cookie: {}", e)))?;

        let mut tokens = BTreeMap::new();
        for key in self.store.list_keys()? {
            if key == COOKIE_KEY {
                continue;
            }
            if let Some(raw) = self.store.get(&key)? {
                let token: WorkspaceToken = serde_json::from_str(&raw)
                    .map_err(|e| CredentialError::Parse(format!("stored token '{}': {}", key, e)))?;
                tokens.insert(token.url.clone(), token);
            }
        }

        if tokens.is_empty() {
            debug!("Stored cookie has no workspace tokens alongside it");
            return Ok(None);
        }

        Ok(Some(CredentialSet::new(tokens, cookie)))
    }

    /// Validates the set's first token, reusing this broker's session if it matches
    async fn validate_set(
        &self,
        set: &CredentialSet,
    ) -> Result<ValidatedIdentity, CredentialError> {
        let token = set
            .first_token()
            .ok_or_else(|| CredentialError::NotFound("no workspace tokens to validate".into()))?;

        if let Some(session) = self.session.read().await.as_ref() {
            if session.matches(token, &set.cookie) {
                debug!("Credentials already validated in this session");
                return Ok(session.identity.clone());
            }
        }

        let identity = self.validator.validate(token, &set.cookie).await?;

        *self.session.write().await = Some(ValidatedSession {
            token: SecureString::from(token.token.as_str()),
            cookie: SecureString::from(set.cookie.value.as_str()),
            identity: identity.clone(),
        });

        Ok(identity)
    }

    /// Extracts the cookie first, then the workspace tokens
    async fn extract_fresh(&self) -> Result<CredentialSet, CredentialError> {
        let cookies = Arc::clone(&self.cookies);
        let cookie = tokio::task::spawn_blocking(move || cookies.extract_cookie())
            .await
            .map_err(|e| {
                CredentialError::Internal(format!("Cookie extraction task failed: {}", e))
            })??;
        debug!(
            "Extracted session cookie {}",
            Sanitizer::sanitize_token(&cookie.value)
        );

        let sources = Arc::clone(&self.tokens);
        let tokens = tokio::task::spawn_blocking(move || sources.extract_tokens())
            .await
            .map_err(|e| {
                CredentialError::Internal(format!("Token extraction task failed: {}", e))
            })??;

        if tokens.is_empty() {
            return Err(CredentialError::NotFound(
                "no workspace tokens in Slack's local storage".into(),
            ));
        }

        Ok(CredentialSet::new(tokens, cookie))
    }

    /// Writes a fresh set, dropping entries for workspaces no longer present
    fn persist(&self, set: &CredentialSet) -> Result<(), CredentialError> {
        for key in self.store.list_keys()? {
            if key != COOKIE_KEY && !set.tokens.contains_key(&key) {
                self.store.delete(&key)?;
            }
        }

        let cookie = serde_json::to_string(&set.cookie)
            .map_err(|e| CredentialError::Internal(format!("Failed to serialize cookie: {}", e)))?;
        self.store.set(COOKIE_KEY, &cookie)?;

        for (url, token) in &set.tokens {
            let value = serde_json::to_string(token).map_err(|e| {
                CredentialError::Internal(format!("Failed to serialize token: {}", e))
            })?;
            self.store.set(url, &value)?;
        }

        Ok(())
    }

    async fn forget_session(&self) {
        *self.session.write().await = None;
    }
}
