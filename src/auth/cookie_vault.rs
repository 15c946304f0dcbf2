//! Slack session cookie extraction
//!
//! Slack's desktop app is Chromium-based and keeps its cookies in a SQLite
//! database, encrypted the way Chromium does on macOS:
//!
//! - the master key material lives in the keychain (`Slack Safe Storage`)
//! - the AES key is PBKDF2-HMAC-SHA1(material, "saltysalt", 1003 rounds)
//! - each value is `v10`/`v11` + AES-128-CBC ciphertext with an IV of 16 spaces
//!
//! The database is only ever opened read-only; Slack may be running.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use aes::Aes128;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
use keyring::Entry;
use rusqlite::{Connection, OpenFlags};
use sha1::Sha1;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::base::{CookieSource, CredentialError, SessionCookie, COOKIE_PREFIX};
use crate::config::AppConfig;
use crate::security::{Sanitizer, SecureBytes, SecureString};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Salt Chromium uses for cookie key derivation
const KEY_SALT: &[u8] = b"saltysalt";
/// PBKDF2 rounds Chromium uses on macOS
const KEY_ITERATIONS: u32 = 1003;
const KEY_LEN: usize = 16;
const BLOCK_SIZE: usize = 16;
/// Chromium's fixed IV: 16 ASCII spaces
const FIXED_IV: [u8; BLOCK_SIZE] = [b' '; BLOCK_SIZE];
const VERSION_PREFIX_LEN: usize = 3;
const SUPPORTED_VERSIONS: [&[u8]; 2] = [b"v10", b"v11"];

/// A 128-bit AES key derived from Slack's master key material
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Derives the cookie key from the keychain secret
    ///
    /// Salt, round count and hash must match Chromium exactly: a mismatch
    /// does not error, it just decrypts to garbage.
    pub fn derive(secret: &str) -> Self {
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha1>(secret.as_bytes(), KEY_SALT, KEY_ITERATIONS, &mut key);
        Self(key)
    }

    /// Returns the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// One row of the `cookies` table
#[derive(Debug, Clone)]
pub struct EncryptedCookieRecord {
    /// Cookie name
    pub name: String,
    /// Version prefix followed by the AES-CBC payload
    pub ciphertext: Vec<u8>,
}

/// Source of Slack's cookie master key material
pub trait MasterKeyProvider: Send + Sync {
    /// Returns the raw master key material
    fn master_secret(&self) -> Result<SecureString, CredentialError>;
}

/// Reads the master key material from the OS keychain
pub struct KeychainMasterKey {
    service: String,
    accounts: Vec<String>,
}

impl KeychainMasterKey {
    /// Creates a provider probing `accounts` in order under `service`
    pub fn new(service: impl Into<String>, accounts: Vec<String>) -> Self {
        Self {
            service: service.into(),
            accounts,
        }
    }
}

impl MasterKeyProvider for KeychainMasterKey {
    fn master_secret(&self) -> Result<SecureString, CredentialError> {
        for account in &self.accounts {
            let entry = match Entry::new(&self.service, account) {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping keychain account '{}': {}", account, e);
                    continue;
                }
            };
            match entry.get_password() {
                Ok(secret) => {
                    debug!("Found Slack master key under account '{}'", account);
                    return Ok(SecureString::new(secret));
                }
                Err(keyring::Error::NoEntry) => {
                    debug!("No keychain entry '{}' / '{}'", self.service, account);
                }
                Err(e) => {
                    debug!("Keychain lookup for '{}' failed: {}", account, e);
                }
            }
        }

        Err(CredentialError::KeyUnavailable(format!(
            "no '{}' entry in the keychain (tried {})",
            self.service,
            self.accounts.join(", ")
        )))
    }
}

/// Extracts the Slack `d` cookie from Slack's cookie database
pub struct CookieVault {
    data_dirs: Vec<PathBuf>,
    cookie_name: String,
    keys: Box<dyn MasterKeyProvider>,
}

impl CookieVault {
    /// Creates a CookieVault reading the master key from the keychain
    pub fn new(config: &AppConfig) -> Self {
        Self::with_parts(
            config.resolved_data_dirs(),
            config.cookie_name.clone(),
            KeychainMasterKey::new(
                config.safe_storage_service.clone(),
                config.safe_storage_accounts.clone(),
            ),
        )
    }

    /// Creates a CookieVault from explicit parts
    pub fn with_parts(
        data_dirs: Vec<PathBuf>,
        cookie_name: impl Into<String>,
        keys: impl MasterKeyProvider + 'static,
    ) -> Self {
        Self {
            data_dirs,
            cookie_name: cookie_name.into(),
            keys: Box::new(keys),
        }
    }

    /// Returns the cookie database locations in probe order
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        self.data_dirs
            .iter()
            .flat_map(|dir| [dir.join("Cookies"), dir.join("Network").join("Cookies")])
            .collect()
    }

    /// Returns the first cookie database that exists
    pub fn locate_database(&self) -> Result<PathBuf, CredentialError> {
        let candidates = self.candidate_paths();
        for path in &candidates {
            if path.is_file() {
                debug!("Using Slack cookie database at {:?}", path);
                return Ok(path.clone());
            }
            debug!("No cookie database at {:?}", path);
        }

        Err(CredentialError::NotFound(format!(
            "Slack cookie database (looked in {} locations)",
            candidates.len()
        )))
    }

    /// Fetches the master key material and derives the AES key
    pub fn derive_encryption_key(&self) -> Result<EncryptionKey, CredentialError> {
        let secret = self.keys.master_secret()?;
        Ok(EncryptionKey::derive(secret.as_str()))
    }

    /// Extracts and decrypts the session cookie
    pub fn extract_cookie(&self) -> Result<SessionCookie, CredentialError> {
        let db_path = self.locate_database()?;
        let records = read_records(&db_path, &self.cookie_name)?;
        if records.is_empty() {
            return Err(CredentialError::NotFound(format!(
                "cookie '{}' in {}",
                self.cookie_name,
                db_path.display()
            )));
        }
        debug!("Found {} '{}' cookie record(s)", records.len(), self.cookie_name);

        let key = self.derive_encryption_key()?;

        let mut decrypted: Vec<(String, SecureBytes)> = Vec::with_capacity(records.len());
        let mut first_error = None;
        for record in &records {
            match decrypt_cookie_value(&record.ciphertext, &key) {
                Ok(plain) => decrypted.push((record.name.clone(), plain)),
                Err(e) => {
                    debug!("Skipping undecryptable '{}' record: {}", record.name, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        let Some((name, plain)) = decrypted.first() else {
            return Err(first_error.unwrap_or_else(|| {
                CredentialError::Decryption("no cookie record could be decrypted".into())
            }));
        };

        if decrypted.len() > 1 {
            let distinct: BTreeSet<String> = decrypted
                .iter()
                .filter_map(|(_, plain)| session_value(plain))
                .collect();
            if distinct.len() > 1 {
                return Err(CredentialError::AmbiguousCredentials {
                    count: distinct.len(),
                });
            }
        }

        let value =
            session_value(plain).ok_or_else(|| CredentialError::MalformedCookie(name.clone()))?;
        info!(
            "Extracted Slack session cookie '{}' ({})",
            name,
            Sanitizer::sanitize_token(&value)
        );

        Ok(SessionCookie::new(name.clone(), value))
    }
}

impl CookieSource for CookieVault {
    fn extract_cookie(&self) -> Result<SessionCookie, CredentialError> {
        CookieVault::extract_cookie(self)
    }
}

/// Reads every record for a cookie, longest ciphertext first
///
/// Stale duplicates from earlier sessions are shorter; the longest blob is
/// the live one.
fn read_records(
    path: &Path,
    cookie_name: &str,
) -> Result<Vec<EncryptedCookieRecord>, CredentialError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let mut stmt = conn.prepare(
        "SELECT name, encrypted_value
         FROM cookies
         WHERE name = ?1
         ORDER BY LENGTH(encrypted_value) DESC",
    )?;

    let rows = stmt.query_map([cookie_name], |row| {
        Ok(EncryptedCookieRecord {
            name: row.get(0)?,
            ciphertext: row.get(1)?,
        })
    })?;

    let records = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Decrypts one `v10`/`v11` cookie value
///
/// Returns the plaintext with trailing padding removed. The plaintext may
/// start with binary bytes (newer Chromium prepends a host hash); callers
/// look for the `xoxd-` value inside it.
pub fn decrypt_cookie_value(
    ciphertext: &[u8],
    key: &EncryptionKey,
) -> Result<SecureBytes, CredentialError> {
    if ciphertext.len() < VERSION_PREFIX_LEN {
        return Err(CredentialError::UnsupportedCookieVersion(format!(
            "record of {} bytes has no version prefix",
            ciphertext.len()
        )));
    }

    let (version, payload) = ciphertext.split_at(VERSION_PREFIX_LEN);
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(CredentialError::UnsupportedCookieVersion(
            String::from_utf8_lossy(version).into_owned(),
        ));
    }

    if payload.is_empty() || payload.len() % BLOCK_SIZE != 0 {
        return Err(CredentialError::Decryption(format!(
            "payload of {} bytes is not a whole number of AES blocks",
            payload.len()
        )));
    }

    let mut buf = SecureBytes::from_slice(payload);
    let decrypted_len = Aes128CbcDec::new_from_slices(key.as_bytes(), &FIXED_IV)
        .map_err(|e| CredentialError::Decryption(format!("Invalid key: {}", e)))?
        .decrypt_padded_mut::<NoPadding>(buf.as_mut_bytes())
        .map_err(|e| CredentialError::Decryption(format!("AES-CBC decryption failed: {}", e)))?
        .len();
    buf.truncate(decrypted_len);

    let unpadded = unpadded_len(buf.as_bytes());
    buf.truncate(unpadded);
    Ok(buf)
}

/// Length of the plaintext once trailing NUL padding is removed
///
/// Only zero bytes are stripped. Slack's padding scheme is unconfirmed, so a
/// PKCS#7 trailer is left in place rather than guessed at.
fn unpadded_len(plain: &[u8]) -> usize {
    plain.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1)
}

/// Returns the `xoxd-...` value inside a decrypted cookie, skipping any
/// leading garbage
fn session_value(plain: &[u8]) -> Option<String> {
    let prefix = COOKIE_PREFIX.as_bytes();
    let start = plain.windows(prefix.len()).position(|w| w == prefix)?;
    Some(String::from_utf8_lossy(&plain[start..]).into_owned())
}
