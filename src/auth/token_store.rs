//! Workspace token extraction from Slack's Local Storage
//!
//! Slack keeps one `localConfig_v2` record in Chromium's Local Storage, a
//! LevelDB database. Its value is a type-marker byte followed by a JSON
//! document listing every signed-in workspace with its `xoxc-` token.
//! There is no index to look the record up by, so the whole store is scanned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rusty_leveldb::{LdbIterator, Options, Status, StatusCode, DB};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::base::{CredentialError, TokenSource, WorkspaceToken};
use crate::config::AppConfig;
use crate::security::Sanitizer;

/// Substring identifying the local config key
const LOCAL_CONFIG_MARKER: &[u8] = b"localConfig_v2";

/// Chromium Local Storage value encodings
const MARKER_UTF16LE: u8 = 0x00;
const MARKER_LATIN1: u8 = 0x01;

/// One workspace entry of the local config
#[derive(Debug, Deserialize)]
struct LocalTeam {
    name: Option<String>,
    url: Option<String>,
    token: Option<String>,
}

/// Reads per-workspace tokens from Slack's Local Storage
pub struct WorkspaceTokenStore {
    data_dirs: Vec<PathBuf>,
}

impl WorkspaceTokenStore {
    /// Creates a store probing the configured Slack data directories
    ///
    /// Callers are expected to have passed the platform check already.
    pub fn new(config: &AppConfig) -> Self {
        Self::with_data_dirs(config.resolved_data_dirs())
    }

    /// Creates a store probing explicit data directories
    pub fn with_data_dirs(data_dirs: Vec<PathBuf>) -> Self {
        Self { data_dirs }
    }

    /// Returns the Local Storage locations in probe order
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        self.data_dirs
            .iter()
            .map(|dir| dir.join("Local Storage").join("leveldb"))
            .collect()
    }

    /// Returns the first Local Storage directory that exists
    pub fn locate_store(&self) -> Result<PathBuf, CredentialError> {
        let candidates = self.candidate_paths();
        for path in &candidates {
            if path.is_dir() {
                debug!("Using Slack Local Storage at {:?}", path);
                return Ok(path.clone());
            }
        }

        Err(CredentialError::NotFound(format!(
            "Slack Local Storage (looked in {} locations)",
            candidates.len()
        )))
    }

    /// Scans Local Storage and returns one token per workspace, keyed by URL
    pub fn extract_tokens(&self) -> Result<BTreeMap<String, WorkspaceToken>, CredentialError> {
        let path = self.locate_store()?;
        let mut db = open_store(&path)?;

        let mut iter = db
            .new_iter()
            .map_err(|status| classify_store_error(&path, status))?;

        let mut matches = Vec::new();
        let mut scanned = 0usize;
        let (mut key, mut value) = (Vec::new(), Vec::new());
        while iter.advance() {
            if !iter.current(&mut key, &mut value) {
                continue;
            }
            scanned += 1;
            if contains(&key, LOCAL_CONFIG_MARKER) {
                debug!("Found local config under key {}", String::from_utf8_lossy(&key));
                matches.push(value.clone());
            }
        }
        debug!("Scanned {} Local Storage entries", scanned);

        let config = single_local_config(matches)?;
        let tokens = parse_local_config(&config)?;
        info!("Extracted tokens for {} Slack workspace(s)", tokens.len());
        Ok(tokens)
    }
}

impl TokenSource for WorkspaceTokenStore {
    fn extract_tokens(&self) -> Result<BTreeMap<String, WorkspaceToken>, CredentialError> {
        WorkspaceTokenStore::extract_tokens(self)
    }
}

fn open_store(path: &Path) -> Result<DB, CredentialError> {
    let options = Options {
        create_if_missing: false,
        ..Options::default()
    };
    DB::open(path, options).map_err(|status| classify_store_error(path, status))
}

/// Maps a LevelDB failure onto a credential error kind
///
/// A held `LOCK` file means Slack is running, which the user can fix, so it
/// gets its own kind. Everything else is reported as-is.
pub fn classify_store_error(path: &Path, status: Status) -> CredentialError {
    match status.code {
        StatusCode::LockError => CredentialError::StoreLocked {
            path: path.display().to_string(),
        },
        StatusCode::NotFound => CredentialError::NotFound(format!(
            "Slack Local Storage at {}: {}",
            path.display(),
            status.err
        )),
        _ => CredentialError::StoreOpen(format!("{:?}: {}", status.code, status.err)),
    }
}

/// Requires exactly one local config record
fn single_local_config(mut matches: Vec<Vec<u8>>) -> Result<Vec<u8>, CredentialError> {
    match matches.len() {
        0 => Err(CredentialError::NotFound(
            "localConfig_v2 record in Slack's Local Storage".into(),
        )),
        1 => Ok(matches.remove(0)),
        count => Err(CredentialError::AmbiguousConfig { count }),
    }
}

/// Decodes a Local Storage value: marker byte, then text in that encoding
fn decode_value(raw: &[u8]) -> Result<String, CredentialError> {
    let Some((&marker, rest)) = raw.split_first() else {
        return Err(CredentialError::Parse("local config value is empty".into()));
    };

    match marker {
        MARKER_UTF16LE => {
            if rest.len() % 2 != 0 {
                return Err(CredentialError::Parse(format!(
                    "UTF-16 local config has an odd length of {} bytes",
                    rest.len()
                )));
            }
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units)
                .map_err(|e| CredentialError::Parse(format!("local config is not UTF-16: {}", e)))
        }
        MARKER_LATIN1 => Ok(rest.iter().map(|&b| char::from(b)).collect()),
        _ => String::from_utf8(rest.to_vec())
            .map_err(|e| CredentialError::Parse(format!("local config is not UTF-8: {}", e))),
    }
}

/// Parses the local config into tokens keyed by workspace URL
fn parse_local_config(raw: &[u8]) -> Result<BTreeMap<String, WorkspaceToken>, CredentialError> {
    let text = decode_value(raw)?;
    let document: Value = serde_json::from_str(&text)
        .map_err(|e| CredentialError::Parse(format!("local config is not JSON: {}", e)))?;

    let teams = match document.get("teams") {
        Some(Value::Object(teams)) => teams,
        _ => document.as_object().ok_or_else(|| {
            CredentialError::Parse("local config is not a JSON object".into())
        })?,
    };

    let mut tokens = BTreeMap::new();
    for (team_id, entry) in teams {
        let team: LocalTeam = match serde_json::from_value(entry.clone()) {
            Ok(team) => team,
            Err(e) => {
                warn!("Skipping workspace {}: unexpected shape ({})", team_id, e);
                continue;
            }
        };

        let (Some(url), Some(token)) = (team.url, team.token) else {
            warn!("Skipping workspace {}: missing url or token", team_id);
            continue;
        };

        let name = team.name.unwrap_or_else(|| team_id.clone());
        let workspace = WorkspaceToken::new(url, name, token);
        if !workspace.has_valid_prefix() {
            warn!(
                "Skipping workspace {}: token {} is not a client token",
                workspace.url,
                Sanitizer::sanitize_token(&workspace.token)
            );
            continue;
        }

        tokens.insert(workspace.url.clone(), workspace);
    }

    Ok(tokens)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG_KEY: &str = "_https://app.slack.com\x00\x01localConfig_v2";

    fn latin1(json: &str) -> Vec<u8> {
        let mut raw = vec![MARKER_LATIN1];
        raw.extend_from_slice(json.as_bytes());
        raw
    }

    fn two_teams() -> String {
        serde_json::json!({
            "teams": {
                "T01": {"name": "Acme", "url": "https://acme.slack.com/", "token": "xoxc-acme"},
                "T02": {"name": "Beta Corp", "url": "https://beta.slack.com/", "token": "xoxc-beta"}
            },
            "lastActiveTeamId": "T01"
        })
        .to_string()
    }

    /// Writes a Slack-shaped data dir with a Local Storage database
    fn slack_dir_with_entries(entries: &[(&str, Vec<u8>)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Local Storage").join("leveldb");
        std::fs::create_dir_all(&path).unwrap();

        let mut db = DB::open(&path, Options::default()).unwrap();
        for (key, value) in entries {
            db.put(key.as_bytes(), value).unwrap();
        }
        db.flush().unwrap();
        drop(db);
        dir
    }

    #[test]
    fn test_parse_teams_object() {
        let tokens = parse_local_config(&latin1(&two_teams())).unwrap();
        assert_eq!(tokens.len(), 2);

        let acme = &tokens["https://acme.slack.com/"];
        assert_eq!(acme.name, "Acme");
        assert_eq!(acme.token, "xoxc-acme");
        assert_eq!(tokens["https://beta.slack.com/"].name, "Beta Corp");
    }

    #[test]
    fn test_parse_top_level_workspace_map() {
        let json = serde_json::json!({
            "T01": {"name": "Acme", "url": "https://acme.slack.com/", "token": "xoxc-1"}
        })
        .to_string();
        let tokens = parse_local_config(&latin1(&json)).unwrap();
        assert_eq!(tokens["https://acme.slack.com/"].token, "xoxc-1");
    }

    #[test]
    fn test_parse_utf16_value() {
        let json = serde_json::json!({
            "teams": {"T01": {"name": "Café", "url": "https://cafe.slack.com/", "token": "xoxc-c"}}
        })
        .to_string();
        let mut raw = vec![MARKER_UTF16LE];
        for unit in json.encode_utf16() {
            raw.extend_from_slice(&unit.to_le_bytes());
        }

        let tokens = parse_local_config(&raw).unwrap();
        assert_eq!(tokens["https://cafe.slack.com/"].name, "Café");
    }

    #[test]
    fn test_parse_rejects_odd_length_utf16() {
        let mut raw = vec![MARKER_UTF16LE];
        for unit in "{}".encode_utf16() {
            raw.extend_from_slice(&unit.to_le_bytes());
        }
        raw.push(b'x');

        assert!(matches!(parse_local_config(&raw), Err(CredentialError::Parse(_))));
    }

    #[test]
    fn test_parse_latin1_value() {
        let mut raw = vec![MARKER_LATIN1];
        raw.extend_from_slice(b"{\"T1\": {\"name\": \"Caf\xe9\", ");
        raw.extend_from_slice(b"\"url\": \"https://c.slack.com/\", \"token\": \"xoxc-c\"}}");

        let tokens = parse_local_config(&raw).unwrap();
        assert_eq!(tokens["https://c.slack.com/"].name, "Café");
    }

    #[test]
    fn test_parse_skips_invalid_workspaces() {
        let json = serde_json::json!({
            "teams": {
                "T01": {"name": "Acme", "url": "https://acme.slack.com/", "token": "xoxc-acme"},
                "T02": {"name": "Bot", "url": "https://bot.slack.com/", "token": "xoxb-bot"},
                "T03": {"name": "Half", "url": "https://half.slack.com/"},
                "T04": "not an object"
            }
        })
        .to_string();

        let tokens = parse_local_config(&latin1(&json)).unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(tokens.contains_key("https://acme.slack.com/"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_local_config(&latin1("not json")),
            Err(CredentialError::Parse(_))
        ));
        assert!(matches!(parse_local_config(&[]), Err(CredentialError::Parse(_))));
        assert!(matches!(
            parse_local_config(&latin1("[1, 2]")),
            Err(CredentialError::Parse(_))
        ));
    }

    #[test]
    fn test_single_local_config() {
        assert!(matches!(
            single_local_config(vec![]),
            Err(CredentialError::NotFound(_))
        ));
        assert_eq!(single_local_config(vec![b"x".to_vec()]).unwrap(), b"x");
        assert!(matches!(
            single_local_config(vec![b"x".to_vec(), b"y".to_vec()]),
            Err(CredentialError::AmbiguousConfig { count: 2 })
        ));
    }

    #[test]
    fn test_lock_error_is_store_locked() {
        let path = Path::new("/tmp/Local Storage/leveldb");
        let err = classify_store_error(
            path,
            Status::new(StatusCode::LockError, "lock held by another process"),
        );
        assert!(matches!(err, CredentialError::StoreLocked { .. }));
        assert!(err.remediation().unwrap().contains("Quit Slack"));
    }

    #[test]
    fn test_other_open_errors_are_verbatim() {
        let path = Path::new("/tmp/Local Storage/leveldb");
        for message in [
            "bad block",
            "corrupted compressed block contents",
            "block checksum mismatch",
        ] {
            let err = classify_store_error(path, Status::new(StatusCode::Corruption, message));
            match err {
                CredentialError::StoreOpen(msg) => assert!(msg.contains(message)),
                other => panic!("unexpected error for '{}': {:?}", message, other),
            }
        }

        let err = classify_store_error(path, Status::new(StatusCode::NotFound, "CURRENT missing"));
        assert!(matches!(err, CredentialError::NotFound(_)));
    }

    #[test]
    fn test_extract_tokens_from_leveldb() {
        let dir = slack_dir_with_entries(&[
            ("META:https://app.slack.com", vec![0x08, 0x01]),
            (CONFIG_KEY, latin1(&two_teams())),
            ("_https://app.slack.com\x00\x01persist:root", latin1("{}")),
        ]);

        let store = WorkspaceTokenStore::with_data_dirs(vec![dir.path().to_path_buf()]);
        let tokens = store.extract_tokens().unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens["https://beta.slack.com/"].token, "xoxc-beta");
    }

    #[test]
    fn test_extract_tokens_ambiguous_config() {
        let dir = slack_dir_with_entries(&[
            (CONFIG_KEY, latin1(&two_teams())),
            ("_https://app.slack.com\x00\x01localConfig_v2_old", latin1(&two_teams())),
        ]);

        let store = WorkspaceTokenStore::with_data_dirs(vec![dir.path().to_path_buf()]);
        assert!(matches!(
            store.extract_tokens(),
            Err(CredentialError::AmbiguousConfig { count: 2 })
        ));
    }

    #[test]
    fn test_extract_tokens_without_config() {
        let dir = slack_dir_with_entries(&[("_https://app.slack.com\x00\x01other", latin1("{}"))]);

        let store = WorkspaceTokenStore::with_data_dirs(vec![dir.path().to_path_buf()]);
        assert!(matches!(
            store.extract_tokens(),
            Err(CredentialError::NotFound(_))
        ));
    }

    #[test]
    fn test_locate_store_not_found() {
        let empty = TempDir::new().unwrap();
        let store = WorkspaceTokenStore::with_data_dirs(vec![empty.path().to_path_buf()]);
        assert!(matches!(
            store.locate_store(),
            Err(CredentialError::NotFound(_))
        ));
        assert!(store.candidate_paths()[0].ends_with("Local Storage/leveldb"));
    }
}
