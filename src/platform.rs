//! Platform capability check and Slack data locations
//!
//! Session extraction depends on the macOS layout of Slack's data directory
//! and on the macOS keychain holding Slack's master key, so the check is made
//! once, when the broker is built.

use std::path::PathBuf;

use crate::auth::CredentialError;

/// Bundle identifier of the Mac App Store build of Slack
const APP_STORE_BUNDLE_ID: &str = "com.tinyspeck.slackmacgap";

/// Fails with `UnsupportedPlatform` unless running on macOS
pub fn ensure_supported() -> Result<(), CredentialError> {
    ensure_supported_os(std::env::consts::OS)
}

fn ensure_supported_os(os: &str) -> Result<(), CredentialError> {
    if os == "macos" {
        Ok(())
    } else {
        Err(CredentialError::UnsupportedPlatform(format!(
            "Slack session extraction requires macOS (running on {})",
            os
        )))
    }
}

/// Returns Slack's data directories in probe order
///
/// The sandboxed App Store container comes first, then the direct-download
/// location under Application Support.
pub fn slack_data_dirs() -> Vec<PathBuf> {
    match dirs::home_dir() {
        Some(home) => data_dirs_under(&home),
        None => Vec::new(),
    }
}

fn data_dirs_under(home: &std::path::Path) -> Vec<PathBuf> {
    vec![
        home.join("Library")
            .join("Containers")
            .join(APP_STORE_BUNDLE_ID)
            .join("Data")
            .join("Library")
            .join("Application Support")
            .join("Slack"),
        home.join("Library")
            .join("Application Support")
            .join("Slack"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_macos_is_supported() {
        assert!(ensure_supported_os("macos").is_ok());

        let err = ensure_supported_os("linux").unwrap_err();
        assert!(matches!(err, CredentialError::UnsupportedPlatform(_)));
        assert!(err.to_string().contains("linux"));
    }

    #[test]
    fn test_sandboxed_container_probed_first() {
        let dirs = data_dirs_under(std::path::Path::new("/Users/me"));
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].to_string_lossy().contains("Containers"));
        assert!(dirs[0].ends_with("Slack"));
        assert_eq!(
            dirs[1],
            PathBuf::from("/Users/me/Library/Application Support/Slack")
        );
    }
}
