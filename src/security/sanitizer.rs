//! Redaction helpers for logging credentials
//!
//! Slack tokens and cookies must never reach a log line in full.

/// Sanitizer for sensitive data
pub struct Sanitizer;

impl Sanitizer {
    /// Sanitizes a token or cookie value for safe logging
    ///
    /// Keeps the `xox?-` kind prefix (it identifies the credential type and
    /// carries no secret) and the last 4 characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use slack_session_lib::security::Sanitizer;
    ///
    /// assert_eq!(Sanitizer::sanitize_token("xoxc-1234-5678-abcdefgh"), "xoxc-***efgh");
    /// assert_eq!(Sanitizer::sanitize_token("opaque-secret"), "***cret");
    /// assert_eq!(Sanitizer::sanitize_token("abc"), "****");
    /// ```
    pub fn sanitize_token(token: &str) -> String {
        if !token.is_ascii() || token.len() <= 4 {
            return "****".to_string();
        }

        let tail = &token[token.len() - 4..];
        match Self::kind_prefix(token) {
            Some(prefix) if token.len() > prefix.len() + 4 => format!("{}***{}", prefix, tail),
            _ => format!("***{}", tail),
        }
    }

    /// Returns the `xox?-` prefix of a Slack credential, if present
    fn kind_prefix(token: &str) -> Option<&str> {
        let bytes = token.as_bytes();
        if bytes.len() >= 5 && token.starts_with("xox") && bytes[4] == b'-' {
            Some(&token[..5])
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_token_keeps_kind() {
        assert_eq!(
            Sanitizer::sanitize_token("xoxc-1111-2222-3333-abcd"),
            "xoxc-***abcd"
        );
        assert_eq!(
            Sanitizer::sanitize_token("xoxd-AbCdEf%2Fghij"),
            "xoxd-***ghij"
        );
    }

    #[test]
    fn test_sanitize_token_short() {
        assert_eq!(Sanitizer::sanitize_token("abc"), "****");
        assert_eq!(Sanitizer::sanitize_token("abcd"), "****");
        assert_eq!(Sanitizer::sanitize_token("abcde"), "***bcde");
        // Prefix plus four characters would reveal everything
        assert_eq!(Sanitizer::sanitize_token("xoxc-abcd"), "***abcd");
    }

    #[test]
    fn test_sanitize_token_non_ascii() {
        assert_eq!(Sanitizer::sanitize_token("tökén-välue"), "****");
    }
}
