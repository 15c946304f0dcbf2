//! Live credential check against Slack's `auth.test`
//!
//! `auth.test` answers HTTP 200 even for bad credentials; only the `ok`
//! flag in the body says whether they were accepted.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, COOKIE};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::base::{
    CredentialError, CredentialValidator, SessionCookie, ValidatedIdentity, WorkspaceToken,
};
use crate::config::AppConfig;
use crate::security::Sanitizer;

/// `auth.test` response body
#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    error: Option<String>,
    url: Option<String>,
    team: Option<String>,
    user: Option<String>,
    team_id: Option<String>,
    user_id: Option<String>,
}

/// Validates credentials with one `auth.test` round-trip
pub struct SlackValidator {
    client: Client,
    api_base_url: String,
}

impl SlackValidator {
    /// Creates a validator using the configured API base URL and timeout
    pub fn new(config: &AppConfig) -> Result<Self, CredentialError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                CredentialError::Internal(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.clone(),
        })
    }

    /// Creates a validator with custom base URL (for testing)
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_base_url: base_url.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/auth.test", self.api_base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CredentialValidator for SlackValidator {
    async fn validate(
        &self,
        token: &WorkspaceToken,
        cookie: &SessionCookie,
    ) -> Result<ValidatedIdentity, CredentialError> {
        debug!(
            "Validating {} for {} via auth.test",
            Sanitizer::sanitize_token(&token.token),
            token.url
        );

        let response = self
            .client
            .post(self.endpoint())
            .header(AUTHORIZATION, format!("Bearer {}", token.token))
            .header(COOKIE, cookie.to_header_value())
            .send()
            .await
            .map_err(|e| {
                CredentialError::ValidationFailed(format!("auth.test request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::ValidationFailed(format!(
                "auth.test returned HTTP {}",
                status
            )));
        }

        let body: AuthTestResponse = response.json().await.map_err(|e| {
            CredentialError::ValidationFailed(format!("unreadable auth.test response: {}", e))
        })?;

        if !body.ok {
            return Err(CredentialError::ValidationFailed(
                body.error.unwrap_or_else(|| "unknown".to_string()),
            ));
        }

        let user_id = body.user_id.ok_or_else(|| {
            CredentialError::ValidationFailed("auth.test response has no user_id".into())
        })?;

        info!(
            "Slack credentials valid for user {} on {}",
            user_id,
            body.team.as_deref().unwrap_or("unknown team")
        );

        Ok(ValidatedIdentity {
            user_id,
            user: body.user,
            team_id: body.team_id,
            team: body.team,
            url: body.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn acme() -> (WorkspaceToken, SessionCookie) {
        (
            WorkspaceToken::new("https://acme.slack.com/", "Acme", "xoxc-acme"),
            SessionCookie::new("d", "xoxd-abc"),
        )
    }

    #[tokio::test]
    async fn test_validate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .and(header("authorization", "Bearer xoxc-acme"))
            .and(header("cookie", "d=xoxd-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "url": "https://acme.slack.com/",
                "team": "Acme",
                "user": "jdoe",
                "team_id": "T01",
                "user_id": "U01"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (token, cookie) = acme();
        let identity = SlackValidator::with_base_url(&server.uri())
            .validate(&token, &cookie)
            .await
            .unwrap();

        assert_eq!(identity.user_id, "U01");
        assert_eq!(identity.team.as_deref(), Some("Acme"));
        assert_eq!(identity.url.as_deref(), Some("https://acme.slack.com/"));
    }

    #[tokio::test]
    async fn test_semantic_failure_is_validation_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "error": "invalid_auth"
            })))
            .mount(&server)
            .await;

        let (token, cookie) = acme();
        let err = SlackValidator::with_base_url(&server.uri())
            .validate(&token, &cookie)
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            CredentialError::ValidationFailed(reason) if reason == "invalid_auth"
        ));
        assert!(err.is_routine());
    }

    #[tokio::test]
    async fn test_http_error_is_validation_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (token, cookie) = acme();
        let err = SlackValidator::with_base_url(&server.uri())
            .validate(&token, &cookie)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_transport_error_is_validation_failed() {
        let (token, cookie) = acme();
        let err = SlackValidator::with_base_url("http://127.0.0.1:1")
            .validate(&token, &cookie)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::ValidationFailed(_)));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let validator = SlackValidator::with_base_url("https://slack.com/api/");
        assert_eq!(validator.endpoint(), "https://slack.com/api/auth.test");
    }
}
