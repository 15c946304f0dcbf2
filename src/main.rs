//! Diagnostic entry point
//!
//! `slack-session [selector]` prints the resolved workspaces with masked
//! tokens; `slack-session --clear` removes stored credentials.

use anyhow::Context;

use slack_session_lib::auth::{CredentialBroker, CredentialError};
use slack_session_lib::config::AppConfig;
use slack_session_lib::security::Sanitizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    slack_session_lib::init_tracing();

    let config = AppConfig::load();
    let arg = std::env::args().nth(1);

    let broker = CredentialBroker::new(&config).map_err(report)?;

    if arg.as_deref() == Some("--clear") {
        broker
            .clear_credentials()
            .await
            .context("Failed to clear stored credentials")?;
        println!("Stored Slack credentials cleared.");
        return Ok(());
    }

    let credentials = broker.get_credentials(arg.as_deref()).await.map_err(report)?;

    if let Some(identity) = &credentials.identity {
        println!(
            "Signed in as {} ({}) on {}",
            identity.user.as_deref().unwrap_or("unknown"),
            identity.user_id,
            identity.team.as_deref().unwrap_or("unknown team")
        );
    }
    println!("Cookie: {}", Sanitizer::sanitize_token(&credentials.cookie.value));
    for token in credentials.tokens.values() {
        println!(
            "{:<40} {:<30} {}",
            token.url,
            token.name,
            Sanitizer::sanitize_token(&token.token)
        );
    }

    Ok(())
}

/// Prints remediation guidance before handing the error to anyhow
fn report(err: CredentialError) -> anyhow::Error {
    if let Some(hint) = err.remediation() {
        eprintln!("{}", hint);
    }
    anyhow::Error::new(err)
}
