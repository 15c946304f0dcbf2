//! Workspace resolution for a caller-supplied selector
//!
//! Matching runs in stages and stops at the first stage with any hit:
//! exact URL, exact name, URL substring, name substring. A selector that
//! matches nothing yields the full set.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::base::{CredentialSet, WorkspaceToken};

/// Filters workspace tokens by selector, falling back to all of them
pub fn resolve_workspaces(
    tokens: &BTreeMap<String, WorkspaceToken>,
    selector: Option<&str>,
) -> BTreeMap<String, WorkspaceToken> {
    let Some(selector) = selector.map(str::trim).filter(|s| !s.is_empty()) else {
        return tokens.clone();
    };
    let needle = selector.to_lowercase();

    let stages: [(&str, fn(&WorkspaceToken, &str, &str) -> bool); 4] = [
        ("exact url", |t, raw, _| t.url == raw),
        ("exact name", |t, _, lower| t.name.to_lowercase() == lower),
        ("url substring", |t, _, lower| t.url.to_lowercase().contains(lower)),
        ("name substring", |t, _, lower| t.name.to_lowercase().contains(lower)),
    ];

    for (stage, matches) in stages {
        let hits: BTreeMap<String, WorkspaceToken> = tokens
            .iter()
            .filter(|(_, token)| matches(token, selector, &needle))
            .map(|(url, token)| (url.clone(), token.clone()))
            .collect();

        if !hits.is_empty() {
            debug!("Workspace selector '{}' matched {} by {}", selector, hits.len(), stage);
            return hits;
        }
    }

    warn!(
        "Workspace selector '{}' matched nothing; returning all {} workspaces",
        selector,
        tokens.len()
    );
    tokens.clone()
}

impl CredentialSet {
    /// Narrows the set to the workspaces matching `selector`
    pub fn select(mut self, selector: Option<&str>) -> Self {
        self.tokens = resolve_workspaces(&self.tokens, selector);
        self
    }
}
