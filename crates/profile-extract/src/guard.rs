//! Access-state classification of a freshly loaded page.

use serde::{Deserialize, Serialize};

use crate::renderer::{Locator, RenderContext};
use crate::types::GuardState;

/// Literals that identify guard walls.
///
/// URL rules are path prefixes matched on whole leading segments, so
/// `/login` matches `/login?session_redirect=..` but not `/in/loginov/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardRules {
    /// Structural markers of a login prompt.
    pub login_markers: Vec<Locator>,
    /// Phrases (case-insensitive) in the rendered text of a login prompt.
    pub login_phrases: Vec<String>,
    /// Path prefixes of login redirects.
    pub login_paths: Vec<String>,
    pub not_found_paths: Vec<String>,
    pub not_found_phrases: Vec<String>,
    pub unavailable_paths: Vec<String>,
}

impl Default for GuardRules {
    fn default() -> Self {
        let css = |exprs: &[&str]| -> Vec<Locator> {
            exprs.iter().map(|e| Locator::css(*e)).collect()
        };
        let strings = |items: &[&str]| -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        };
        Self {
            login_markers: css(&[
                ".sign-in-prompt",
                "[data-test-id=\"sign-in-prompt\"]",
                ".auth-wall",
                ".login-prompt",
                ".sign-in-prompt__container",
            ]),
            login_phrases: strings(&["join linkedin", "sign in to view", "sign in to see"]),
            login_paths: strings(&["/authwall", "/login", "/checkpoint", "/uas/login"]),
            not_found_paths: strings(&["/404"]),
            not_found_phrases: strings(&["page not found", "this page doesn't exist"]),
            unavailable_paths: strings(&["/unavailable", "/company/unavailable"]),
        }
    }
}

/// What the detector observed on the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    pub url: String,
    pub text: String,
    pub login_marker: bool,
}

/// Classifies a page into a [`GuardState`].
#[derive(Debug, Clone)]
pub struct GuardDetector {
    rules: GuardRules,
}

impl GuardDetector {
    pub fn new(rules: GuardRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &GuardRules {
        &self.rules
    }

    /// Inspect the live page and classify it.
    ///
    /// Read failures are treated as "nothing observed" so a flaky page can
    /// still be classified from whatever was readable.
    pub async fn classify(&self, ctx: &dyn RenderContext) -> GuardState {
        let snapshot = self.observe(ctx).await;
        let state = self.classify_snapshot(&snapshot);
        tracing::debug!(url = %snapshot.url, %state, "page classified");
        state
    }

    async fn observe(&self, ctx: &dyn RenderContext) -> PageSnapshot {
        let mut login_marker = false;
        for marker in &self.rules.login_markers {
            match ctx.find_all(None, marker).await {
                Ok(found) if !found.is_empty() => {
                    tracing::debug!("login marker present: {marker}");
                    login_marker = true;
                    break;
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("marker lookup {marker} failed: {e:#}"),
            }
        }

        let url = ctx.current_url().await.unwrap_or_else(|e| {
            tracing::debug!("could not read current url: {e:#}");
            String::new()
        });
        let text = ctx.page_text().await.unwrap_or_else(|e| {
            tracing::debug!("could not read page text: {e:#}");
            String::new()
        });

        PageSnapshot {
            url,
            text,
            login_marker,
        }
    }

    /// Login wall, then not-found, then unavailable, else accessible.
    pub fn classify_snapshot(&self, page: &PageSnapshot) -> GuardState {
        let rules = &self.rules;
        let text = page.text.to_lowercase();
        let path = url_path(&page.url);

        let login = page.login_marker
            || contains_any(&text, &rules.login_phrases)
            || starts_with_any(&path, &rules.login_paths);
        if login {
            return GuardState::LoginRequired;
        }
        if starts_with_any(&path, &rules.not_found_paths)
            || contains_any(&text, &rules.not_found_phrases)
        {
            return GuardState::NotFound;
        }
        if starts_with_any(&path, &rules.unavailable_paths) {
            return GuardState::Unavailable;
        }
        GuardState::Accessible
    }
}

impl Default for GuardDetector {
    fn default() -> Self {
        Self::new(GuardRules::default())
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|n| !n.is_empty() && haystack.contains(&n.to_lowercase()))
}

/// Lowercased path segments of `raw`. Unparseable input yields no segments.
fn url_path(raw: &str) -> Vec<String> {
    match url::Url::parse(raw) {
        Ok(parsed) => segments(parsed.path()),
        Err(_) => Vec::new(),
    }
}

fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn starts_with_any(path: &[String], prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        let prefix = segments(prefix);
        !prefix.is_empty() && path.starts_with(&prefix)
    })
}
