//! Core data types for targets, credentials, and extraction results.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which kind of page a target identifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Person,
    Organization,
}

impl TargetKind {
    /// Path segment used by the target site for this kind.
    pub fn path_segment(self) -> &'static str {
        match self {
            TargetKind::Person => "in",
            TargetKind::Organization => "company",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Person => f.write_str("person"),
            TargetKind::Organization => f.write_str("organization"),
        }
    }
}

/// A vanity identifier plus the kind of page it names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub id: String,
}

fn profile_url_patterns() -> &'static [(Regex, TargetKind); 3] {
    static PATTERNS: OnceLock<[(Regex, TargetKind); 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |p: &str| Regex::new(p).expect("static pattern compiles");
        [
            (compile(r"linkedin\.com/in/([^/?#]+)"), TargetKind::Person),
            (compile(r"linkedin\.com/pub/([^/?#]+)"), TargetKind::Person),
            (compile(r"linkedin\.com/company/([^/?#]+)"), TargetKind::Organization),
        ]
    })
}

impl TargetRef {
    pub fn new(kind: TargetKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn person(id: impl Into<String>) -> Self {
        Self::new(TargetKind::Person, id)
    }

    pub fn organization(id: impl Into<String>) -> Self {
        Self::new(TargetKind::Organization, id)
    }

    /// Navigation URL for this target on `site` (a bare host such as
    /// `www.linkedin.com`).
    pub fn url(&self, site: &str) -> String {
        format!("https://{site}/{}/{}/", self.kind.path_segment(), self.id)
    }

    /// Recognise a profile or company link and pull out its identifier.
    pub fn parse_url(url: &str) -> Option<Self> {
        profile_url_patterns().iter().find_map(|(pattern, kind)| {
            pattern
                .captures(url)
                .and_then(|caps| caps.get(1))
                .map(|m| Self::new(*kind, m.as_str()))
        })
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// The authentication cookie injected into every session.
///
/// Owned by the configuration layer and shared read-only; the token is never
/// printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AuthCredential {
    pub cookie_domain: String,
    pub cookie_name: String,
    pub token: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// Expiry as supplied by configuration: unix seconds or RFC 3339.
    pub expiry: String,
}

impl AuthCredential {
    /// Session cookie for the default site.
    pub fn session_cookie(token: impl Into<String>, expiry: impl Into<String>) -> Self {
        Self {
            cookie_domain: ".www.linkedin.com".to_string(),
            cookie_name: "li_at".to_string(),
            token: token.into(),
            path: "/".to_string(),
            secure: true,
            http_only: true,
            expiry: expiry.into(),
        }
    }

    /// Expiry in seconds since the unix epoch, if the configured value parses.
    pub fn expires_at(&self) -> Option<f64> {
        let raw = self.expiry.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(secs) = raw.parse::<f64>() {
            return Some(secs);
        }
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.timestamp() as f64)
    }
}

impl fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCredential")
            .field("cookie_domain", &self.cookie_domain)
            .field("cookie_name", &self.cookie_name)
            .field("token", &"<redacted>")
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Access state of a loaded page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    Accessible,
    LoginRequired,
    NotFound,
    Unavailable,
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GuardState::Accessible => "accessible",
            GuardState::LoginRequired => "login required",
            GuardState::NotFound => "not found",
            GuardState::Unavailable => "unavailable",
        };
        f.write_str(label)
    }
}

/// One entry of a repeated section (a job, a degree).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionItem {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub date_range: Option<String>,
}

/// Parallel sequences collected from a section.
///
/// Each sequence only grows when its field was found, so the three are not
/// index-aligned when an item is missing a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionBag {
    pub titles: Vec<String>,
    pub subtitles: Vec<String>,
    pub date_ranges: Vec<String>,
}

impl SectionBag {
    /// Append every non-empty field of `item` to its own sequence.
    pub fn push(&mut self, item: SectionItem) {
        fn keep(target: &mut Vec<String>, value: Option<String>) {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                target.push(value);
            }
        }
        keep(&mut self.titles, item.title);
        keep(&mut self.subtitles, item.subtitle);
        keep(&mut self.date_ranges, item.date_range);
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty() && self.subtitles.is_empty() && self.date_ranges.is_empty()
    }
}

/// Extracted person profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub headline: Option<String>,
    pub about: Option<String>,
    pub education: SectionBag,
    pub experience: SectionBag,
}

/// Extracted organization profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub id: String,
    pub name: String,
    pub industry: Option<String>,
    pub about: Option<String>,
}

/// Why a task produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SessionCreation,
    GuardBlocked(GuardState),
    Extraction,
    Timeout,
    Unexpected,
}

/// The single output of an extraction task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractionResult {
    Profile(ProfileRecord),
    Organization(OrganizationRecord),
    Failure { kind: FailureKind, message: String },
}

impl ExtractionResult {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        ExtractionResult::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, ExtractionResult::Failure { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ExtractionResult::Failure { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn as_profile(&self) -> Option<&ProfileRecord> {
        match self {
            ExtractionResult::Profile(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_organization(&self) -> Option<&OrganizationRecord> {
        match self {
            ExtractionResult::Organization(record) => Some(record),
            _ => None,
        }
    }
}
