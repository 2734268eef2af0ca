//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `SessionLauncher` and `RenderContext` traits that abstract over
//! the browser engine (Chromium via chromiumoxide in production, a scripted
//! in-memory page in tests).

pub mod chromium;
pub mod scripted;
pub mod stealth;

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BrowserSettings;
use crate::types::AuthCredential;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// How to find nodes in a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "expr", rename_all = "snake_case")]
pub enum Locator {
    XPath(String),
    Css(String),
}

impl Locator {
    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    pub fn css(expr: impl Into<String>) -> Self {
        Locator::Css(expr.into())
    }

    pub fn expression(&self) -> &str {
        match self {
            Locator::XPath(expr) | Locator::Css(expr) => expr,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::XPath(expr) => write!(f, "xpath:{expr}"),
            Locator::Css(expr) => write!(f, "css:{expr}"),
        }
    }
}

/// What to read from a located node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ValueSource {
    /// Rendered text of the node.
    #[default]
    Text,
    /// A property or attribute of the node (e.g. `src`).
    Attribute(String),
}

/// Opaque handle to a node located in the current page.
///
/// Handles are only meaningful for the context that produced them and until
/// the next navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef(pub u64);

/// Creates isolated rendering sessions.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Start a fresh, isolated browser and return its single page.
    async fn launch(&self, settings: &BrowserSettings) -> Result<Box<dyn RenderContext>>;
}

/// One live page inside an isolated browser.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationResult>;
    /// Get the current URL.
    async fn current_url(&self) -> Result<String>;
    /// Rendered text of the whole document body.
    async fn page_text(&self) -> Result<String>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Install the authentication cookie.
    async fn set_cookie(&self, credential: &AuthCredential) -> Result<()>;
    /// All nodes matching `locator`, in document order, below `scope`
    /// (the whole document when `None`).
    async fn find_all(&self, scope: Option<ElementRef>, locator: &Locator)
        -> Result<Vec<ElementRef>>;
    /// Read a value from a node; `None` when the node has no such value.
    async fn read(&self, element: ElementRef, source: &ValueSource) -> Result<Option<String>>;
    /// Scroll a node into view. Returns `false` when it is hidden or disabled.
    async fn scroll_into_view(&self, element: ElementRef) -> Result<bool>;
    /// Click a node.
    async fn click(&self, element: ElementRef) -> Result<()>;
    /// Current document height in pixels.
    async fn scroll_height(&self) -> Result<u64>;
    /// Scroll the window to the bottom of the document.
    async fn scroll_to_bottom(&self) -> Result<()>;
    /// Close this context and the browser behind it.
    async fn close(self: Box<Self>) -> Result<()>;
}
