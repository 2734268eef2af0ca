//! Scripted in-memory renderer.
//!
//! `ScriptedPage` answers the [`RenderContext`] calls from a small fake node
//! tree instead of a browser. Nodes are matched by the literal locator
//! expression they were registered under, so any selector catalog can be
//! exercised offline. Every call is counted, and failures, panics and slow
//! navigations can be injected to drive the engine's error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{ElementRef, Locator, NavigationResult, RenderContext, SessionLauncher, ValueSource};
use crate::config::BrowserSettings;
use crate::types::AuthCredential;

/// Description of a fake node.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    matches: Vec<String>,
    text: Option<String>,
    attrs: HashMap<String, String>,
    hidden: bool,
    disabled: bool,
    reveals: Option<Box<NodeSpec>>,
}

impl NodeSpec {
    /// A node found by any of the given locator expressions.
    pub fn new<S: AsRef<str>>(matches: &[S]) -> Self {
        Self {
            matches: matches.iter().map(|m| m.as_ref().to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Clicking this node appends `node` as a new top-level node.
    pub fn reveals(mut self, node: NodeSpec) -> Self {
        self.reveals = Some(Box::new(node));
        self
    }
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<usize>,
    spec: NodeSpec,
    clicks: usize,
}

#[derive(Debug, Clone)]
struct PageState {
    nodes: Vec<Node>,
    url: String,
    text: String,
    redirects: HashMap<String, String>,
    navigations: Vec<String>,
    navigate_delay: Duration,
    navigate_error: Option<String>,
    cookies: Vec<AuthCredential>,
    cookie_error: Option<String>,
    lookups: HashMap<String, usize>,
    lookup_errors: HashMap<String, String>,
    panic_on: Option<String>,
    panic_on_close: bool,
    script_result: serde_json::Value,
    script_calls: usize,
    base_height: u64,
    height_step: u64,
    grows_for: u32,
    scrolls: u32,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            url: "about:blank".to_string(),
            text: String::new(),
            redirects: HashMap::new(),
            navigations: Vec::new(),
            navigate_delay: Duration::ZERO,
            navigate_error: None,
            cookies: Vec::new(),
            cookie_error: None,
            lookups: HashMap::new(),
            lookup_errors: HashMap::new(),
            panic_on: None,
            panic_on_close: false,
            script_result: serde_json::Value::Null,
            script_calls: 0,
            base_height: 1000,
            height_step: 600,
            grows_for: 0,
            scrolls: 0,
        }
    }
}

impl PageState {
    fn is_within(&self, node: usize, scope: usize) -> bool {
        let mut current = self.nodes[node].parent;
        while let Some(parent) = current {
            if parent == scope {
                return true;
            }
            current = self.nodes[parent].parent;
        }
        false
    }

    fn node(&self, element: ElementRef) -> Result<&Node> {
        self.nodes
            .get(element.0 as usize)
            .ok_or_else(|| anyhow!("stale element reference {}", element.0))
    }

    fn height(&self) -> u64 {
        self.base_height + u64::from(self.scrolls.min(self.grows_for)) * self.height_step
    }
}

/// Counters shared by every page a [`ScriptedLauncher`] hands out.
#[derive(Debug, Default)]
pub struct LaunchStats {
    attempts: AtomicU32,
    launched: AtomicUsize,
    closed: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
}

impl LaunchStats {
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn peak_live(&self) -> usize {
        self.peak_live.load(Ordering::SeqCst)
    }
}

/// A fake page driven entirely from memory.
#[derive(Clone, Default)]
pub struct ScriptedPage {
    state: Arc<Mutex<PageState>>,
    stats: Option<Arc<LaunchStats>>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        // An injected panic may poison the lock; the state is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Independent copy of this page's content with fresh counters.
    fn fork(&self, stats: Arc<LaunchStats>) -> Self {
        let mut state = self.state().clone();
        state.lookups.clear();
        state.script_calls = 0;
        state.navigations.clear();
        state.cookies.clear();
        Self {
            state: Arc::new(Mutex::new(state)),
            stats: Some(stats),
        }
    }

    // ── content ──

    pub fn add_node(&self, parent: Option<ElementRef>, spec: NodeSpec) -> ElementRef {
        let mut state = self.state();
        state.nodes.push(Node {
            parent: parent.map(|p| p.0 as usize),
            spec,
            clicks: 0,
        });
        ElementRef((state.nodes.len() - 1) as u64)
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.state().text = text.into();
    }

    /// Navigating to `from` lands on `to`.
    pub fn redirect(&self, from: impl Into<String>, to: impl Into<String>) {
        self.state().redirects.insert(from.into(), to.into());
    }

    pub fn set_script_result(&self, value: serde_json::Value) {
        self.state().script_result = value;
    }

    /// Document height grows on each of the first `scrolls` scrolls, then stays put.
    pub fn grow_for(&self, scrolls: u32) {
        self.state().grows_for = scrolls;
    }

    /// Document height grows on every scroll.
    pub fn grow_forever(&self) {
        self.state().grows_for = u32::MAX;
    }

    // ── failure injection ──

    pub fn delay_navigation(&self, delay: Duration) {
        self.state().navigate_delay = delay;
    }

    pub fn fail_navigation(&self, message: impl Into<String>) {
        self.state().navigate_error = Some(message.into());
    }

    pub fn fail_cookie(&self, message: impl Into<String>) {
        self.state().cookie_error = Some(message.into());
    }

    pub fn fail_lookup(&self, expr: impl Into<String>, message: impl Into<String>) {
        self.state().lookup_errors.insert(expr.into(), message.into());
    }

    /// Panic when `expr` is looked up.
    pub fn panic_on_lookup(&self, expr: impl Into<String>) {
        self.state().panic_on = Some(expr.into());
    }

    /// Panic while the page is being closed.
    pub fn panic_on_close(&self) {
        self.state().panic_on_close = true;
    }

    // ── instrumentation ──

    pub fn lookups_for(&self, expr: &str) -> usize {
        self.state().lookups.get(expr).copied().unwrap_or(0)
    }

    pub fn total_lookups(&self) -> usize {
        self.state().lookups.values().sum()
    }

    /// Every expression looked up so far.
    pub fn looked_up(&self) -> Vec<String> {
        self.state().lookups.keys().cloned().collect()
    }

    pub fn script_calls(&self) -> usize {
        self.state().script_calls
    }

    pub fn scrolls(&self) -> u32 {
        self.state().scrolls
    }

    pub fn clicks(&self, element: ElementRef) -> usize {
        self.state()
            .nodes
            .get(element.0 as usize)
            .map(|n| n.clicks)
            .unwrap_or(0)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    pub fn cookies(&self) -> Vec<AuthCredential> {
        self.state().cookies.clone()
    }
}

#[async_trait]
impl RenderContext for ScriptedPage {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<NavigationResult> {
        let delay = {
            let mut state = self.state();
            state.navigations.push(url.to_string());
            state.navigate_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(message) = &state.navigate_error {
            bail!("navigation to {url} failed: {message}");
        }
        let final_url = state
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        state.url = final_url.clone();
        state.scrolls = 0;
        Ok(NavigationResult {
            final_url,
            load_time_ms: delay.as_millis() as u64,
        })
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state().url.clone())
    }

    async fn page_text(&self) -> Result<String> {
        Ok(self.state().text.clone())
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        let mut state = self.state();
        state.script_calls += 1;
        Ok(state.script_result.clone())
    }

    async fn set_cookie(&self, credential: &AuthCredential) -> Result<()> {
        let mut state = self.state();
        if let Some(message) = &state.cookie_error {
            bail!("failed to set cookie: {message}");
        }
        state.cookies.push(credential.clone());
        Ok(())
    }

    async fn find_all(
        &self,
        scope: Option<ElementRef>,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>> {
        let expr = locator.expression();
        let mut state = self.state();
        *state.lookups.entry(expr.to_string()).or_insert(0) += 1;

        if state.panic_on.as_deref() == Some(expr) {
            drop(state);
            panic!("injected panic while looking up {expr}");
        }
        if let Some(message) = state.lookup_errors.get(expr) {
            bail!("lookup failed for {locator}: {message}");
        }

        let scope = scope.map(|s| s.0 as usize);
        let found = (0..state.nodes.len())
            .filter(|&i| state.nodes[i].spec.matches.iter().any(|m| m == expr))
            .filter(|&i| scope.map_or(true, |s| state.is_within(i, s)))
            .map(|i| ElementRef(i as u64))
            .collect();
        Ok(found)
    }

    async fn read(&self, element: ElementRef, source: &ValueSource) -> Result<Option<String>> {
        let state = self.state();
        let node = state.node(element)?;
        Ok(match source {
            ValueSource::Text => node.spec.text.clone(),
            ValueSource::Attribute(name) => node.spec.attrs.get(name).cloned(),
        })
    }

    async fn scroll_into_view(&self, element: ElementRef) -> Result<bool> {
        let state = self.state();
        let node = state.node(element)?;
        Ok(!node.spec.hidden && !node.spec.disabled)
    }

    async fn click(&self, element: ElementRef) -> Result<()> {
        let mut state = self.state();
        let index = element.0 as usize;
        state.node(element)?;
        state.nodes[index].clicks += 1;
        if let Some(revealed) = state.nodes[index].spec.reveals.take() {
            state.nodes.push(Node {
                parent: None,
                spec: *revealed,
                clicks: 0,
            });
        }
        Ok(())
    }

    async fn scroll_height(&self) -> Result<u64> {
        Ok(self.state().height())
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.state().scrolls += 1;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if let Some(stats) = &self.stats {
            stats.closed.fetch_add(1, Ordering::SeqCst);
            stats.live.fetch_sub(1, Ordering::SeqCst);
        }
        if self.state().panic_on_close {
            panic!("injected panic while closing the page");
        }
        Ok(())
    }
}

/// Hands out forks of a template page.
pub struct ScriptedLauncher {
    template: ScriptedPage,
    stats: Arc<LaunchStats>,
    failures_remaining: AtomicU32,
    panic_on_launch: bool,
    pages: Mutex<Vec<ScriptedPage>>,
}

impl ScriptedLauncher {
    pub fn new(template: ScriptedPage) -> Self {
        Self {
            template,
            stats: Arc::new(LaunchStats::default()),
            failures_remaining: AtomicU32::new(0),
            panic_on_launch: false,
            pages: Mutex::new(Vec::new()),
        }
    }

    /// The next `count` launches fail.
    pub fn fail_launches(self, count: u32) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Every launch panics instead of returning.
    pub fn panic_on_launch(mut self) -> Self {
        self.panic_on_launch = true;
        self
    }

    pub fn stats(&self) -> Arc<LaunchStats> {
        Arc::clone(&self.stats)
    }

    /// Pages handed out so far, in launch order.
    pub fn pages(&self) -> Vec<ScriptedPage> {
        self.pages.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    async fn launch(&self, _settings: &BrowserSettings) -> Result<Box<dyn RenderContext>> {
        let attempt = self.stats.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on_launch {
            panic!("injected panic on launch attempt {attempt}");
        }
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            bail!("scripted launch failure on attempt {attempt}");
        }

        let page = self.template.fork(Arc::clone(&self.stats));
        self.stats.launched.fetch_add(1, Ordering::SeqCst);
        let live = self.stats.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_live.fetch_max(live, Ordering::SeqCst);
        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(page.clone());
        Ok(Box::new(page))
    }
}
