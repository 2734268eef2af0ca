//! Ordered fallback field extraction.
//!
//! A [`SelectorChain`] is plain data: an ordered list of [`SelectorStrategy`]
//! values plus an optional [`ScriptFallback`]. Evaluation stops at the first
//! strategy that yields a non-empty, acceptable value. Later strategies are
//! looser by construction and must never run once an earlier one matched.

pub mod catalog;

pub use catalog::SelectorCatalog;

use serde::{Deserialize, Serialize};

use crate::renderer::{ElementRef, Locator, RenderContext, ValueSource};

/// One ranked rule for locating a field's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorStrategy {
    pub locator: Locator,
    #[serde(default)]
    pub source: ValueSource,
    /// Reject values with this many characters or fewer.
    #[serde(default)]
    pub longer_than: usize,
    /// When non-empty, the value must contain one of these (case-insensitive).
    #[serde(default)]
    pub contains_any: Vec<String>,
}

impl SelectorStrategy {
    pub fn new(locator: Locator) -> Self {
        Self {
            locator,
            source: ValueSource::Text,
            longer_than: 0,
            contains_any: Vec::new(),
        }
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::new(Locator::xpath(expr))
    }

    pub fn css(expr: impl Into<String>) -> Self {
        Self::new(Locator::css(expr))
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.source = ValueSource::Attribute(name.into());
        self
    }

    pub fn longer_than(mut self, chars: usize) -> Self {
        self.longer_than = chars;
        self
    }

    pub fn containing(mut self, needles: &[&str]) -> Self {
        self.contains_any = needles.iter().map(|n| n.to_string()).collect();
        self
    }

    fn accepts(&self, value: &str) -> bool {
        accepts(value, self.longer_than, &self.contains_any)
    }

    /// Value of the first node this strategy locates, if it passes the
    /// filters. Later matches are never consulted.
    ///
    /// Lookup errors count as "no match".
    pub async fn evaluate(
        &self,
        ctx: &dyn RenderContext,
        scope: Option<ElementRef>,
    ) -> Option<String> {
        let node = match ctx.find_all(scope, &self.locator).await {
            Ok(nodes) => *nodes.first()?,
            Err(e) => {
                tracing::debug!("strategy {} failed: {e:#}", self.locator);
                return None;
            }
        };
        match ctx.read(node, &self.source).await {
            Ok(Some(raw)) => {
                let value = raw.trim();
                (!value.is_empty() && self.accepts(value)).then(|| value.to_string())
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("reading {} failed: {e:#}", self.locator);
                None
            }
        }
    }
}

fn accepts(value: &str, longer_than: usize, contains_any: &[String]) -> bool {
    if value.chars().count() <= longer_than {
        return false;
    }
    if contains_any.is_empty() {
        return true;
    }
    let lowered = value.to_lowercase();
    contains_any
        .iter()
        .any(|needle| lowered.contains(&needle.to_lowercase()))
}

/// Secondary pass: one in-page script walking a list of CSS selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFallback {
    pub selectors: Vec<String>,
    #[serde(default)]
    pub source: ValueSource,
    #[serde(default)]
    pub longer_than: usize,
    #[serde(default)]
    pub contains_any: Vec<String>,
    /// Scan every node a selector matches instead of only the first.
    #[serde(default)]
    pub every_match: bool,
}

impl ScriptFallback {
    pub fn new(selectors: &[&str]) -> Self {
        Self {
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            source: ValueSource::Text,
            longer_than: 0,
            contains_any: Vec::new(),
            every_match: false,
        }
    }

    pub fn every_match(mut self) -> Self {
        self.every_match = true;
        self
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.source = ValueSource::Attribute(name.into());
        self
    }

    pub fn longer_than(mut self, chars: usize) -> Self {
        self.longer_than = chars;
        self
    }

    pub fn containing(mut self, needles: &[&str]) -> Self {
        self.contains_any = needles.iter().map(|n| n.to_string()).collect();
        self
    }

    /// The page script; evaluates to the first acceptable value or `null`.
    pub fn script(&self) -> String {
        let attribute = match &self.source {
            ValueSource::Text => serde_json::Value::Null,
            ValueSource::Attribute(name) => serde_json::Value::String(name.clone()),
        };
        let needles: Vec<String> = self.contains_any.iter().map(|n| n.to_lowercase()).collect();
        format!(
            r#"(() => {{
  const selectors = {selectors};
  const attribute = {attribute};
  const longerThan = {longer_than};
  const needles = {needles};
  const everyMatch = {every_match};
  for (const selector of selectors) {{
    let nodes;
    try {{
      nodes = everyMatch
        ? document.querySelectorAll(selector)
        : [document.querySelector(selector)].filter((el) => el !== null);
    }} catch (e) {{ continue; }}
    for (const el of nodes) {{
      const raw = attribute === null
        ? el.textContent
        : (el[attribute] ?? el.getAttribute(attribute));
      if (raw == null) continue;
      const text = String(raw).trim();
      if (!text || text.length <= longerThan) continue;
      if (needles.length && !needles.some((n) => text.toLowerCase().includes(n))) continue;
      return text;
    }}
  }}
  return null;
}})()"#,
            selectors = serde_json::json!(self.selectors),
            attribute = attribute,
            longer_than = self.longer_than,
            needles = serde_json::json!(needles),
            every_match = self.every_match,
        )
    }

    pub async fn evaluate(&self, ctx: &dyn RenderContext) -> Option<String> {
        match ctx.execute_js(&self.script()).await {
            Ok(serde_json::Value::String(raw)) => {
                let value = raw.trim();
                (!value.is_empty() && accepts(value, self.longer_than, &self.contains_any))
                    .then(|| value.to_string())
            }
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("script fallback failed: {e:#}");
                None
            }
        }
    }
}

/// Where a chain's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOrigin {
    /// Index into the primary strategy list.
    Strategy(usize),
    Fallback,
}

/// A value produced by a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainMatch {
    pub value: String,
    pub origin: MatchOrigin,
}

/// Ordered strategies for one field, first non-empty result wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorChain {
    pub field: String,
    pub strategies: Vec<SelectorStrategy>,
    /// Only tried when every primary strategy failed and the chain runs
    /// against the whole document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<ScriptFallback>,
}

impl SelectorChain {
    pub fn new(field: impl Into<String>, strategies: Vec<SelectorStrategy>) -> Self {
        Self {
            field: field.into(),
            strategies,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: ScriptFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Evaluate the chain; `scope` limits lookups to one node's subtree.
    pub async fn extract(
        &self,
        ctx: &dyn RenderContext,
        scope: Option<ElementRef>,
    ) -> Option<String> {
        self.extract_match(ctx, scope).await.map(|m| m.value)
    }

    pub async fn extract_match(
        &self,
        ctx: &dyn RenderContext,
        scope: Option<ElementRef>,
    ) -> Option<ChainMatch> {
        for (rank, strategy) in self.strategies.iter().enumerate() {
            if let Some(value) = strategy.evaluate(ctx, scope).await {
                tracing::debug!(field = %self.field, rank, "matched {}", strategy.locator);
                return Some(ChainMatch {
                    value,
                    origin: MatchOrigin::Strategy(rank),
                });
            }
        }

        if scope.is_some() {
            return None;
        }
        let fallback = self.fallback.as_ref()?;
        let value = fallback.evaluate(ctx).await?;
        tracing::debug!(field = %self.field, "matched by script fallback");
        Some(ChainMatch {
            value,
            origin: MatchOrigin::Fallback,
        })
    }
}
