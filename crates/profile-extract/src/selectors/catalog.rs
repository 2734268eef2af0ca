//! Built-in page contract and its JSON form.
//!
//! Every site-specific literal the engine relies on lives here. Markup on the
//! target site changes often; a replacement catalog can be loaded from a JSON
//! file without touching any control logic.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{ScriptFallback, SelectorChain, SelectorStrategy};
use crate::error::ConfigError;
use crate::guard::GuardRules;
use crate::renderer::Locator;

/// Field chains for a person profile page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonSelectors {
    pub name: SelectorChain,
    pub avatar: SelectorChain,
    pub headline: SelectorChain,
}

/// Field chains for an organization page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSelectors {
    pub name: SelectorChain,
    pub industry: SelectorChain,
    pub about: SelectorChain,
    /// Clicked once, if present, before `about` is read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about_expander: Option<Locator>,
}

/// How the content of one section is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum SectionLayout {
    /// Repeated items, each read with three scoped chains.
    Items {
        title: SelectorChain,
        subtitle: SelectorChain,
        date_range: SelectorChain,
    },
    /// One block of text stored as a single pseudo-item labelled `label`.
    FreeText { text: SelectorChain, label: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDef {
    pub name: String,
    #[serde(flatten)]
    pub layout: SectionLayout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSelectors {
    /// Container locators, tried in order. `{name}` is replaced by the
    /// section name and `{id}` by its lowercase form.
    pub containers: Vec<Locator>,
    /// Item locator, scoped to the container.
    pub item: Locator,
    pub sections: Vec<SectionDef>,
}

impl SectionSelectors {
    pub fn containers_for(&self, name: &str) -> Vec<Locator> {
        let id = name.to_lowercase();
        let fill = |expr: &str| expr.replace("{name}", name).replace("{id}", &id);
        self.containers
            .iter()
            .map(|locator| match locator {
                Locator::XPath(expr) => Locator::XPath(fill(expr)),
                Locator::Css(expr) => Locator::Css(fill(expr)),
            })
            .collect()
    }

    pub fn section(&self, name: &str) -> Option<&SectionDef> {
        self.sections.iter().find(|s| s.name == name)
    }
}

/// The complete page contract for one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorCatalog {
    /// Host used to build target URLs and the authentication origin.
    pub site: String,
    pub person: PersonSelectors,
    pub organization: OrganizationSelectors,
    pub sections: SectionSelectors,
    pub guard: GuardRules,
    /// "Show more"-style controls clicked before extraction.
    pub expander: Locator,
}

impl SelectorCatalog {
    pub fn from_json_file(path: PathBuf) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::CatalogRead {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::CatalogParse { path, source })
    }

    /// Origin visited before the session cookie is set.
    pub fn site_root(&self) -> String {
        format!("https://{}", self.site)
    }
}

fn xpaths(exprs: &[&str]) -> Vec<SelectorStrategy> {
    exprs.iter().map(|e| SelectorStrategy::xpath(*e)).collect()
}

const LONG_TEXT: usize = 50;

fn person() -> PersonSelectors {
    let name = SelectorChain::new(
        "name",
        xpaths(&[
            "//h1[contains(@class, 't-24') and contains(@class, 'break-words')]",
            "//a[contains(@aria-label, ' ') and contains(@class, 'ember-view')]/h1",
            "//h1[contains(@class, 'inline') and contains(@class, 't-24') and contains(@class, 'break-words')]",
            "//h1[contains(@class, 't-24')]",
            "//h1[contains(@class, 'break-words')]",
        ]),
    )
    .with_fallback(ScriptFallback::new(&[
        "h1.t-24.break-words",
        "h1[class*=\"t-24\"][class*=\"break-words\"]",
        "a[aria-label*=\" \"] h1",
        "h1.inline.t-24.v-align-middle.break-words",
    ]));

    let avatar = SelectorChain::new(
        "avatar_url",
        [
            "//img[contains(@class, 'pv-top-card-profile-picture__image')]",
            "//img[contains(@class, 'profile-picture')]",
            "//img[contains(@class, 'EntityPhoto')]",
            "//img[contains(@class, 'evi-image')]",
            "//img[contains(@alt, 'profile')]",
            "//img[contains(@class, 'ember-view')]",
        ]
        .iter()
        .map(|e| SelectorStrategy::xpath(*e).attribute("src").containing(&["profile"]))
        .collect(),
    )
    .with_fallback(
        ScriptFallback::new(&[
            "img.pv-top-card-profile-picture__image",
            "img[class*=\"profile-picture\"]",
            "img[class*=\"EntityPhoto\"]",
            "img[class*=\"evi-image\"]",
            "img[alt*=\"profile\"]",
        ])
        .attribute("src")
        .containing(&["profile"]),
    );

    let headline = SelectorChain::new(
        "headline",
        xpaths(&[
            "//div[contains(@class, 'text-body-medium') and contains(@class, 'break-words')]",
            "//div[contains(@class, 'text-body-medium')]",
            "//div[contains(text(), '🎓') or contains(text(), '💼') or contains(text(), '🏢')]",
            "//div[contains(text(), '@')]",
            "//div[contains(text(), 'Computer Science') or contains(text(), 'Software') or contains(text(), 'Engineer')]",
            "//div[contains(@class, 'break-words') and string-length(text()) > 10]",
        ]),
    )
    .with_fallback(
        ScriptFallback::new(&[
            "div.text-body-medium.break-words",
            "div[class*=\"text-body-medium\"]",
            "div[class*=\"break-words\"]",
        ])
        .longer_than(10)
        .containing(&["🎓", "💼", "🏢", "@", "Computer Science", "Software", "Engineer"])
        .every_match(),
    );

    PersonSelectors {
        name,
        avatar,
        headline,
    }
}

fn organization() -> OrganizationSelectors {
    OrganizationSelectors {
        name: SelectorChain::new(
            "name",
            xpaths(&[
                "//h1[contains(@class, 'company-name')]",
                "//h1[contains(@class, 'org-top-card-summary__title')]",
                "//h1[contains(@class, 'pv-text-details__left-panel')]//h1",
                "//div[contains(@class, 'company-name')]//h1",
            ]),
        ),
        industry: SelectorChain::new(
            "industry",
            xpaths(&[
                "//div[contains(@class, 'company-industry')]",
                "//div[contains(@class, 'org-top-card-summary-info-list__info-item')]",
                "//div[contains(@class, 'pv-text-details__left-panel')]//div[contains(@class, 'text-body-small')]",
            ]),
        ),
        about: SelectorChain::new(
            "about",
            xpaths(&[
                "//div[contains(@class, 'company-about')]",
                "//div[contains(@class, 'org-about-us-organization-description__text')]",
                "//div[contains(@class, 'pv-shared-text-with-see-more')]//span",
                "//section[contains(@class, 'about')]//div[contains(@class, 'text-body-medium')]",
            ]),
        ),
        about_expander: Some(Locator::xpath(
            "//button[contains(text(), 'Show more')] | //button[contains(text(), 'See more')] | //span[contains(text(), 'Show more')]/parent::button",
        )),
    }
}

fn sections() -> SectionSelectors {
    let role_title = || {
        xpaths(&[
            ".//div[contains(@class, 't-bold')]//span",
            ".//span[contains(@class, 't-bold')]",
            ".//div[contains(@class, 'mr1')]//span",
        ])
    };

    let experience = SectionLayout::Items {
        title: SelectorChain::new("experience.title", role_title()),
        subtitle: SelectorChain::new(
            "experience.subtitle",
            xpaths(&[
                ".//div[contains(@class, 't-14') and contains(@class, 't-normal')]//span",
                ".//span[contains(@class, 't-14') and contains(@class, 't-normal')]",
                ".//a[contains(@class, 'optional-action-target-wrapper')]//span",
            ]),
        ),
        date_range: SelectorChain::new(
            "experience.date_range",
            xpaths(&[
                ".//span[contains(@class, 't-black--light')]",
                ".//span[contains(@class, 't-14') and contains(@class, 't-normal') and contains(@class, 't-black--light')]",
                ".//span[contains(@class, 'pvs-entity__caption-wrapper')]",
            ]),
        ),
    };

    // Degree first, school second, matching how the record stores them.
    let education = SectionLayout::Items {
        title: SelectorChain::new(
            "education.title",
            xpaths(&[
                ".//span[contains(@class, 't-14') and contains(@class, 't-normal')]",
                ".//div[contains(@class, 't-14') and contains(@class, 't-normal')]//span",
            ]),
        ),
        subtitle: SelectorChain::new("education.subtitle", role_title()),
        date_range: SelectorChain::new(
            "education.date_range",
            xpaths(&[
                ".//span[contains(@class, 't-black--light')]",
                ".//span[contains(@class, 'pvs-entity__caption-wrapper')]",
                ".//span[contains(@class, 't-14') and contains(@class, 't-normal') and contains(@class, 't-black--light')]",
            ]),
        ),
    };

    let about = SectionLayout::FreeText {
        text: SelectorChain::new(
            "about",
            [
                ".//span[@aria-hidden='true']",
                ".//span[contains(@class, 'visually-hidden')]",
                ".//div[contains(@class, 'display-flex') and contains(@class, 'full-width')]//span",
                ".//div[contains(@class, 't-14') and contains(@class, 't-normal') and contains(@class, 't-black')]//span",
                ".//span[contains(@class, 't-14') and contains(@class, 't-normal')]",
            ]
            .iter()
            .map(|e| SelectorStrategy::xpath(*e).longer_than(LONG_TEXT))
            .collect(),
        ),
        label: "About".to_string(),
    };

    SectionSelectors {
        containers: vec![
            Locator::xpath("//div[@id='{id}']/ancestor::section"),
            Locator::xpath("//section[.//h2[contains(text(), '{name}')]]"),
            Locator::xpath("//section[.//span[contains(text(), '{name}')]]"),
        ],
        item: Locator::xpath(".//li[contains(@class, 'artdeco-list__item')]"),
        sections: vec![
            SectionDef {
                name: "Experience".to_string(),
                layout: experience,
            },
            SectionDef {
                name: "Education".to_string(),
                layout: education,
            },
            SectionDef {
                name: "About".to_string(),
                layout: about,
            },
        ],
    }
}

impl Default for SelectorCatalog {
    fn default() -> Self {
        Self {
            site: "www.linkedin.com".to_string(),
            person: person(),
            organization: organization(),
            sections: sections(),
            guard: GuardRules::default(),
            expander: Locator::xpath(
                "//button[contains(., 'Show more') or contains(., '...see more') or contains(., 'See more')]",
            ),
        }
    }
}
