//! Repeated-item and free-text section extraction.

use crate::renderer::{ElementRef, RenderContext};
use crate::selectors::catalog::{SectionLayout, SectionSelectors};
use crate::types::{SectionBag, SectionItem};

/// Extracts named sections into [`SectionBag`]s.
///
/// Each field of an item is appended to its own sequence only when found, so
/// the three sequences of a bag may differ in length. Consumers must not
/// pair them by index.
pub struct SectionParser<'a> {
    selectors: &'a SectionSelectors,
}

impl<'a> SectionParser<'a> {
    pub fn new(selectors: &'a SectionSelectors) -> Self {
        Self { selectors }
    }

    /// `None` when the section is unknown or its container is not on the page.
    pub async fn extract_section(&self, ctx: &dyn RenderContext, name: &str) -> Option<SectionBag> {
        let Some(def) = self.selectors.section(name) else {
            tracing::warn!("no selectors defined for section {name:?}");
            return None;
        };
        let Some(container) = self.locate_container(ctx, name).await else {
            tracing::debug!("section {name:?} not found");
            return None;
        };

        let mut bag = SectionBag::default();
        match &def.layout {
            SectionLayout::Items {
                title,
                subtitle,
                date_range,
            } => {
                let items = match ctx.find_all(Some(container), &self.selectors.item).await {
                    Ok(items) => items,
                    Err(e) => {
                        tracing::debug!("listing items of {name:?} failed: {e:#}");
                        Vec::new()
                    }
                };
                tracing::debug!(section = name, items = items.len(), "parsing section items");
                for item in items {
                    bag.push(SectionItem {
                        title: title.extract(ctx, Some(item)).await,
                        subtitle: subtitle.extract(ctx, Some(item)).await,
                        date_range: date_range.extract(ctx, Some(item)).await,
                    });
                }
            }
            SectionLayout::FreeText { text, label } => {
                if let Some(body) = text.extract(ctx, Some(container)).await {
                    bag.push(SectionItem {
                        title: Some(body),
                        subtitle: Some(label.clone()),
                        date_range: None,
                    });
                }
            }
        }
        Some(bag)
    }

    async fn locate_container(&self, ctx: &dyn RenderContext, name: &str) -> Option<ElementRef> {
        for locator in self.selectors.containers_for(name) {
            match ctx.find_all(None, &locator).await {
                Ok(found) => {
                    if let Some(first) = found.first() {
                        tracing::debug!("section {name:?} located by {locator}");
                        return Some(*first);
                    }
                }
                Err(e) => tracing::debug!("container lookup {locator} failed: {e:#}"),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::scripted::{NodeSpec, ScriptedPage};
    use crate::selectors::SelectorCatalog;

    const EXPERIENCE: &str = "//section[.//h2[contains(text(), 'Experience')]]";
    const ITEM: &str = ".//li[contains(@class, 'artdeco-list__item')]";
    const TITLE: &str = ".//div[contains(@class, 't-bold')]//span";
    const SUBTITLE: &str =
        ".//div[contains(@class, 't-14') and contains(@class, 't-normal')]//span";
    const DATE: &str = ".//span[contains(@class, 't-black--light')]";

    #[tokio::test]
    async fn test_missing_container_is_none() {
        let catalog = SelectorCatalog::default();
        let page = ScriptedPage::new();
        let parser = SectionParser::new(&catalog.sections);
        assert_eq!(parser.extract_section(&page, "Experience").await, None);
        assert_eq!(page.lookups_for(ITEM), 0);
    }

    #[tokio::test]
    async fn test_unknown_section_is_none() {
        let catalog = SelectorCatalog::default();
        let page = ScriptedPage::new();
        let parser = SectionParser::new(&catalog.sections);
        assert_eq!(parser.extract_section(&page, "Volunteering").await, None);
        assert_eq!(page.total_lookups(), 0);
    }

    #[tokio::test]
    async fn test_items_are_scoped_to_container() {
        let catalog = SelectorCatalog::default();
        let page = ScriptedPage::new();

        // An item outside the section must not be picked up.
        let stray = page.add_node(None, NodeSpec::new(&[ITEM]));
        page.add_node(Some(stray), NodeSpec::new(&[TITLE]).text("Stray"));

        let section = page.add_node(None, NodeSpec::new(&[EXPERIENCE]));
        let item = page.add_node(Some(section), NodeSpec::new(&[ITEM]));
        page.add_node(Some(item), NodeSpec::new(&[TITLE]).text("Engineer"));
        page.add_node(Some(item), NodeSpec::new(&[SUBTITLE]).text("Acme"));
        page.add_node(Some(item), NodeSpec::new(&[DATE]).text("2020 - 2023"));

        let bag = SectionParser::new(&catalog.sections)
            .extract_section(&page, "Experience")
            .await
            .unwrap();
        assert_eq!(bag.titles, vec!["Engineer"]);
        assert_eq!(bag.subtitles, vec!["Acme"]);
        assert_eq!(bag.date_ranges, vec!["2020 - 2023"]);
    }

    #[tokio::test]
    async fn test_empty_section_yields_empty_bag() {
        let catalog = SelectorCatalog::default();
        let page = ScriptedPage::new();
        page.add_node(None, NodeSpec::new(&[EXPERIENCE]));
        let bag = SectionParser::new(&catalog.sections)
            .extract_section(&page, "Experience")
            .await
            .unwrap();
        assert!(bag.is_empty());
    }

    #[tokio::test]
    async fn test_about_is_single_labelled_item() {
        let catalog = SelectorCatalog::default();
        let page = ScriptedPage::new();
        let about = page.add_node(None, NodeSpec::new(&["//div[@id='about']/ancestor::section"]));
        page.add_node(
            Some(about),
            NodeSpec::new(&[".//span[@aria-hidden='true']"]).text("About"),
        );
        let long = "Engineer with ten years of experience building distributed storage systems.";
        page.add_node(
            Some(about),
            NodeSpec::new(&[".//span[contains(@class, 'visually-hidden')]"]).text(long),
        );

        let bag = SectionParser::new(&catalog.sections)
            .extract_section(&page, "About")
            .await
            .unwrap();
        assert_eq!(bag.titles, vec![long]);
        assert_eq!(bag.subtitles, vec!["About"]);
        assert!(bag.date_ranges.is_empty());
    }

    #[tokio::test]
    async fn test_about_too_short_is_empty() {
        let catalog = SelectorCatalog::default();
        let page = ScriptedPage::new();
        let about = page.add_node(None, NodeSpec::new(&["//div[@id='about']/ancestor::section"]));
        page.add_node(
            Some(about),
            NodeSpec::new(&[".//span[@aria-hidden='true']"]).text("Short bio."),
        );
        let bag = SectionParser::new(&catalog.sections)
            .extract_section(&page, "About")
            .await
            .unwrap();
        assert!(bag.is_empty());
    }
}
