use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// A tag plus an attribute filter identifying listing cards.
pub struct CardMatcher {
    pub name: &'static str,
    selector: Selector,
    attr: &'static str,
    pattern: Option<Regex>,
}

impl CardMatcher {
    fn new(name: &'static str, tag: &'static str, attr: &'static str, pattern: Option<&str>) -> Self {
        Self {
            name,
            selector: Selector::parse(&format!("{}[{}]", tag, attr)).unwrap(),
            attr,
            pattern: pattern.map(|p| Regex::new(p).unwrap()),
        }
    }

    fn accepts(&self, el: &ElementRef) -> bool {
        match (&self.pattern, el.value().attr(self.attr)) {
            (Some(re), Some(value)) => re.is_match(value),
            (None, Some(_)) => true,
            (_, None) => false,
        }
    }

    pub fn find<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        doc.select(&self.selector).filter(|el| self.accepts(el)).collect()
    }
}

/// Tried in order; reordering changes which cards are picked on ambiguous pages.
pub static CARD_MATCHERS: LazyLock<Vec<CardMatcher>> = LazyLock::new(|| {
    vec![
        CardMatcher::new(
            "div.product-item",
            "div",
            "class",
            Some(r"(?i)product-item|list-item|list-product|pro-item"),
        ),
        CardMatcher::new("li.product", "li", "class", Some(r"(?i)product|pro-item|list")),
        CardMatcher::new("div[data-s-virtual]", "div", "data-s-virtual", None),
    ]
});

/// Cards from the first matcher with any hit. Later matchers are never
/// consulted once one has matched, even if its cards yield no records.
pub fn select_cards(doc: &Html) -> Option<(&'static str, Vec<ElementRef<'_>>)> {
    CARD_MATCHERS.iter().find_map(|m| {
        let cards = m.find(doc);
        (!cards.is_empty()).then_some((m.name, cards))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick(html: &str) -> Option<(&'static str, usize)> {
        let doc = Html::parse_document(html);
        select_cards(&doc).map(|(name, cards)| (name, cards.len()))
    }

    #[test]
    fn matcher_order_is_fixed() {
        let names: Vec<_> = CARD_MATCHERS.iter().map(|m| m.name).collect();
        assert_eq!(names, ["div.product-item", "li.product", "div[data-s-virtual]"]);
    }

    #[test]
    fn div_matcher_wins_over_li() {
        let html = r#"<ul><li class="product-tab">x</li><li class="list">y</li></ul>
            <div class="prod-list-item">a</div>"#;
        assert_eq!(pick(html), Some(("div.product-item", 1)));
    }

    #[test]
    fn class_match_is_case_insensitive() {
        assert_eq!(pick(r#"<div class="Pro-Item">a</div>"#), Some(("div.product-item", 1)));
    }

    #[test]
    fn falls_back_to_li() {
        let html = r#"<div class="header">h</div><ul><li class="Product">a</li><li class="other">b</li></ul>"#;
        assert_eq!(pick(html), Some(("li.product", 1)));
    }

    #[test]
    fn falls_back_to_virtual_attr() {
        let html = r#"<div data-s-virtual="1">a</div><div data-s-virtual>b</div><div>c</div>"#;
        assert_eq!(pick(html), Some(("div[data-s-virtual]", 2)));
    }

    #[test]
    fn nothing_matches() {
        assert_eq!(pick("<html><body><p>empty</p></body></html>"), None);
        assert_eq!(pick(""), None);
    }
}
