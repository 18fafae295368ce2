use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use url::Url;

use crate::listing::ListingRecord;

static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)US\$|USD|\$|\bprice\b").unwrap());
static MOQ_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bMOQ\b|\bMin\.|Minimum\s+Order").unwrap());
static SUPPLIER_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)company|supplier").unwrap());

/// Lazy-loading pages park the real image in a data attribute.
const IMAGE_ATTRS: &[&str] = &["data-src", "data-original", "src"];

/// Whatever could be read from one card. Every field may be missing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CardFields {
    pub title: Option<String>,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
    pub price_text: Option<String>,
    pub moq_text: Option<String>,
    pub supplier_name: Option<String>,
    pub supplier_url: Option<String>,
}

impl CardFields {
    pub fn read(card: ElementRef<'_>, origin: &Url) -> Self {
        let mut fields = CardFields::default();

        if let Some(link) = card.select(&LINK_SEL).next() {
            fields.title = anchor_label(link);
            fields.source_url = link.value().attr("href").and_then(|h| absolutize(h, origin));
        }

        fields.image_url = card.select(&IMG_SEL).next().and_then(|img| {
            IMAGE_ATTRS
                .iter()
                .filter_map(|a| img.value().attr(a))
                .find(|v| !v.trim().is_empty())
                .and_then(|v| absolutize(v, origin))
        });

        fields.price_text = first_text_matching(card, &PRICE_RE);
        fields.moq_text = first_text_matching(card, &MOQ_RE);

        let supplier = card.select(&LINK_SEL).find(|a| {
            a.value()
                .attr("href")
                .is_some_and(|h| SUPPLIER_HREF_RE.is_match(h))
        });
        if let Some(a) = supplier {
            fields.supplier_name = anchor_label(a);
            fields.supplier_url = a.value().attr("href").and_then(|h| absolutize(h, origin));
        }

        fields
    }

    /// `None` when the title or canonical URL is missing.
    pub fn into_record(self, origin_tag: &str) -> Option<ListingRecord> {
        let title = self.title?;
        let source_url = self.source_url?;
        let mut record = ListingRecord::new(title, source_url, origin_tag);
        record.image_url = self.image_url;
        record.price_text = self.price_text;
        record.moq_text = self.moq_text;
        record.supplier_name = self.supplier_name;
        record.supplier_url = self.supplier_url;
        Some(record)
    }
}

/// `title` attribute if present and non-blank, else the anchor's text.
fn anchor_label(a: ElementRef<'_>) -> Option<String> {
    if let Some(t) = a.value().attr("title").map(str::trim).filter(|t| !t.is_empty()) {
        return Some(collapse_ws(t));
    }
    let text = collapse_ws(&a.text().collect::<Vec<_>>().join(" "));
    (!text.is_empty()).then_some(text)
}

fn first_text_matching(card: ElementRef<'_>, re: &Regex) -> Option<String> {
    card.text()
        .map(str::trim)
        .find(|t| !t.is_empty() && re.is_match(t))
        .map(collapse_ws)
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve `//host/...`, `/path` and relative links against the site origin.
/// Only http(s) results count; `javascript:` and `data:` links are dropped.
pub fn absolutize(raw: &str, origin: &Url) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let url = origin.join(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}
