pub mod cards;
pub mod fields;

use scraper::Html;
use tracing::debug;
use url::Url;

use crate::listing::ListingRecord;
use fields::CardFields;

/// Turns search-result markup into listing records. Never fails: anything
/// unreadable is simply absent from the output.
#[derive(Debug, Clone)]
pub struct Extractor {
    origin: Url,
    origin_tag: String,
}

impl Extractor {
    pub fn new(origin: Url, origin_tag: impl Into<String>) -> Self {
        Self {
            origin,
            origin_tag: origin_tag.into(),
        }
    }

    pub fn extract(&self, html: &str) -> Vec<ListingRecord> {
        let doc = Html::parse_document(html);
        let Some((matcher, cards)) = cards::select_cards(&doc) else {
            debug!("No card matcher hit");
            return Vec::new();
        };

        let total = cards.len();
        let records: Vec<ListingRecord> = cards
            .into_iter()
            .filter_map(|card| CardFields::read(card, &self.origin).into_record(&self.origin_tag))
            .collect();

        debug!(
            "Matcher {} found {} cards, {} usable",
            matcher,
            total,
            records.len()
        );
        records
    }
}

// ── Tests ──
