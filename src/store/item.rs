use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::listing::ListingRecord;
use crate::settings::Settings;

static PRICE_DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+[\d,.]*").unwrap());

/// Attribute value kinds the writer emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValue {
    S(String),
    N(i64),
    L(Vec<String>),
}

impl From<&str> for ItemValue {
    fn from(s: &str) -> Self {
        ItemValue::S(s.to_string())
    }
}

impl From<String> for ItemValue {
    fn from(s: String) -> Self {
        ItemValue::S(s)
    }
}

/// One persisted product row, attribute name to value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreItem {
    pub attrs: BTreeMap<String, ItemValue>,
}

impl StoreItem {
    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&ItemValue> {
        self.attrs.get(name)
    }

    pub fn pk(&self) -> Option<&str> {
        match self.attrs.get("pk") {
            Some(ItemValue::S(pk)) => Some(pk),
            _ => None,
        }
    }

    fn put(&mut self, name: &str, value: impl Into<ItemValue>) {
        self.attrs.insert(name.to_string(), value.into());
    }
}

/// Map a listing into the catalogue schema the storefront reads.
///
/// Category, description, specifications and features stay empty; they are
/// curated by hand later. `extra` is applied last and overrides anything.
pub fn build_item(
    record: &ListingRecord,
    extra: &BTreeMap<String, String>,
    settings: &Settings,
    updated_at: i64,
) -> StoreItem {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    let image = opt(&record.image_url);
    let local_path = record
        .image_local_path
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut item = StoreItem::default();
    item.put("pk", format!("{}{}", settings.key_prefix, record.id));
    item.put("sk", settings.sort_key.as_str());
    item.put("id", record.id.as_str());
    item.put("name", record.title.as_str());
    item.put("price", ItemValue::N(parse_price(record.price_text.as_deref())));
    item.put(
        "images",
        ItemValue::L(if image.is_empty() { Vec::new() } else { vec![image.clone()] }),
    );
    item.put("image", image);
    item.put("description", "");
    item.put("specifications", ItemValue::L(Vec::new()));
    item.put("features", ItemValue::L(Vec::new()));
    item.put("category", "");
    item.put("productUrl", record.source_url.as_str());
    item.put("imageLocalPath", local_path);
    item.put("priceText", opt(&record.price_text));
    item.put("moqText", opt(&record.moq_text));
    item.put("supplierName", opt(&record.supplier_name));
    item.put("supplierUrl", opt(&record.supplier_url));
    item.put("source", record.origin.as_str());
    item.put("updatedAt", ItemValue::N(updated_at));

    for (k, v) in extra {
        item.put(k, v.as_str());
    }
    item
}

/// Best-effort integer price: first digit run, grouping commas dropped,
/// fraction discarded. Anything unparseable is 0.
pub fn parse_price(price_text: Option<&str>) -> i64 {
    price_text
        .and_then(|t| PRICE_DIGITS_RE.find(t))
        .and_then(|m| {
            let cleaned = m.as_str().replace(',', "");
            cleaned.split('.').next()?.parse::<i64>().ok()
        })
        .unwrap_or(0)
}
