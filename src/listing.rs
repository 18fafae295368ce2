use std::collections::HashMap;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

const ID_HEX_LEN: usize = 24;

/// One product listing discovered on a search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRecord {
    pub id: String,
    pub title: String,
    pub source_url: String,
    pub image_url: Option<String>,
    pub image_local_path: Option<PathBuf>,
    pub price_text: Option<String>,
    pub moq_text: Option<String>,
    pub supplier_name: Option<String>,
    pub supplier_url: Option<String>,
    pub origin: String,
}

impl ListingRecord {
    pub fn new(title: String, source_url: String, origin: &str) -> Self {
        Self {
            id: stable_id(&source_url),
            title,
            source_url,
            image_url: None,
            image_local_path: None,
            price_text: None,
            moq_text: None,
            supplier_name: None,
            supplier_url: None,
            origin: origin.to_string(),
        }
    }
}

/// First 24 hex chars of SHA-256 over the canonical URL.
pub fn stable_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(ID_HEX_LEN);
    hex
}

/// Collapse records sharing a `source_url`. The later record replaces the
/// earlier one but keeps the earlier one's position.
pub fn dedupe(records: Vec<ListingRecord>) -> Vec<ListingRecord> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ListingRecord> = Vec::with_capacity(records.len());

    for record in records {
        match index.get(&record.source_url) {
            Some(&i) => unique[i] = record,
            None => {
                index.insert(record.source_url.clone(), unique.len());
                unique.push(record);
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(title: &str, url: &str) -> ListingRecord {
        ListingRecord::new(title.to_string(), url.to_string(), "made-in-china")
    }

    #[test]
    fn id_is_pure_function_of_url() {
        let a = rec("A", "https://x.test/p/1.html");
        let b = rec("B", "https://x.test/p/1.html");
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 24);
        assert!(a.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.id, rec("A", "https://x.test/p/2.html").id);
    }

    #[test]
    fn id_matches_sha256_prefix() {
        // sha256("abc") = ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad
        assert_eq!(stable_id("abc"), "ba7816bf8f01cfea414140de");
    }

    #[test]
    fn later_duplicate_wins() {
        let mut newer = rec("New title", "https://x.test/p/1.html");
        newer.price_text = Some("US$ 10".into());
        let records = vec![
            rec("Old title", "https://x.test/p/1.html"),
            rec("Other", "https://x.test/p/2.html"),
            newer.clone(),
        ];
        let out = dedupe(records);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], newer);
        assert_eq!(out[1].title, "Other");
    }

    #[test]
    fn repeated_pages_collapse() {
        let page: Vec<_> = (0..5)
            .map(|i| rec(&format!("T{}", i), &format!("https://x.test/p/{}.html", i)))
            .collect();
        let mut all = page.clone();
        all.extend(page.clone());
        all.extend(page.clone());
        assert_eq!(dedupe(all), page);
    }

    #[test]
    fn empty_input() {
        assert!(dedupe(Vec::new()).is_empty());
    }
}
