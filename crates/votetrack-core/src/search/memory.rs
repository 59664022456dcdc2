//! In-process search gateway over a fixed snapshot of property documents.

use std::collections::HashSet;
use std::sync::LazyLock;

use indexmap::IndexMap;
use parking_lot::Mutex;
use regex::Regex;

use crate::errors::VoteTrackResult;
use crate::models::PropertyMatch;
use crate::search::gateway::{IndexTarget, SearchGateway, SearchQuery};

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+").unwrap());

fn tokens(value: &str) -> HashSet<String> {
    TOKEN_RE
        .find_iter(value)
        .map(|m| m.as_str().to_uppercase())
        .collect()
}

struct IndexedDoc {
    tokens: HashSet<String>,
    doc: PropertyMatch,
}

impl IndexedDoc {
    fn new(doc: PropertyMatch) -> Self {
        let fields: [&str; 9] = [
            &doc.address_full,
            &doc.house_number,
            &doc.street_direction,
            &doc.street_name,
            &doc.street_suffix,
            &doc.city,
            &doc.state,
            &doc.zip,
            &doc.zip4,
        ];
        let text = fields.join(" ");
        Self {
            tokens: tokens(&text),
            doc,
        }
    }
}

/// Deterministic gateway over in-memory address and unit indexes.
///
/// Fuzzy queries require every query token to appear among a document's
/// address tokens (AND semantics) and collapse hits by `property_id`.
/// Exact queries compare house number, street name, and zip
/// case-insensitively. Every received query is recorded.
#[derive(Default)]
pub struct InMemoryGateway {
    address_docs: Vec<IndexedDoc>,
    unit_docs: Vec<IndexedDoc>,
    received: Mutex<Vec<SearchQuery>>,
}

impl InMemoryGateway {
    pub fn new(address_docs: Vec<PropertyMatch>, unit_docs: Vec<PropertyMatch>) -> Self {
        Self {
            address_docs: address_docs.into_iter().map(IndexedDoc::new).collect(),
            unit_docs: unit_docs.into_iter().map(IndexedDoc::new).collect(),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Queries received so far, in arrival order.
    pub fn received(&self) -> Vec<SearchQuery> {
        self.received.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.received.lock().len()
    }

    fn docs(&self, target: IndexTarget) -> &[IndexedDoc] {
        match target {
            IndexTarget::Address => &self.address_docs,
            IndexTarget::Unit => &self.unit_docs,
        }
    }
}

impl SearchGateway for InMemoryGateway {
    fn search(&self, query: &SearchQuery) -> VoteTrackResult<Vec<PropertyMatch>> {
        self.received.lock().push(query.clone());

        match query {
            SearchQuery::Fuzzy { target, text } => {
                let wanted = tokens(text);
                if wanted.is_empty() {
                    return Ok(vec![]);
                }
                let mut collapsed: IndexMap<&str, &PropertyMatch> = IndexMap::new();
                for entry in self.docs(*target) {
                    if wanted.is_subset(&entry.tokens) {
                        collapsed
                            .entry(entry.doc.property_id.as_str())
                            .or_insert(&entry.doc);
                    }
                }
                Ok(collapsed.into_values().cloned().collect())
            }
            SearchQuery::Exact { target, key } => Ok(self
                .docs(*target)
                .iter()
                .map(|entry| &entry.doc)
                .filter(|doc| {
                    doc.house_number.eq_ignore_ascii_case(&key.house_number)
                        && doc.street_name.eq_ignore_ascii_case(&key.street_name)
                        && doc.zip.eq_ignore_ascii_case(&key.zip)
                })
                .cloned()
                .collect()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
