//! Query Engine
//!
//! Resolves a free-text query against stored documents and posting lists.
//!
//! A query is lowercased, trimmed and split on whitespace. If any term looks
//! like a document id, the first such term is fetched directly and every
//! other term is ignored. Otherwise all terms are intersected (AND): a
//! document matches only if every term's posting list contains it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::adapter::KvStore;
use crate::document::{token_key, DocumentId, POSTING_DELIMITER};
use crate::error::{IndexError, Result};

fn document_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
            .expect("document id pattern is valid")
    })
}

/// Lowercase, trim and split a query into terms
pub fn normalize(query: &str) -> Vec<String> {
    query
        .trim()
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// What a query resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Direct lookup: the stored blob of one document
    Document { id: DocumentId, blob: Vec<u8> },

    /// Term search: ids present in every term's posting list
    Matches(Vec<DocumentId>),
}

impl QueryOutcome {
    /// Wire form: the raw blob, or matching ids joined with `:`
    pub fn render(&self) -> Result<String> {
        match self {
            QueryOutcome::Document { id, blob } => String::from_utf8(blob.clone()).map_err(|e| {
                IndexError::Serialization(format!("document {} is not UTF-8: {}", id, e))
            }),
            QueryOutcome::Matches(ids) => Ok(ids
                .iter()
                .map(DocumentId::to_string)
                .collect::<Vec<_>>()
                .join(":")),
        }
    }
}

/// Read-only query execution over a shared store
pub struct QueryEngine {
    store: Arc<KvStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<KvStore>) -> Self {
        Self { store }
    }

    /// Resolve `query` and render the result as a string
    pub fn retrieve(&self, query: &str) -> Result<String> {
        self.execute(query)?.render()
    }

    /// Resolve `query`
    ///
    /// An empty query has no terms and matches nothing. A term with no
    /// posting list fails the whole query with `TermNotFound`.
    pub fn execute(&self, query: &str) -> Result<QueryOutcome> {
        let terms = normalize(query);

        if let Some(term) = terms.iter().find(|t| document_id_pattern().is_match(t.as_str())) {
            return self.lookup_document(term);
        }

        self.search(&terms).map(QueryOutcome::Matches)
    }

    fn lookup_document(&self, term: &str) -> Result<QueryOutcome> {
        let id: DocumentId = term.parse()?;
        match self.store.get(&id.doc_key())? {
            Some(blob) => Ok(QueryOutcome::Document { id, blob }),
            None => Err(IndexError::DocumentNotFound(term.to_string())),
        }
    }

    fn search(&self, terms: &[String]) -> Result<Vec<DocumentId>> {
        // Candidate order: first appearance in the first term's list
        let mut order: Vec<String> = Vec::new();
        let mut matches: HashMap<String, usize> = HashMap::new();

        for (position, term) in terms.iter().enumerate() {
            let postings = self
                .store
                .get(&token_key(term))?
                .ok_or_else(|| IndexError::TermNotFound(term.clone()))?;

            // Duplicate postings count once per term
            let mut seen = HashSet::new();
            for raw in postings.split(|b| *b == POSTING_DELIMITER) {
                if raw.is_empty() || !seen.insert(raw) {
                    continue;
                }
                let id = String::from_utf8_lossy(raw).into_owned();
                if position == 0 {
                    order.push(id.clone());
                }
                *matches.entry(id).or_insert(0) += 1;
            }
        }

        order
            .into_iter()
            .filter(|id| matches.get(id) == Some(&terms.len()))
            .map(|id| id.parse())
            .collect()
    }
}
