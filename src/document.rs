//! Document identifiers and key layout
//!
//! Documents, posting lists and pending-ingest markers share one engine
//! keyspace, separated by prefix:
//!
//! ```text
//! doc:<uuid>       → serialized document blob
//! tok:<token>      → posting list "id:id:id"
//! pending:<uuid>   → JSON array of tokens not yet confirmed indexed
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::{IndexError, Result};

pub const DOC_PREFIX: &str = "doc:";
pub const TOKEN_PREFIX: &str = "tok:";
pub const PENDING_PREFIX: &str = "pending:";

/// Separator between identifiers in a posting list
pub const POSTING_DELIMITER: u8 = b':';

/// Tokens of one document, grouped by the field they came from
pub type FieldTokens = BTreeMap<String, Vec<String>>;

/// Identifier of a stored document (random UUID, canonical lowercase form)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Engine key holding the document blob
    pub fn doc_key(&self) -> Vec<u8> {
        format!("{}{}", DOC_PREFIX, self).into_bytes()
    }

    /// Engine key holding the pending-ingest marker
    pub fn pending_key(&self) -> Vec<u8> {
        format!("{}{}", PENDING_PREFIX, self).into_bytes()
    }

    /// Recover the identifier from a `pending:` key
    pub fn from_pending_key(key: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(key)
            .map_err(|_| IndexError::Lookup("pending key is not UTF-8".to_string()))?;
        let id = text.strip_prefix(PENDING_PREFIX).ok_or_else(|| {
            IndexError::Lookup(format!("{:?} is not a pending-ingest key", text))
        })?;
        id.parse()
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

impl FromStr for DocumentId {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| IndexError::Lookup(format!("invalid document id {:?}: {}", s, e)))
    }
}

impl From<Uuid> for DocumentId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Engine key holding the posting list of `token`
pub fn token_key(token: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(TOKEN_PREFIX.len() + token.len());
    key.extend_from_slice(TOKEN_PREFIX.as_bytes());
    key.extend_from_slice(token.as_bytes());
    key
}
