//! Ingestion Pipeline
//!
//! Stores a document and extends the posting list of every token it carries.
//!
//! ## Write order
//! 1. One atomic transaction: `doc:<id>` → blob, `pending:<id>` → marker
//! 2. One merge per token into `tok:<token>`
//! 3. Delete `pending:<id>`, then sync
//!
//! The marker lists the tokens and how many of them are already merged. A
//! failed merge records its position there; a crash leaves it at the last
//! recorded position. [`Ingestor::reindex_pending`] resumes from that
//! position on the next open. After a crash the token in flight may be
//! merged twice, which queries tolerate.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::{KvStore, Mutation};
use crate::admission::AdmissionControl;
use crate::config::Config;
use crate::document::{token_key, DocumentId, FieldTokens, PENDING_PREFIX};
use crate::error::{IndexError, Result};

/// Value stored under `pending:<id>` until every token is merged
#[derive(Debug, Serialize, Deserialize)]
struct PendingMarker {
    tokens: Vec<String>,
    /// Tokens at the front of `tokens` already in their posting lists
    #[serde(default)]
    indexed: usize,
}

impl PendingMarker {
    fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| IndexError::Serialization(format!("pending marker: {}", e)))
    }
}

/// Runs ingestions against a shared store, bounded by admission control
pub struct Ingestor {
    store: Arc<KvStore>,
    admission: AdmissionControl,
    merge_timeout: Duration,
}

impl Ingestor {
    pub fn new(store: Arc<KvStore>, config: &Config) -> Self {
        Self {
            store,
            admission: AdmissionControl::new(config.max_concurrent_ingests),
            merge_timeout: config.merge_timeout(),
        }
    }

    /// Persist `document` and index it under `tokens`
    ///
    /// Tokens are merged in field order; a token repeated across fields is
    /// merged once per occurrence. If a merge fails, the remaining tokens
    /// are skipped and `PartialIndex` is returned with the new id: the
    /// document is stored, partially searchable, and keeps its pending
    /// marker so indexing resumes at the failed token on the next open.
    pub fn store<D>(&self, tokens: &FieldTokens, document: &D) -> Result<DocumentId>
    where
        D: Serialize + ?Sized,
    {
        let _permit = self.admission.acquire();
        tracing::debug!(in_flight = self.admission.in_flight(), "Ingesting document");

        let id = DocumentId::new();
        let blob = serde_json::to_vec(document)
            .map_err(|e| IndexError::Serialization(format!("document: {}", e)))?;

        let mut marker = PendingMarker {
            tokens: tokens.values().flatten().cloned().collect(),
            indexed: 0,
        };

        self.store.transact(vec![
            Mutation::put(id.doc_key(), blob),
            Mutation::put(id.pending_key(), marker.encode()?),
        ])?;

        let outcome = self.finish(&id, &mut marker);

        if let Err(e) = self.store.sync() {
            tracing::error!(%id, error = %e, "Flush after ingest failed");
            return Err(e);
        }
        outcome?;

        tracing::debug!(%id, tokens = marker.tokens.len(), "Ingest done");
        Ok(id)
    }

    /// Finish documents whose ingestion was interrupted
    ///
    /// Returns how many documents were re-indexed.
    pub fn reindex_pending(&self) -> Result<usize> {
        let pending = self.store.scan_prefix(PENDING_PREFIX.as_bytes())?;
        if pending.is_empty() {
            return Ok(0);
        }

        for (key, raw) in &pending {
            let id = DocumentId::from_pending_key(key)?;
            let mut marker: PendingMarker = serde_json::from_slice(raw)
                .map_err(|e| IndexError::Serialization(format!("pending marker of {}: {}", id, e)))?;

            tracing::warn!(
                %id,
                tokens = marker.tokens.len(),
                resume_at = marker.indexed,
                "Re-indexing interrupted ingest"
            );

            if let Err(e) = self.finish(&id, &mut marker) {
                self.store.sync()?;
                return Err(e);
            }
        }

        self.store.sync()?;
        Ok(pending.len())
    }

    /// Merge the marker's remaining tokens, then drop the marker
    ///
    /// On a failed merge the marker is rewritten with the position reached.
    fn finish(&self, id: &DocumentId, marker: &mut PendingMarker) -> Result<()> {
        if let Err(e) = self.index_tokens(id, marker) {
            if let Err(save) = marker
                .encode()
                .and_then(|m| self.store.transact(vec![Mutation::put(id.pending_key(), m)]))
            {
                tracing::warn!(%id, error = %save, "Could not record indexing progress");
            }
            return Err(e);
        }

        self.store.transact(vec![Mutation::delete(id.pending_key())])
    }

    /// Advances `marker.indexed` past every token merged
    fn index_tokens(&self, id: &DocumentId, marker: &mut PendingMarker) -> Result<()> {
        let operand = id.to_string();

        while let Some(token) = marker.tokens.get(marker.indexed) {
            let merged =
                self.store
                    .merge_append(&token_key(token), operand.as_bytes(), self.merge_timeout);

            if let Err(e) = merged {
                tracing::error!(%id, token = %token, error = %e, "Posting list update failed");
                return Err(IndexError::PartialIndex {
                    id: operand,
                    indexed: marker.indexed,
                    total: marker.tokens.len(),
                    token: token.clone(),
                    reason: e.to_string(),
                });
            }
            marker.indexed += 1;
        }

        Ok(())
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }
}
