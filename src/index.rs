//! Document Index
//!
//! The context object tying the pieces together. Everything an operation
//! needs (engine handle, admission gate, configuration) lives on the
//! instance, so several independent indexes can coexist in one process.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::adapter::KvStore;
use crate::admission::AdmissionControl;
use crate::config::Config;
use crate::document::{DocumentId, FieldTokens};
use crate::error::Result;
use crate::footprint;
use crate::ingest::Ingestor;
use crate::query::{QueryEngine, QueryOutcome};

/// A document store with an inverted token index
///
/// `DocumentIndex` is `Send + Sync`; share it between threads with `Arc`.
pub struct DocumentIndex {
    config: Config,
    store: Arc<KvStore>,
    ingestor: Ingestor,
    queries: QueryEngine,
}

impl DocumentIndex {
    /// Open (or create) the index described by `config`
    ///
    /// Documents whose ingestion was interrupted are re-indexed before this
    /// returns.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(KvStore::open(&config)?);
        let ingestor = Ingestor::new(Arc::clone(&store), &config);
        let queries = QueryEngine::new(Arc::clone(&store));

        let recovered = ingestor.reindex_pending()?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            max_concurrent_ingests = config.max_concurrent_ingests,
            recovered,
            "Index ready"
        );

        Ok(Self {
            config,
            store,
            ingestor,
            queries,
        })
    }

    /// Open with default settings at `path`
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Store `document` and index it under `tokens`; see [`Ingestor::store`]
    pub fn store<D>(&self, tokens: &FieldTokens, document: &D) -> Result<DocumentId>
    where
        D: Serialize + ?Sized,
    {
        self.ingestor.store(tokens, document)
    }

    /// Resolve a query to its string form; see [`QueryEngine::execute`]
    pub fn retrieve(&self, query: &str) -> Result<String> {
        self.queries.retrieve(query)
    }

    /// Resolve a query to a typed outcome
    pub fn query(&self, query: &str) -> Result<QueryOutcome> {
        self.queries.execute(query)
    }

    /// Bytes used by the data directory
    pub fn dir_size(&self) -> Result<f64> {
        footprint::dir_size(&self.config.data_dir)
    }

    /// Flush everything to disk and release the index
    pub fn close(self) -> Result<()> {
        self.store.close()?;
        tracing::info!(data_dir = %self.config.data_dir.display(), "Index closed");
        Ok(())
    }

    pub fn admission(&self) -> &AdmissionControl {
        self.ingestor.admission()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Storage adapter, for inspection and maintenance
    pub fn store_handle(&self) -> &KvStore {
        &self.store
    }
}
