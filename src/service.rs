//! High-level retrieval service.
//!
//! Ties the config, the collection store, the embedding model and the
//! loaded index together. The embedding model and index are lazy-loaded
//! on first use; thread-safe through interior mutability.

use std::sync::Mutex;

use crate::config::Config;
use crate::document::Document;
use crate::embed::{EmbedError, Embedder, FastembedModel};
use crate::index::{CollectionStore, Hit, IndexError, StoreError, VectorIndex};
use crate::ingest::{IngestReport, Ingestor};
use crate::retrieve::{Retriever, RetrieveError};

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("retrieval error: {0}")]
    Retrieve(#[from] RetrieveError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// How to open the collection on first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    /// Ingest path: create the collection when it does not exist yet.
    GetOrCreate,
    /// Query path: a missing collection is a configuration error, never
    /// silently an empty result.
    MustExist,
}

type EmbedderFactory = Box<dyn Fn() -> Result<Box<dyn Embedder>, EmbedError> + Send + Sync>;

/// Lazily-loaded state.
struct RagState {
    embedder: Box<dyn Embedder>,
    index: VectorIndex,
    store: CollectionStore,
}

pub struct RagService {
    config: Config,
    make_embedder: EmbedderFactory,
    /// Lazily-initialized state. Uses Mutex<Option<_>> instead of OnceLock
    /// because get_or_try_init is unstable.
    state: Mutex<Option<RagState>>,
}

impl RagService {
    /// Create a service backed by the configured fastembed model.
    pub fn new(config: Config) -> Self {
        let model_name = config.embedding_model.clone();
        let cache_dir = config.base_path().to_path_buf();
        Self::with_embedder_factory(config, move || {
            FastembedModel::new(&model_name, cache_dir.clone())
                .map(|m| Box::new(m) as Box<dyn Embedder>)
        })
    }

    /// Create a service with an injected embedder, so tests can substitute
    /// deterministic fakes for the model.
    pub fn with_embedder_factory<F>(config: Config, make_embedder: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Embedder>, EmbedError> + Send + Sync + 'static,
    {
        Self {
            config,
            make_embedder: Box::new(make_embedder),
            state: Mutex::new(None),
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.config.collection
    }

    /// Ingest a batch of documents and persist the collection.
    ///
    /// Creates the collection on first run (get-or-create). The updated
    /// index is saved before the report is returned, so a completed ingest
    /// survives the process.
    pub fn ingest(&self, docs: Vec<Document>, progress: bool) -> Result<IngestReport, RagError> {
        let mut guard = self.lock_state()?;
        let state = self.ensure_initialized(&mut guard, OpenMode::GetOrCreate)?;

        let mut ingestor = Ingestor::new(&mut state.index, state.embedder.as_ref());
        if progress {
            ingestor = ingestor.with_progress();
        }
        let report = ingestor.run(docs)?;

        state
            .store
            .save(&state.index, &state.embedder.model_id_hash())?;

        tracing::info!(collection = %state.store.name(), %report, "ingest run complete");
        Ok(report)
    }

    /// Retrieve documents for a query.
    ///
    /// Fails with a missing-collection error when the collection was never
    /// created or has been deleted.
    pub fn retrieve(&self, query: &str, k: usize, threshold: f32) -> Result<Vec<Hit>, RagError> {
        let mut guard = self.lock_state()?;
        let state = self.ensure_initialized(&mut guard, OpenMode::MustExist)?;

        let retriever = Retriever::new(&state.index, state.embedder.as_ref());
        Ok(retriever.retrieve(query, k, threshold)?)
    }

    /// Number of indexed documents (0 before first use).
    pub fn indexed_count(&self) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.index.len()))
            .unwrap_or(0)
    }

    /// Delete the configured collection and everything in it.
    ///
    /// Works without touching the embedding model.
    pub fn delete_collection(&self) -> Result<(), RagError> {
        let store = CollectionStore::new(self.config.base_path(), &self.config.collection);
        store.delete()?;

        // Drop any loaded state referring to the deleted collection.
        if let Ok(mut guard) = self.state.lock() {
            *guard = None;
        }

        tracing::info!(collection = %self.config.collection, "collection deleted");
        Ok(())
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, Option<RagState>>, RagError> {
        self.state
            .lock()
            .map_err(|e| RagError::Internal(format!("lock poisoned: {e}")))
    }

    fn ensure_initialized<'a>(
        &self,
        guard: &'a mut Option<RagState>,
        mode: OpenMode,
    ) -> Result<&'a mut RagState, RagError> {
        if guard.is_none() {
            *guard = Some(self.do_init(mode)?);
        }
        Ok(guard.as_mut().expect("state initialized above"))
    }

    fn do_init(&self, mode: OpenMode) -> Result<RagState, RagError> {
        tracing::info!(
            model = %self.config.embedding_model,
            collection = %self.config.collection,
            "initializing retrieval service"
        );

        let embedder = (self.make_embedder)()?;
        let store = CollectionStore::new(self.config.base_path(), &self.config.collection);

        if mode == OpenMode::GetOrCreate {
            store.create()?;
        }

        let index = store.load(&embedder.model_id_hash(), embedder.dimensions())?;
        tracing::info!(count = index.len(), "loaded collection");

        Ok(RagState {
            embedder,
            index,
            store,
        })
    }
}
