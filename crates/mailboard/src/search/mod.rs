//! Search with keyword fallback and a one-time index sync
//!
//! Semantic search runs first. When it finds nothing the keyword search is
//! tried (if allowed). When both come back empty the server index may simply
//! be behind, so the first such search of a session triggers one index sync
//! and one retry. Later empty searches are taken at face value until
//! `clear_search` resets the flag.

use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::api::MailApi;
use crate::cache::{MailboxError, SharedCache};
use crate::models::{MessagePreview, folders};

pub struct SearchCoordinator {
    api: MailApi,
    cache: Arc<SharedCache>,
    /// Set once an index sync has been tried for the current search session
    sync_attempted: AtomicBool,
}

impl SearchCoordinator {
    pub fn new(api: MailApi, cache: Arc<SharedCache>) -> Self {
        api.session().attach_cache(cache.clone());
        Self {
            api,
            cache,
            sync_attempted: AtomicBool::new(false),
        }
    }

    /// Run a search and store the results under `search_results`
    pub fn search(
        &self,
        query: &str,
        allow_fallback: bool,
    ) -> Result<Vec<MessagePreview>, MailboxError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MailboxError::EmptyQuery);
        }

        let mut results = self.lookup(query, allow_fallback)?;

        if results.is_empty() && !self.sync_attempted.swap(true, Ordering::SeqCst) {
            info!("No results for {:?}, syncing search index", query);
            match self.api.sync_search_index() {
                Ok(()) => results = self.lookup(query, allow_fallback)?,
                Err(e) => warn!("Search index sync failed: {}", e),
            }
        }

        debug!("Search {:?} found {} messages", query, results.len());
        self.cache
            .update(|c| c.set_search_results(query, results.clone()));
        Ok(results)
    }

    fn lookup(&self, query: &str, allow_fallback: bool) -> Result<Vec<MessagePreview>, MailboxError> {
        let primary = match self.api.search_semantic(query) {
            Ok(results) => results,
            Err(e) if allow_fallback => {
                warn!("Semantic search failed, falling back to keyword search: {}", e);
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        if !primary.is_empty() || !allow_fallback {
            return Ok(primary);
        }
        Ok(self.api.search(query)?)
    }

    /// Drop the stored results and allow another index sync
    pub fn clear_search(&self) {
        self.cache.update(|c| c.clear_search());
        self.sync_attempted.store(false, Ordering::SeqCst);
    }

    /// Results of the last search
    pub fn results(&self) -> Vec<MessagePreview> {
        self.cache.read(|c| c.folder(folders::SEARCH_RESULTS).to_vec())
    }

    /// Query of the last search
    pub fn query(&self) -> Option<String> {
        self.cache.read(|c| c.search_query().map(str::to_string))
    }

    pub fn sync_attempted(&self) -> bool {
        self.sync_attempted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ApiError, ApiRequest, ApiResponse, MockTransport};
    use crate::session::SessionManager;
    use crate::storage::{InMemoryLocalStore, LocalStore};
    use serde_json::json;

    fn coordinator(
        handler: impl Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    ) -> (SearchCoordinator, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new(handler));
        let store: Arc<dyn LocalStore> = Arc::new(InMemoryLocalStore::new());
        let session = Arc::new(SessionManager::new(transport.clone(), store.clone()));
        let cache = Arc::new(SharedCache::restore(store));
        (SearchCoordinator::new(MailApi::new(session), cache), transport)
    }

    fn hits(ids: &[&str]) -> Result<ApiResponse, ApiError> {
        let items: Vec<_> = ids.iter().map(|id| json!({ "id": id, "subject": id })).collect();
        Ok(ApiResponse::json(200, &json!({ "data": items })))
    }

    #[test]
    fn test_empty_query_is_rejected() {
        let (search, transport) = coordinator(|_| hits(&[]));
        assert!(matches!(search.search("   ", true), Err(MailboxError::EmptyQuery)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_semantic_results_skip_keyword_search() {
        let (search, transport) = coordinator(|_| hits(&["a"]));
        let results = search.search("invoice", true).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(transport.count("/search/semantic"), 1);
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(search.query().as_deref(), Some("invoice"));
    }

    #[test]
    fn test_keyword_fallback() {
        let (search, _) = coordinator(|req| {
            if req.targets("/search/semantic") {
                return Err(ApiError::Transport("model offline".into()));
            }
            hits(&["k1", "k2"])
        });
        assert_eq!(search.search("invoice", true).unwrap().len(), 2);
        assert!(search.search("invoice", false).is_err());
    }

    #[test]
    fn test_clear_search_resets_sync_flag() {
        let (search, transport) = coordinator(|_| hits(&[]));
        search.search("invoice", true).unwrap();
        assert!(search.sync_attempted());

        search.clear_search();
        assert!(!search.sync_attempted());
        assert!(search.results().is_empty());
        assert!(search.query().is_none());

        search.search("invoice", true).unwrap();
        assert_eq!(transport.count("/search/sync"), 2);
    }
}
