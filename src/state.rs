use crate::calls::CallTable;
use crate::registry::Registry;
use crate::store::DocStore;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// External document store (user accounts, chat history)
    pub store: DocStore,
    /// user id -> live connection mapping
    pub registry: Registry,
    /// call id -> in-flight call record
    pub calls: CallTable,
}

impl AppState {
    pub fn new(store: DocStore) -> Self {
        Self {
            store,
            registry: Registry::new(),
            calls: CallTable::new(),
        }
    }
}
