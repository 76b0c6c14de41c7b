//! Per-execution backend sessions

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::plan::{Capabilities, Expr};
use crate::storage::{Backend, BackendSession, StoreError};

/// Sessions opened by one execution
///
/// Sessions are opened lazily, one per store, and released when the context is
/// dropped, including when execution fails part-way.
pub struct ExecutionContext<'a> {
    stores: &'a HashMap<String, Arc<dyn Backend>>,
    sessions: HashMap<String, Box<dyn BackendSession>>,
    dispatches: usize,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(stores: &'a HashMap<String, Arc<dyn Backend>>) -> Self {
        Self {
            stores,
            sessions: HashMap::new(),
            dispatches: 0,
        }
    }

    fn store(&self, name: &str) -> Result<&'a Arc<dyn Backend>, StoreError> {
        self.stores
            .get(name)
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    pub fn capabilities(&self, store: &str) -> Result<Capabilities, StoreError> {
        Ok(self.store(store)?.capabilities())
    }

    /// Dispatch a finished plan to the named store
    pub async fn dispatch(&mut self, store: &str, plan: &Expr) -> Result<Value, StoreError> {
        if !self.sessions.contains_key(store) {
            let backend = self.store(store)?;
            let session = backend.open().await?;
            tracing::debug!(store, backend = backend.name(), "Opened backend session");
            self.sessions.insert(store.to_string(), session);
        }
        let session = self
            .sessions
            .get_mut(store)
            .ok_or_else(|| StoreError::UnknownStore(store.to_string()))?;

        self.dispatches += 1;
        session.dispatch(plan).await
    }

    /// Plans dispatched so far
    pub fn dispatches(&self) -> usize {
        self.dispatches
    }
}

impl Drop for ExecutionContext<'_> {
    fn drop(&mut self) {
        if !self.sessions.is_empty() {
            tracing::debug!(
                sessions = self.sessions.len(),
                dispatches = self.dispatches,
                "Releasing backend sessions"
            );
        }
    }
}
