//! In-memory implementation of Backend for testing and development

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::plan::{Capabilities, CollectionSource, Evaluator, Expr};
use crate::storage::{Backend, BackendSession, StoreError};

const NAME: &str = "in-memory store";

#[derive(Default)]
struct Stats {
    dispatches: AtomicUsize,
    open_sessions: AtomicUsize,
}

/// In-memory document store
///
/// Useful for testing and development. Collections hold JSON documents; a
/// document's runtime shape is read from its `__shape` member and documents are
/// identified by their `id` member. Uses RwLock for thread-safe access.
#[derive(Clone)]
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<Value>>>>,
    plans: Arc<RwLock<Vec<Expr>>>,
    stats: Arc<Stats>,
    capabilities: Capabilities,
    context: Value,
    record_plans: bool,
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            plans: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(Stats::default()),
            capabilities: Capabilities::ENUMERABLE,
            context: Value::Null,
            record_plans: false,
        }
    }

    /// Seed a collection, replacing any existing content
    ///
    /// A poisoned lock is recovered and cleared: the map holds plain documents
    /// and seeding overwrites the collection wholesale.
    pub fn with_collection(self, name: impl Into<String>, documents: Vec<Value>) -> Self {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), documents);
        self.collections.clear_poison();
        self
    }

    /// Keep a copy of every dispatched plan, see [`dispatched_plans`](Self::dispatched_plans)
    pub fn with_plan_log(mut self) -> Self {
        self.record_plans = true;
        self
    }

    /// Report different capabilities, e.g. to emulate a strictly typed backend
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Value `Expr::Context` resolves to in dispatched plans
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub async fn insert(&self, collection: &str, document: Value) -> Result<Value, StoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;

        collections
            .entry(collection.to_string())
            .or_default()
            .push(document.clone());

        Ok(document)
    }

    pub async fn find(&self, collection: &str, id: &Value) -> Result<Option<Value>, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;

        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| doc.get("id") == Some(id)))
            .cloned())
    }

    /// Merge the members of `patch` into the document with the given id
    pub async fn update(
        &self,
        collection: &str,
        id: &Value,
        patch: Value,
    ) -> Result<Option<Value>, StoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;

        let Some(document) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.get("id") == Some(id)))
        else {
            return Ok(None);
        };

        if let (Value::Object(target), Value::Object(changes)) = (&mut *document, patch) {
            target.extend(changes);
        }
        Ok(Some(document.clone()))
    }

    pub async fn remove(&self, collection: &str, id: &Value) -> Result<Option<Value>, StoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;

        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        Ok(docs
            .iter()
            .position(|doc| doc.get("id") == Some(id))
            .map(|index| docs.remove(index)))
    }

    /// Number of plans dispatched so far
    pub fn dispatch_count(&self) -> usize {
        self.stats.dispatches.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet released
    pub fn open_sessions(&self) -> usize {
        self.stats.open_sessions.load(Ordering::SeqCst)
    }

    /// Every dispatched plan, oldest first; empty unless built with
    /// [`with_plan_log`](Self::with_plan_log)
    pub fn dispatched_plans(&self) -> Vec<Expr> {
        self.plans
            .read()
            .map(|plans| plans.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionSource for InMemoryStore {
    fn collection(&self, name: &str) -> Result<Vec<Value>, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;

        collections
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
    }
}

#[async_trait]
impl Backend for InMemoryStore {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn open(&self) -> Result<Box<dyn BackendSession>, StoreError> {
        self.stats.open_sessions.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(backend = NAME, "Session opened");
        Ok(Box::new(InMemorySession {
            store: self.clone(),
        }))
    }
}

struct InMemorySession {
    store: InMemoryStore,
}

#[async_trait]
impl BackendSession for InMemorySession {
    async fn dispatch(&mut self, plan: &Expr) -> Result<Value, StoreError> {
        self.store.stats.dispatches.fetch_add(1, Ordering::SeqCst);
        if self.store.record_plans {
            self.store
                .plans
                .write()
                .map_err(|_| StoreError::LockPoisoned("write"))?
                .push(plan.clone());
        }

        if !self.store.capabilities.supports_cast && plan.any(&|e| matches!(e, Expr::Cast { .. })) {
            return Err(StoreError::Unsupported {
                backend: NAME.to_string(),
                node: "cast".to_string(),
            });
        }

        Evaluator::with_source(&self.store, NAME)
            .with_context(self.store.context.clone())
            .run(plan)
    }
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        self.store.stats.open_sessions.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(backend = NAME, "Session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> InMemoryStore {
        InMemoryStore::new().with_collection(
            "users",
            vec![
                json!({"__shape": "User", "id": 1, "name": "Joe"}),
                json!({"__shape": "User", "id": 2, "name": "Ann"}),
            ],
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryStore::new();
        store
            .insert("users", json!({"id": 7, "name": "Eve"}))
            .await
            .unwrap();

        let found = store.find("users", &json!(7)).await.unwrap();
        assert_eq!(found, Some(json!({"id": 7, "name": "Eve"})));
        assert!(store.find("users", &json!(8)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_merges_members() {
        let store = store();
        let updated = store
            .update("users", &json!(1), json!({"name": "Joseph"}))
            .await
            .unwrap();

        assert_eq!(
            updated,
            Some(json!({"__shape": "User", "id": 1, "name": "Joseph"}))
        );
        assert!(store
            .update("users", &json!(99), json!({"name": "x"}))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = store();
        let removed = store.remove("users", &json!(2)).await.unwrap();
        assert_eq!(removed.unwrap()["name"], "Ann");
        assert_eq!(store.collection("users").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_records_plan_and_counts() {
        let store = store().with_plan_log();
        let plan = Expr::collection("users")
            .filter(Expr::row().member("id").equals(Expr::constant(2)))
            .project(Expr::row().member("name"))
            .first_or_default();

        {
            let mut session = store.open().await.unwrap();
            assert_eq!(store.open_sessions(), 1);
            assert_eq!(session.dispatch(&plan).await.unwrap(), json!("Ann"));
        }

        assert_eq!(store.open_sessions(), 0);
        assert_eq!(store.dispatch_count(), 1);
        assert_eq!(store.dispatched_plans(), vec![plan]);
    }

    #[tokio::test]
    async fn test_plans_are_not_kept_by_default() {
        let store = store();
        let mut session = store.open().await.unwrap();
        session
            .dispatch(&Expr::collection("users").to_list())
            .await
            .unwrap();

        assert_eq!(store.dispatch_count(), 1);
        assert!(store.dispatched_plans().is_empty());
    }

    #[test]
    fn test_seeding_recovers_poisoned_lock() {
        let store = store();
        let shared = store.clone();
        let poisoned = std::thread::spawn(move || {
            let _guard = shared.collections.write().unwrap();
            panic!("writer panicked while holding the lock");
        })
        .join();
        assert!(poisoned.is_err());
        assert!(store.collections.is_poisoned());

        let store = store.with_collection("orders", vec![json!({"id": 10})]);
        assert_eq!(store.collection("orders").unwrap(), vec![json!({"id": 10})]);
        assert_eq!(store.collection("users").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let store = store();
        let mut session = store.open().await.unwrap();
        let err = session
            .dispatch(&Expr::collection("orders").to_list())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::UnknownCollection("orders".to_string()));
    }

    #[tokio::test]
    async fn test_strict_store_rejects_casts() {
        let store = store().with_capabilities(Capabilities::STRICT_TYPED);
        let mut session = store.open().await.unwrap();
        let plan = Expr::Cast {
            target: Box::new(Expr::collection("users")),
            type_name: "User".to_string(),
            shapes: vec!["User".to_string()],
        };

        assert!(matches!(
            session.dispatch(&plan).await,
            Err(StoreError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_context_value() {
        let store = store().with_context(json!({"tenant": "acme"}));
        let mut session = store.open().await.unwrap();
        let value = session
            .dispatch(&Expr::context().member("tenant"))
            .await
            .unwrap();
        assert_eq!(value, json!("acme"));
    }
}
