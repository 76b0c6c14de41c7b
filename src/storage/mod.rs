//! Backend store abstraction and the in-memory reference store

pub mod error;
pub mod in_memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::plan::{Capabilities, Expr};

pub use error::StoreError;
pub use in_memory::InMemoryStore;

/// A backing store that executes query plans
///
/// Implementations declare which plan constructs they honor through
/// [`Capabilities`]; the compiler picks its tier from them.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Open a session scoped to one execution
    ///
    /// The session is released when dropped, on every exit path.
    async fn open(&self) -> Result<Box<dyn BackendSession>, StoreError>;
}

/// A per-execution connection to a [`Backend`]
#[async_trait]
pub trait BackendSession: Send {
    /// Execute a complete plan in one round-trip
    async fn dispatch(&mut self, plan: &Expr) -> Result<Value, StoreError>;
}
