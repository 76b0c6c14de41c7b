//! # linqgraph
//!
//! A schema-driven GraphQL execution engine that compiles each root selection
//! into a single composable query plan and dispatches it to a backend store.
//!
//! ## Features
//!
//! - **Schema Builder**: Declare object, interface and union types from source shapes, then `complete()` once
//! - **Type Merging**: Interface and subtype fields are merged into one projection per type
//! - **Argument Translation**: Literals and variables are coerced by registered scalar rules
//! - **One Plan Per Root Field**: Nested selections become projections inside the parent plan
//! - **Capability Tiers**: Plans adapt to what each backend can execute (casts, null guards)
//! - **Post Fields**: Computed in-process after the backend returns
//! - **Introspection**: `__schema`, `__type` and `__typename` out of the box
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use linqgraph::prelude::*;
//!
//! let mut builder = SchemaBuilder::new();
//! let user = builder.declare_type(SourceShape::new("User"))?;
//! builder.add_field(user, FieldDef::new("id", "Int!"))?;
//! builder.add_field(user, FieldDef::new("name", "String"))?;
//!
//! let query = builder.query_type();
//! builder.add_field(
//!     query,
//!     FieldDef::new("user", "User")
//!         .argument("id", "Int!")
//!         .plan(|scope, args| {
//!             Ok(scope
//!                 .context()
//!                 .member("users")
//!                 .filter(Expr::row().member("id").equals(Expr::constant(args.value("id")))))
//!         })
//!         .first_or_default(),
//! )?;
//! let schema = builder.complete()?;
//!
//! let executor = Executor::new(schema).with_store("default", InMemoryStore::new());
//! let data = executor
//!     .execute_str("{ user(id: 1) { id name } }", &Request::new())
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod execution;
pub mod logging;
pub mod plan;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Schema ===
    pub use crate::core::{
        ArgumentShape, Arguments, Cardinality, Complexity, FieldDef, MutationDef, PlanScope,
        ResolutionKind, ScalarRule, Schema, SchemaBuilder, SourceShape, TypeId, TypeKind,
    };

    // === Errors ===
    pub use crate::core::{ArgumentError, DocumentError, EngineError, SchemaError};

    // === Plans ===
    pub use crate::plan::{Capabilities, CompilationTier, Evaluator, Expr};

    // === Execution ===
    pub use crate::execution::{Executor, Request};

    // === Storage ===
    pub use crate::storage::{Backend, BackendSession, InMemoryStore, StoreError};

    // === Config ===
    pub use crate::config::{ComplexityConfig, EngineConfig};
    pub use crate::logging::init_tracing;

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
}
