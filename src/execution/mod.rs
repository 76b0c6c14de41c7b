//! Query execution
//!
//! Binds a parsed document against the completed schema, compiles each root
//! field into one plan, dispatches it and maps the rows back onto the query.

pub mod context;
pub mod core;
mod field_executor;
mod projection;
mod result_mapper;
pub mod selection;

pub use self::context::ExecutionContext;
pub use self::core::{Executor, Request};
pub use self::selection::ExecutionSelection;
