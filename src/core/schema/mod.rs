//! Schema declaration, completion and the completed type graph

pub mod builder;
pub mod field;
pub mod graph;
pub mod introspection;
pub mod projection;
pub mod types;

use regex::Regex;
use std::sync::{Arc, OnceLock};

use crate::core::error::EngineError;

pub use builder::{MUTATION_TYPE, QUERY_TYPE, SchemaBuilder};
pub use field::{
    Cardinality, Complexity, Field, FieldDef, FieldId, FieldResolver, MutationDef, OutputType,
    PlanBuilder, PlanScope, ResolutionKind,
};
pub use graph::SchemaGraph;
pub use projection::{ProjectionShape, Slot, TYPENAME};
pub use types::{SchemaType, SourceShape, TypeId, TypeKind};

/// Shared handle to a schema that becomes usable once completed
#[derive(Clone, Default)]
pub struct Schema {
    pub(crate) inner: Arc<OnceLock<SchemaGraph>>,
}

impl Schema {
    /// The completed graph, or `NotCompleted`
    pub fn graph(&self) -> Result<&SchemaGraph, EngineError> {
        self.inner.get().ok_or(EngineError::NotCompleted)
    }

    pub fn is_completed(&self) -> bool {
        self.inner.get().is_some()
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Whether `name` follows the GraphQL name grammar
pub fn is_valid_name(name: &str) -> bool {
    static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = NAME_REGEX.get_or_init(|| Regex::new(r"^[_A-Za-z][_0-9A-Za-z]*$").unwrap());
    regex.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_grammar() {
        assert!(is_valid_name("User"));
        assert!(is_valid_name("_private2"));
        assert!(is_valid_name("__typename"));
        assert!(!is_valid_name("2fast"));
        assert!(!is_valid_name("with-dash"));
        assert!(!is_valid_name(""));
    }
}
