//! Core module containing the schema model, argument translation and errors

pub mod complexity;
pub mod error;
pub mod schema;
pub mod variables;

pub use error::{ArgumentError, DocumentError, EngineError, ErrorResponse, SchemaError};
pub use schema::{
    Cardinality, Complexity, Field, FieldDef, FieldId, MutationDef, PlanScope, ResolutionKind,
    Schema, SchemaBuilder, SchemaGraph, SchemaType, SourceShape, TypeId, TypeKind,
};
pub use variables::{ArgumentShape, Arguments, InputType, ScalarRule, VariableTypes};
