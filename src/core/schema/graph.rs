//! The completed, read-only schema

use std::collections::HashMap;

use crate::core::schema::field::{Field, FieldId};
use crate::core::schema::types::{SchemaType, TypeId};
use crate::core::variables::VariableTypes;

/// Arena of completed types and fields
///
/// Built once by [`SchemaBuilder::complete`](super::SchemaBuilder::complete) and
/// shared read-only by every execution afterwards.
#[derive(Debug)]
pub struct SchemaGraph {
    pub(crate) types: Vec<SchemaType>,
    pub(crate) fields: Vec<Field>,
    pub(crate) by_name: HashMap<String, TypeId>,
    pub(crate) query: TypeId,
    pub(crate) mutation: TypeId,
    pub(crate) variables: VariableTypes,
}

impl SchemaGraph {
    pub fn query_type(&self) -> &SchemaType {
        self.schema_type(self.query)
    }

    pub fn mutation_type(&self) -> &SchemaType {
        self.schema_type(self.mutation)
    }

    pub fn schema_type(&self, id: TypeId) -> &SchemaType {
        &self.types[id.0]
    }

    pub fn type_by_name(&self, name: &str) -> Option<&SchemaType> {
        self.by_name.get(name).map(|id| self.schema_type(*id))
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.0]
    }

    /// Field visible on `owner` under `name`, inherited and merged ones included
    pub fn lookup_field(&self, owner: TypeId, name: &str) -> Option<&Field> {
        self.schema_type(owner)
            .fields
            .get(name)
            .map(|id| self.field(*id))
    }

    /// Whether `sub` is `sup` or one of its transitive subtypes
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        sub == sup || self.schema_type(sub).supertypes.contains(&sup)
    }

    pub fn types(&self) -> impl Iterator<Item = &SchemaType> {
        self.types.iter()
    }

    pub fn variables(&self) -> &VariableTypes {
        &self.variables
    }
}
