//! Projection shapes synthesized at schema completion

use crate::core::schema::field::FieldId;
use crate::core::schema::types::TypeId;

/// Key of the runtime type name slot present on every projection
pub const TYPENAME: &str = "__typename";

/// One named, typed slot of a projection record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Record key; qualified as `Declaring.field` when the plain name is taken
    pub key: String,
    pub field: FieldId,
    pub declaring_type: TypeId,
    pub type_name: String,
    pub list: bool,
}

/// The record shape rows of a type are projected into
///
/// Holds one slot per deduplicated field declared on the type, its ancestors,
/// its interfaces and its included types. Post fields have no slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionShape {
    name: String,
    slots: Vec<Slot>,
}

impl ProjectionShape {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
        }
    }

    /// Add a slot for `field`, qualifying the key on collision
    ///
    /// Returns false when the field already has a slot.
    pub(crate) fn push(
        &mut self,
        name: &str,
        declaring_name: &str,
        field: FieldId,
        declaring_type: TypeId,
        type_name: &str,
        list: bool,
    ) -> bool {
        if self.slot_for(field).is_some() {
            return false;
        }
        let key = if self.get(name).is_some() {
            format!("{}.{}", declaring_name, name)
        } else {
            name.to_string()
        };
        self.slots.push(Slot {
            key,
            field,
            declaring_type,
            type_name: type_name.to_string(),
            list,
        });
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.key == key)
    }

    /// Slot holding the value of `field`
    pub fn slot_for(&self, field: FieldId) -> Option<&Slot> {
        self.slots.iter().find(|s| s.field == field)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colliding_names_are_qualified() {
        let mut shape = ProjectionShape::new("SearchResult");
        assert!(shape.push("name", "User", FieldId(0), TypeId(1), "String", false));
        assert!(shape.push("name", "Product", FieldId(1), TypeId(2), "Int", false));
        assert!(!shape.push("name", "User", FieldId(0), TypeId(1), "String", false));

        assert_eq!(shape.len(), 2);
        assert_eq!(shape.slot_for(FieldId(0)).unwrap().key, "name");
        assert_eq!(shape.slot_for(FieldId(1)).unwrap().key, "Product.name");
        assert_eq!(shape.get("Product.name").unwrap().type_name, "Int");
    }
}
