//! Schema types and source shapes

use crate::core::schema::field::FieldId;
use crate::core::schema::projection::ProjectionShape;
use crate::plan::Expr;
use indexmap::IndexMap;

/// Arena index of a schema type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) usize);

impl TypeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Kind of a schema type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Object,
    Interface,
    Union,
    Scalar,
    Enum,
}

impl TypeKind {
    pub fn is_leaf(self) -> bool {
        matches!(self, TypeKind::Scalar | TypeKind::Enum)
    }

    pub fn is_abstract(self) -> bool {
        matches!(self, TypeKind::Interface | TypeKind::Union)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TypeKind::Object => "OBJECT",
            TypeKind::Interface => "INTERFACE",
            TypeKind::Union => "UNION",
            TypeKind::Scalar => "SCALAR",
            TypeKind::Enum => "ENUM",
        }
    }
}

/// Identity of the backing data shape a schema type exposes
///
/// Stored documents tag themselves with their shape name (see
/// [`SHAPE_KEY`](crate::plan::SHAPE_KEY)). A shape may extend a parent shape and
/// conform to interfaces; completion turns these into the type hierarchy.
///
/// # Example
///
/// ```rust,ignore
/// let animal = builder.declare_type(SourceShape::interface("Animal"))?;
/// let dog = builder.declare_type(SourceShape::new("Dog").extends("Animal"))?;
/// let named = builder.declare_type(SourceShape::new("Robot").implements("Named"))?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceShape {
    pub name: String,
    pub exposed_as: Option<String>,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    pub kind: TypeKind,
}

impl SourceShape {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exposed_as: None,
            parent: None,
            interfaces: Vec::new(),
            kind: TypeKind::Object,
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Interface,
            ..Self::new(name)
        }
    }

    pub fn union(name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Union,
            ..Self::new(name)
        }
    }

    pub(crate) fn leaf(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            kind,
            ..Self::new(name)
        }
    }

    /// Expose the shape under a different schema type name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.exposed_as = Some(name.into());
        self
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Schema type name for this shape
    pub fn type_name(&self) -> &str {
        self.exposed_as.as_deref().unwrap_or(&self.name)
    }
}

/// A completed schema type
#[derive(Debug, Clone)]
pub struct SchemaType {
    pub id: TypeId,
    pub name: String,
    pub shape: SourceShape,
    pub kind: TypeKind,
    pub description: Option<String>,

    /// Fields declared directly on this type
    pub own_fields: Vec<FieldId>,

    /// Name lookup over own, inherited and included-type fields
    pub fields: IndexMap<String, FieldId>,

    /// Interface implementers, subclasses and union members
    pub included: Vec<TypeId>,

    /// Nearest ancestor along the source-shape hierarchy
    pub ancestor: Option<TypeId>,

    pub interfaces: Vec<TypeId>,

    /// Every type this one is a transitive subtype of
    pub supertypes: Vec<TypeId>,

    /// Every transitive subtype, leaves first
    pub descendants: Vec<TypeId>,

    /// Shapes a runtime value may carry to count as this type
    pub shapes: Vec<String>,

    pub projection: ProjectionShape,

    /// Runtime type name resolver, evaluated against `Expr::Row`
    pub typename: Expr,
}

impl SchemaType {
    pub fn is_scalar(&self) -> bool {
        self.kind.is_leaf()
    }

    pub fn has_subtypes(&self) -> bool {
        !self.descendants.is_empty()
    }
}
