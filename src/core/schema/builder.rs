//! Schema declaration and completion

use anyhow::Result as AnyResult;
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::core::error::SchemaError;
use crate::core::schema::field::{
    Cardinality, Field, FieldDef, FieldId, FieldResolver, MutationDef, OutputType, ResolutionKind,
};
use crate::core::schema::graph::SchemaGraph;
use crate::core::schema::projection::{ProjectionShape, TYPENAME};
use crate::core::schema::types::{SchemaType, SourceShape, TypeId, TypeKind};
use crate::core::schema::{Schema, introspection, is_valid_name};
use crate::core::variables::{Arguments, ScalarRule, VariableTypes};
use crate::plan::Expr;

pub const QUERY_TYPE: &str = "Query";
pub const MUTATION_TYPE: &str = "Mutation";

struct PendingType {
    shape: SourceShape,
    description: Option<String>,
    fields: Vec<FieldId>,
    interfaces: Vec<TypeId>,
    members: Vec<TypeId>,
}

impl PendingType {
    fn name(&self) -> &str {
        self.shape.type_name()
    }
}

struct PendingField {
    owner: TypeId,
    def: FieldDef,
    output: OutputType,
    resolver: FieldResolver,
}

/// Collects type and field declarations until [`complete`](Self::complete)
///
/// # Example
///
/// ```rust,ignore
/// let mut builder = SchemaBuilder::new();
/// let user = builder.declare_type(SourceShape::new("User"))?;
/// builder.add_field(user, FieldDef::new("id", "Int!"))?;
/// builder.add_field(user, FieldDef::new("name", "String"))?;
/// builder.add_field(
///     builder.query_type(),
///     FieldDef::new("users", "[User]").plan(|_, _| Ok(Expr::collection("users"))),
/// )?;
/// let schema = builder.complete()?;
/// ```
pub struct SchemaBuilder {
    types: Vec<PendingType>,
    by_shape: HashMap<String, TypeId>,
    by_name: HashMap<String, TypeId>,
    fields: Vec<PendingField>,
    variables: VariableTypes,
    query: TypeId,
    mutation: TypeId,
    schema: Schema,
    completed: bool,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Builder with the built-in scalars and the query and mutation roots
    pub fn new() -> Self {
        let mut builder = Self {
            types: Vec::new(),
            by_shape: HashMap::new(),
            by_name: HashMap::new(),
            fields: Vec::new(),
            variables: VariableTypes::new(),
            query: TypeId(0),
            mutation: TypeId(0),
            schema: Schema::default(),
            completed: false,
        };
        for scalar in VariableTypes::BUILT_IN {
            builder.push_type(SourceShape::leaf(scalar, TypeKind::Scalar));
        }
        builder.query = builder.push_type(SourceShape::new(QUERY_TYPE));
        builder.mutation = builder.push_type(SourceShape::new(MUTATION_TYPE));
        builder
    }

    /// Handle to the schema this builder completes
    ///
    /// Executors may be created from it before completion; they fail with
    /// `NotCompleted` until [`complete`](Self::complete) succeeds.
    pub fn schema(&self) -> Schema {
        self.schema.clone()
    }

    pub fn query_type(&self) -> TypeId {
        self.query
    }

    pub fn mutation_type(&self) -> TypeId {
        self.mutation
    }

    /// Look up a declared type by schema name
    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Register a source shape as a schema type
    pub fn declare_type(&mut self, shape: SourceShape) -> Result<TypeId, SchemaError> {
        self.ensure_open()?;
        if shape.type_name().starts_with("__") {
            return Err(SchemaError::InvalidName {
                name: shape.type_name().to_string(),
            });
        }
        self.declare(shape)
    }

    pub fn describe_type(
        &mut self,
        id: TypeId,
        description: impl Into<String>,
    ) -> Result<(), SchemaError> {
        self.ensure_open()?;
        self.pending_type(id)?.description = Some(description.into());
        Ok(())
    }

    pub fn add_field(&mut self, owner: TypeId, def: FieldDef) -> Result<FieldId, SchemaError> {
        self.ensure_open()?;
        if def.name.starts_with("__") {
            return Err(SchemaError::InvalidName { name: def.name });
        }
        self.insert_field(owner, def)
    }

    /// Register a post field, resolved in-process and never sent to a backend
    pub fn add_computed_field<F>(
        &mut self,
        owner: TypeId,
        mut def: FieldDef,
        compute: F,
    ) -> Result<FieldId, SchemaError>
    where
        F: Fn(&Arguments) -> AnyResult<Value> + Send + Sync + 'static,
    {
        def.resolver = Some(FieldResolver::Computed(Arc::new(compute)));
        def.resolution = Some(ResolutionKind::Unmodified);
        self.add_field(owner, def)
    }

    /// Register a field on the mutation root
    pub fn add_mutation(&mut self, mutation: MutationDef) -> Result<FieldId, SchemaError> {
        let mutation_type = self.mutation;
        self.add_field(mutation_type, mutation.into_field())
    }

    /// Declare that `implementer` conforms to `interface`
    pub fn add_interface(&mut self, interface: TypeId, implementer: TypeId) -> Result<(), SchemaError> {
        self.ensure_open()?;
        let iface = self.pending_type(interface)?;
        if !matches!(iface.shape.kind, TypeKind::Interface | TypeKind::Object) {
            return Err(SchemaError::InvalidRelation {
                message: format!("'{}' cannot be implemented", iface.name()),
            });
        }
        let iface_name = iface.name().to_string();
        let target = self.pending_type(implementer)?;
        if target.shape.kind.is_leaf() || interface == implementer {
            return Err(SchemaError::InvalidRelation {
                message: format!("'{}' cannot implement '{}'", target.name(), iface_name),
            });
        }
        if !target.interfaces.contains(&interface) {
            target.interfaces.push(interface);
        }
        Ok(())
    }

    pub fn add_union_member(&mut self, union: TypeId, member: TypeId) -> Result<(), SchemaError> {
        self.ensure_open()?;
        let member_kind = self.pending_type(member)?.shape.kind;
        let member_name = self.pending_type(member)?.name().to_string();
        let target = self.pending_type(union)?;
        if target.shape.kind != TypeKind::Union || member_kind != TypeKind::Object {
            return Err(SchemaError::InvalidRelation {
                message: format!("'{}' cannot be a member of '{}'", member_name, target.name()),
            });
        }
        if !target.members.contains(&member) {
            target.members.push(member);
        }
        Ok(())
    }

    /// Declare a custom scalar with its input rule
    pub fn add_scalar(&mut self, name: &str, rule: ScalarRule) -> Result<TypeId, SchemaError> {
        let id = self.declare_type(SourceShape::leaf(name, TypeKind::Scalar))?;
        self.variables.register(name, rule)?;
        Ok(id)
    }

    pub fn add_enum<I, S>(&mut self, name: &str, values: I) -> Result<TypeId, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = self.declare_type(SourceShape::leaf(name, TypeKind::Enum))?;
        self.variables
            .register(name, ScalarRule::enumeration(values))?;
        Ok(id)
    }

    /// Resolve, validate and freeze every declaration
    ///
    /// Completion is final: any error aborts it, and every later call fails
    /// with `AlreadyCompleted`.
    pub fn complete(&mut self) -> Result<Schema, SchemaError> {
        self.ensure_open()?;
        self.completed = true;

        let snapshot = Arc::new(OnceLock::new());
        introspection::register(self, snapshot.clone())?;

        let graph = self.build()?;
        let _ = snapshot.set(introspection::snapshot(&graph));

        tracing::info!(
            types = graph.types.len(),
            fields = graph.fields.len(),
            "Schema completed"
        );

        self.schema
            .inner
            .set(graph)
            .map_err(|_| SchemaError::AlreadyCompleted)?;
        Ok(self.schema.clone())
    }

    // -------------------------------------------------------------------------
    // Internal declaration helpers, also used for the introspection types
    // -------------------------------------------------------------------------

    pub(super) fn declare(&mut self, shape: SourceShape) -> Result<TypeId, SchemaError> {
        for name in [shape.name.as_str(), shape.type_name()] {
            if !is_valid_name(name) {
                return Err(SchemaError::InvalidName {
                    name: name.to_string(),
                });
            }
        }
        if self.by_shape.contains_key(&shape.name) || self.by_name.contains_key(shape.type_name()) {
            return Err(SchemaError::DuplicateType {
                name: shape.type_name().to_string(),
            });
        }
        Ok(self.push_type(shape))
    }

    pub(super) fn insert_field(
        &mut self,
        owner: TypeId,
        mut def: FieldDef,
    ) -> Result<FieldId, SchemaError> {
        if !is_valid_name(&def.name) {
            return Err(SchemaError::InvalidName { name: def.name });
        }
        let owner_type = self.types.get(owner.0).ok_or_else(|| SchemaError::InvalidRelation {
            message: format!("type #{} is not declared", owner.0),
        })?;
        if owner_type.shape.kind.is_leaf() {
            return Err(SchemaError::InvalidRelation {
                message: format!("'{}' is a leaf type and cannot have fields", owner_type.name()),
            });
        }
        if owner_type
            .fields
            .iter()
            .any(|id| self.fields[id.0].def.name == def.name)
        {
            return Err(SchemaError::DuplicateField {
                type_name: owner_type.name().to_string(),
                field: def.name,
            });
        }

        def.arguments = def.arguments.resolve()?;
        let output = OutputType::parse(&def.target)?;
        let resolver = def
            .resolver
            .take()
            .unwrap_or_else(|| FieldResolver::Member(def.name.clone()));

        let id = FieldId(self.fields.len());
        self.fields.push(PendingField {
            owner,
            def,
            output,
            resolver,
        });
        self.types[owner.0].fields.push(id);
        Ok(id)
    }

    fn push_type(&mut self, shape: SourceShape) -> TypeId {
        let id = TypeId(self.types.len());
        self.by_shape.insert(shape.name.clone(), id);
        self.by_name.insert(shape.type_name().to_string(), id);
        self.types.push(PendingType {
            shape,
            description: None,
            fields: Vec::new(),
            interfaces: Vec::new(),
            members: Vec::new(),
        });
        id
    }

    fn pending_type(&mut self, id: TypeId) -> Result<&mut PendingType, SchemaError> {
        self.types
            .get_mut(id.0)
            .ok_or_else(|| SchemaError::InvalidRelation {
                message: format!("type #{} is not declared", id.0),
            })
    }

    fn ensure_open(&self) -> Result<(), SchemaError> {
        if self.completed {
            Err(SchemaError::AlreadyCompleted)
        } else {
            Ok(())
        }
    }

    fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_shape
            .get(name)
            .or_else(|| self.by_name.get(name))
            .copied()
    }

    // -------------------------------------------------------------------------
    // Completion
    // -------------------------------------------------------------------------

    fn build(&mut self) -> Result<SchemaGraph, SchemaError> {
        // Every composite type resolves its own runtime name
        let composite: Vec<TypeId> = (0..self.types.len())
            .map(TypeId)
            .filter(|id| !self.types[id.0].shape.kind.is_leaf())
            .collect();
        for id in &composite {
            let mut def = FieldDef::new(TYPENAME, "String!");
            def.resolver = Some(FieldResolver::Typename);
            def.resolution = Some(ResolutionKind::Unmodified);
            self.insert_field(*id, def)?;
        }

        let targets = self.resolve_targets()?;
        let (ancestors, interfaces, parents) = self.resolve_relations()?;
        let supertypes = self.supertype_closure(&parents)?;

        let count = self.types.len();
        let mut included = vec![Vec::new(); count];
        for (child, direct) in parents.iter().enumerate() {
            for parent in direct {
                included[parent.0].push(TypeId(child));
            }
        }
        let descendants: Vec<Vec<TypeId>> = (0..count)
            .map(|t| {
                (0..count)
                    .filter(|d| supertypes[*d].contains(&TypeId(t)))
                    .map(TypeId)
                    .collect()
            })
            .collect();

        let fields: Vec<Field> = self
            .fields
            .iter()
            .enumerate()
            .map(|(index, pending)| {
                let cardinality = pending.output.cardinality;
                let resolution = pending.def.resolution.unwrap_or(match cardinality {
                    Cardinality::List => ResolutionKind::ToList,
                    Cardinality::Single => ResolutionKind::FirstOrDefault,
                });
                Field {
                    id: FieldId(index),
                    name: pending.def.name.clone(),
                    declaring_type: pending.owner,
                    target_type: targets[index],
                    cardinality,
                    arguments: pending.def.arguments.clone(),
                    resolution,
                    resolver: pending.resolver.clone(),
                    complexity: pending.def.complexity,
                    store: pending.def.store.clone(),
                    description: pending.def.description.clone(),
                }
            })
            .collect();

        let shapes_of = |t: usize| -> Vec<String> {
            std::iter::once(t)
                .chain(descendants[t].iter().map(|d| d.0))
                .map(|i| self.types[i].shape.name.clone())
                .collect()
        };

        let mut types = Vec::with_capacity(count);
        for t in 0..count {
            let pending = &self.types[t];
            let name = pending.name().to_string();

            // Concrete subtypes, most derived first, so the first matching test wins
            let mut concrete: Vec<TypeId> = descendants[t]
                .iter()
                .copied()
                .filter(|d| self.types[d.0].shape.kind == TypeKind::Object)
                .collect();
            concrete.sort_by(|a, b| supertypes[b.0].len().cmp(&supertypes[a.0].len()));

            let mut typename = Expr::Const(json!(name));
            for d in concrete.iter().rev() {
                typename = Expr::Conditional {
                    test: Box::new(Expr::TypeIs {
                        target: Box::new(Expr::Row),
                        shapes: shapes_of(d.0),
                    }),
                    then: Box::new(Expr::Const(json!(self.types[d.0].name()))),
                    otherwise: Box::new(typename),
                };
            }

            let (lookup, projection) = if pending.shape.kind.is_leaf() {
                (IndexMap::new(), ProjectionShape::new(name.clone()))
            } else {
                self.merge_fields(
                    TypeId(t),
                    &fields,
                    &ancestors,
                    &supertypes,
                    &descendants[t],
                )?
            };

            types.push(SchemaType {
                id: TypeId(t),
                name,
                shape: pending.shape.clone(),
                kind: pending.shape.kind,
                description: pending.description.clone(),
                own_fields: pending.fields.clone(),
                fields: lookup,
                included: included[t].clone(),
                ancestor: ancestors[t],
                interfaces: interfaces[t].clone(),
                supertypes: supertypes[t].clone(),
                descendants: concrete,
                shapes: shapes_of(t),
                projection,
                typename,
            });
        }

        let mut variables = std::mem::take(&mut self.variables);
        variables.freeze();

        Ok(SchemaGraph {
            by_name: self.by_name.clone(),
            types,
            fields,
            query: self.query,
            mutation: self.mutation,
            variables,
        })
    }

    fn resolve_targets(&self) -> Result<Vec<TypeId>, SchemaError> {
        let mut targets = Vec::with_capacity(self.fields.len());
        for pending in &self.fields {
            let owner = self.types[pending.owner.0].name();
            let target = self.by_name.get(&pending.output.name).copied().ok_or_else(|| {
                SchemaError::UnknownType {
                    name: pending.output.name.clone(),
                    referenced_by: format!("{}.{}", owner, pending.def.name),
                }
            })?;
            for argument in pending.def.arguments.iter() {
                let input = argument.ty.named();
                if !self.variables.contains(input) {
                    return Err(SchemaError::UnknownType {
                        name: input.to_string(),
                        referenced_by: format!("{}.{}({})", owner, pending.def.name, argument.name),
                    });
                }
            }
            targets.push(target);
        }
        Ok(targets)
    }

    /// Ancestor, interfaces and all direct supertypes of every type
    #[allow(clippy::type_complexity)]
    fn resolve_relations(
        &self,
    ) -> Result<(Vec<Option<TypeId>>, Vec<Vec<TypeId>>, Vec<Vec<TypeId>>), SchemaError> {
        let count = self.types.len();
        let mut ancestors = vec![None; count];
        let mut interfaces = vec![Vec::new(); count];
        let mut parents: Vec<Vec<TypeId>> = vec![Vec::new(); count];

        for (t, pending) in self.types.iter().enumerate() {
            let unknown = |name: &str| SchemaError::UnknownType {
                name: name.to_string(),
                referenced_by: pending.name().to_string(),
            };

            if let Some(parent) = &pending.shape.parent {
                let id = self.lookup(parent).ok_or_else(|| unknown(parent))?;
                if self.types[id.0].shape.kind.is_leaf() {
                    return Err(SchemaError::InvalidRelation {
                        message: format!("'{}' cannot extend leaf type '{}'", pending.name(), parent),
                    });
                }
                ancestors[t] = Some(id);
                parents[t].push(id);
            }

            let mut declared = pending.interfaces.clone();
            for name in &pending.shape.interfaces {
                let id = self.lookup(name).ok_or_else(|| unknown(name))?;
                if !matches!(self.types[id.0].shape.kind, TypeKind::Interface | TypeKind::Object) {
                    return Err(SchemaError::InvalidRelation {
                        message: format!("'{}' cannot implement '{}'", pending.name(), name),
                    });
                }
                if !declared.contains(&id) {
                    declared.push(id);
                }
            }
            for id in &declared {
                if !parents[t].contains(id) {
                    parents[t].push(*id);
                }
            }
            interfaces[t] = declared;

            for member in &pending.members {
                if !parents[member.0].contains(&TypeId(t)) {
                    parents[member.0].push(TypeId(t));
                }
            }
        }

        Ok((ancestors, interfaces, parents))
    }

    fn supertype_closure(&self, parents: &[Vec<TypeId>]) -> Result<Vec<Vec<TypeId>>, SchemaError> {
        let mut closure = Vec::with_capacity(parents.len());
        for (t, direct) in parents.iter().enumerate() {
            let mut seen: Vec<TypeId> = Vec::new();
            let mut stack = direct.clone();
            while let Some(parent) = stack.pop() {
                if parent.0 == t {
                    return Err(SchemaError::CyclicHierarchy {
                        type_name: self.types[t].name().to_string(),
                    });
                }
                if seen.contains(&parent) {
                    continue;
                }
                seen.push(parent);
                stack.extend(parents[parent.0].iter().copied());
            }
            closure.push(seen);
        }
        Ok(closure)
    }

    /// Merge own, inherited and included-type fields of `owner`
    fn merge_fields(
        &self,
        owner: TypeId,
        fields: &[Field],
        ancestors: &[Option<TypeId>],
        supertypes: &[Vec<TypeId>],
        descendants: &[TypeId],
    ) -> Result<(IndexMap<String, FieldId>, ProjectionShape), SchemaError> {
        let owner_name = self.types[owner.0].name();

        let mut chain = Vec::new();
        let mut next = ancestors[owner.0];
        while let Some(ancestor) = next {
            if chain.contains(&ancestor) {
                break;
            }
            chain.push(ancestor);
            next = ancestors[ancestor.0];
        }
        let mut sources: Vec<TypeId> = std::iter::once(owner)
            .chain(chain.iter().copied())
            .chain(supertypes[owner.0].iter().copied())
            .chain(descendants.iter().copied())
            .collect();

        // Interfaces of included types, so fragments on them can be carried
        let widened: Vec<TypeId> = descendants
            .iter()
            .flat_map(|d| supertypes[d.0].iter().copied())
            .collect();
        sources.extend(widened);

        let mut seen = Vec::with_capacity(sources.len());
        sources.retain(|s| {
            let keep = !seen.contains(s)
                && (*s == owner || self.types[s.0].shape.kind != TypeKind::Union);
            seen.push(*s);
            keep
        });

        let describe = |field: &Field| {
            let target = self.types[field.target_type.0].name();
            match field.cardinality {
                Cardinality::List => format!("[{}]", target),
                Cardinality::Single => target.to_string(),
            }
        };
        let compatible = |a: &Field, b: &Field| {
            a.cardinality == b.cardinality
                && (a.target_type == b.target_type
                    || supertypes[a.target_type.0].contains(&b.target_type)
                    || supertypes[b.target_type.0].contains(&a.target_type))
        };

        let mut lookup: IndexMap<String, FieldId> = IndexMap::new();
        let mut projection = ProjectionShape::new(owner_name);

        for source in sources {
            for id in &self.types[source.0].fields {
                let field = &fields[id.0];
                if field.is_typename() && source != owner {
                    continue;
                }
                match lookup.get(&field.name) {
                    None => {
                        lookup.insert(field.name.clone(), *id);
                    }
                    Some(existing) if existing == id => continue,
                    Some(existing) => {
                        let existing = &fields[existing.0];
                        if !compatible(existing, field) {
                            return Err(SchemaError::FieldTypeConflict {
                                type_name: owner_name.to_string(),
                                field: field.name.clone(),
                                existing: describe(existing),
                                conflicting: describe(field),
                            });
                        }
                    }
                }
                if !field.is_post() {
                    projection.push(
                        &field.name,
                        self.types[field.declaring_type.0].name(),
                        *id,
                        field.declaring_type,
                        self.types[field.target_type.0].name(),
                        field.is_list(),
                    );
                }
            }
        }

        // The typename slot goes first
        let mut ordered = ProjectionShape::new(owner_name);
        let slots = projection.slots();
        for slot in slots.iter().filter(|s| s.key == TYPENAME).chain(
            slots.iter().filter(|s| s.key != TYPENAME),
        ) {
            let field = &fields[slot.field.0];
            ordered.push(
                &field.name,
                self.types[slot.declaring_type.0].name(),
                slot.field,
                slot.declaring_type,
                &slot.type_name,
                slot.list,
            );
        }

        Ok((lookup, ordered))
    }
}
