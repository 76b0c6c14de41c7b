//! Projection plan construction
//!
//! Turns a field's base plan plus its selection subtree into one plan that
//! yields projection records, so a whole root field costs a single dispatch.

use indexmap::IndexMap;
use std::any::Any;

use crate::core::error::EngineError;
use crate::core::schema::{
    Field, FieldId, FieldResolver, PlanScope, ResolutionKind, SchemaGraph, SchemaType, TYPENAME,
};
use crate::execution::selection::ExecutionSelection;
use crate::plan::{CompilationTier, Expr};

pub(crate) struct ProjectionCompiler<'a> {
    graph: &'a SchemaGraph,
    tier: CompilationTier,
    data: Option<&'a (dyn Any + Send + Sync)>,
}

impl<'a> ProjectionCompiler<'a> {
    pub fn new(
        graph: &'a SchemaGraph,
        tier: CompilationTier,
        data: Option<&'a (dyn Any + Send + Sync)>,
    ) -> Self {
        Self { graph, tier, data }
    }

    /// Compose `plan` for `field` with the projection of `children`
    pub fn compose(
        &self,
        field: &Field,
        plan: Expr,
        children: &[ExecutionSelection],
        depth: usize,
    ) -> Result<Expr, EngineError> {
        let target = self.graph.schema_type(field.target_type);
        if target.is_scalar() {
            return Ok(force(field, plan));
        }

        let record = self.record(target, children, depth)?;
        if field.is_list() {
            return Ok(self.list(plan, target, record));
        }
        if plan.is_sequence() {
            return Ok(force(field, plan.project(record)));
        }
        Ok(null_guard(plan, target, record))
    }

    /// Record of the selected slots of `ty`, evaluated against `Expr::Row`
    fn record(
        &self,
        ty: &SchemaType,
        selections: &[ExecutionSelection],
        depth: usize,
    ) -> Result<Expr, EngineError> {
        let mut bindings: IndexMap<String, Expr> = IndexMap::new();
        let mut needs_typename = false;

        let keys = record_keys(self.graph, ty, selections)?;
        for (selection, key) in selections.iter().zip(keys) {
            let field = self.graph.field(selection.field);
            needs_typename |= selection.type_condition.is_some() || field.is_typename();

            let Some(key) = key else {
                continue;
            };
            // Same key under another type condition: first binding wins
            if bindings.contains_key(&key) {
                continue;
            }
            let value = self.binding(ty, field, selection, depth)?;
            bindings.insert(key, value);
        }

        if needs_typename {
            bindings.shift_remove(TYPENAME);
            bindings.shift_insert(0, TYPENAME.to_string(), ty.typename.clone());
        }

        Ok(Expr::Record {
            shape: ty.projection.name().to_string(),
            bindings,
        })
    }

    fn binding(
        &self,
        owner: &SchemaType,
        field: &Field,
        selection: &ExecutionSelection,
        depth: usize,
    ) -> Result<Expr, EngineError> {
        let declaring = self.graph.schema_type(field.declaring_type);
        // Fields of subtypes, or of interfaces only some union members implement
        let partial = !self.graph.is_subtype(owner.id, declaring.id);

        let row = if partial && self.tier.casts() {
            Expr::Cast {
                target: Box::new(Expr::Row),
                type_name: declaring.name.clone(),
                shapes: declaring.shapes.clone(),
            }
        } else {
            Expr::Row
        };

        let value = self.nested(field, selection, row, depth)?;

        if partial && self.tier.casts() && self.tier.guards_nulls() {
            return Ok(Expr::Conditional {
                test: Box::new(Expr::TypeIs {
                    target: Box::new(Expr::Row),
                    shapes: declaring.shapes.clone(),
                }),
                then: Box::new(value),
                otherwise: Box::new(Expr::typed_null(
                    self.graph.schema_type(field.target_type).name.clone(),
                )),
            });
        }
        Ok(value)
    }

    /// Plan of a nested field relative to its parent row
    fn nested(
        &self,
        field: &Field,
        selection: &ExecutionSelection,
        row: Expr,
        depth: usize,
    ) -> Result<Expr, EngineError> {
        let resolver_error = |source| EngineError::Resolver {
            field: field.name.clone(),
            source,
        };

        if field.resolution == ResolutionKind::Unmodified || is_member(field) {
            let scope = PlanScope::new(row, self.data);
            let plan = field
                .build_plan(&scope, &selection.arguments)
                .map_err(resolver_error)?;
            return self.compose(field, plan, &selection.children, depth + 1);
        }

        // Custom plans see the parent row through a binding, since their own
        // filters and projections rebind `Expr::Row`
        let parent = format!("parent{}", depth);
        let scope = PlanScope::new(Expr::var(parent.clone()), self.data);
        let plan = field
            .build_plan(&scope, &selection.arguments)
            .map_err(resolver_error)?;
        let composed = self.compose(field, plan, &selection.children, depth + 1)?;
        Ok(Expr::bind(parent, row, composed))
    }

    fn list(&self, plan: Expr, target: &SchemaType, record: Expr) -> Expr {
        if self.tier.guards_nulls() {
            Expr::NullGuard {
                value: Box::new(plan),
                body: Box::new(Expr::Row.project(record).to_list()),
                type_name: target.name.clone(),
            }
        } else {
            plan.project(record).to_list()
        }
    }
}

/// Record key of each selection, `None` for values resolved outside the plan
///
/// The first selection of a field takes its slot key. Selections of the same
/// field under another response key are keyed `slot#alias`, so each alias is
/// projected from its own arguments and children.
pub(crate) fn record_keys(
    graph: &SchemaGraph,
    ty: &SchemaType,
    selections: &[ExecutionSelection],
) -> Result<Vec<Option<String>>, EngineError> {
    let mut claimed: Vec<(FieldId, &str, String)> = Vec::new();
    let mut keys = Vec::with_capacity(selections.len());

    for selection in selections {
        let field = graph.field(selection.field);
        if field.is_typename() || field.is_post() {
            keys.push(None);
            continue;
        }
        let slot = ty
            .projection
            .slot_for(field.id)
            .ok_or_else(|| EngineError::FieldNotFound {
                type_name: ty.name.clone(),
                field: field.name.clone(),
            })?;

        let output = selection.output_name();
        let key = match claimed.iter().find(|(f, o, _)| *f == field.id && *o == output) {
            Some((_, _, key)) => key.clone(),
            None if claimed.iter().any(|(f, _, _)| *f == field.id) => {
                format!("{}#{}", slot.key, output)
            }
            None => slot.key.clone(),
        };
        claimed.push((field.id, output, key.clone()));
        keys.push(Some(key));
    }
    Ok(keys)
}

fn is_member(field: &Field) -> bool {
    matches!(field.resolver, FieldResolver::Member(_))
}

fn null_guard(value: Expr, target: &SchemaType, record: Expr) -> Expr {
    Expr::NullGuard {
        value: Box::new(value),
        body: Box::new(record),
        type_name: target.name.clone(),
    }
}

/// Materialize a sequence plan per the field's resolution kind
fn force(field: &Field, plan: Expr) -> Expr {
    if !plan.is_sequence() {
        return plan;
    }
    match field.resolution {
        ResolutionKind::ToList => plan.to_list(),
        ResolutionKind::First => plan.first(),
        ResolutionKind::FirstOrDefault => plan.first_or_default(),
        ResolutionKind::Unmodified if field.is_list() => plan.to_list(),
        ResolutionKind::Unmodified => plan.first_or_default(),
    }
}
