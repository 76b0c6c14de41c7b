//! Rendering projected rows into the response shape

use serde_json::{Map, Value, json};
use std::any::Any;

use crate::core::error::EngineError;
use crate::core::schema::{Field, SchemaGraph, SchemaType, TYPENAME, TypeId};
use crate::execution::projection::{ProjectionCompiler, record_keys};
use crate::execution::selection::ExecutionSelection;
use crate::plan::{CompilationTier, Evaluator, Expr};

/// Maps projection records onto the selections of a query
///
/// Post fields are resolved here, in-process, once per occurrence per row.
pub(crate) struct ResultMapper<'a> {
    graph: &'a SchemaGraph,
    data: Option<&'a (dyn Any + Send + Sync)>,
}

impl<'a> ResultMapper<'a> {
    pub fn new(graph: &'a SchemaGraph, data: Option<&'a (dyn Any + Send + Sync)>) -> Self {
        Self { graph, data }
    }

    /// Render the resolved value of `field`
    pub fn map_field(
        &self,
        field: &Field,
        children: &[ExecutionSelection],
        value: Value,
    ) -> Result<Value, EngineError> {
        let target = self.graph.schema_type(field.target_type);
        if target.is_scalar() {
            Ok(value)
        } else {
            self.map(target.id, children, value)
        }
    }

    /// Resolve a post field and project its children just-in-time
    pub fn post(
        &self,
        field: &Field,
        selection: &ExecutionSelection,
    ) -> Result<Value, EngineError> {
        let computed = field
            .compute(&selection.arguments)
            .map_err(|source| EngineError::Resolver {
                field: field.name.clone(),
                source,
            })?;
        tracing::debug!(field = %field.name, "Post field computed");

        if self.graph.schema_type(field.target_type).is_scalar() {
            return Ok(computed);
        }

        let compiler = ProjectionCompiler::new(self.graph, CompilationTier::Enumerable, self.data);
        let plan = compiler.compose(field, Expr::Const(computed), &selection.children, 1)?;
        let projected = Evaluator::in_process().run(&plan)?;
        self.map_field(field, &selection.children, projected)
    }

    fn map(
        &self,
        ty: TypeId,
        selections: &[ExecutionSelection],
        value: Value,
    ) -> Result<Value, EngineError> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.map(ty, selections, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(row) => self
                .map_row(self.graph.schema_type(ty), selections, row)
                .map(Value::Object),
            other => Ok(other),
        }
    }

    fn map_row(
        &self,
        ty: &SchemaType,
        selections: &[ExecutionSelection],
        row: Map<String, Value>,
    ) -> Result<Map<String, Value>, EngineError> {
        let runtime = row
            .get(TYPENAME)
            .and_then(Value::as_str)
            .and_then(|name| self.graph.type_by_name(name))
            .map(|t| t.id);

        let keys = record_keys(self.graph, ty, selections)?;
        let mut out = Map::new();
        for (selection, record_key) in selections.iter().zip(&keys) {
            let key = selection.output_name();
            if out.contains_key(key) {
                continue;
            }
            if let Some(condition) = selection.type_condition {
                match runtime {
                    Some(actual) if self.graph.is_subtype(actual, condition) => {}
                    _ => continue,
                }
            }

            let field = self.graph.field(selection.field);
            let value = if field.is_post() {
                self.post(field, selection)?
            } else if field.is_typename() {
                row.get(TYPENAME).cloned().unwrap_or_else(|| json!(ty.name))
            } else {
                let Some(raw) = record_key.as_ref().and_then(|k| row.get(k)) else {
                    continue;
                };
                self.map_field(field, &selection.children, raw.clone())?
            };
            out.insert(key.to_string(), value);
        }
        Ok(out)
    }
}
