//! Root field resolution

use serde_json::{Value, json};
use std::any::Any;

use crate::core::error::EngineError;
use crate::core::schema::{FieldResolver, PlanScope, ResolutionKind, SchemaGraph};
use crate::execution::context::ExecutionContext;
use crate::execution::projection::ProjectionCompiler;
use crate::execution::result_mapper::ResultMapper;
use crate::execution::selection::ExecutionSelection;
use crate::plan::{CompilationTier, Evaluator, Expr};

/// Resolve one root selection
///
/// Mutations run their side effect first. The field's plan is then built
/// against the shared context, composed with the projection of the selection
/// subtree and dispatched once, unless it is `Unmodified`, in which case it is
/// evaluated in-process.
pub(crate) async fn resolve_root_field(
    graph: &SchemaGraph,
    ctx: &mut ExecutionContext<'_>,
    default_store: &str,
    data: Option<&(dyn Any + Send + Sync)>,
    selection: &ExecutionSelection,
) -> Result<Value, EngineError> {
    let field = graph.field(selection.field);
    let mapper = ResultMapper::new(graph, data);

    if field.is_typename() {
        return Ok(json!(graph.schema_type(field.declaring_type).name));
    }
    if field.is_post() {
        return mapper.post(field, selection);
    }

    let resolver_error = |source| EngineError::Resolver {
        field: field.name.clone(),
        source,
    };

    let mutation_result = match &field.resolver {
        FieldResolver::Mutation { side_effect, .. } => {
            tracing::debug!(field = %field.name, "Running mutation side effect");
            let result = side_effect(selection.arguments.clone())
                .await
                .map_err(resolver_error)?;
            Some(result)
        }
        _ => None,
    };

    let mut scope = PlanScope::new(Expr::Context, data);
    if let Some(result) = &mutation_result {
        scope = scope.with_mutation_result(result);
    }
    let plan = field
        .build_plan(&scope, &selection.arguments)
        .map_err(resolver_error)?;

    let raw = if field.resolution == ResolutionKind::Unmodified {
        let compiled = ProjectionCompiler::new(graph, CompilationTier::Enumerable, data)
            .compose(field, plan, &selection.children, 1)?;
        Evaluator::in_process().run(&compiled)?
    } else {
        let store = field.store.as_deref().unwrap_or(default_store);
        let tier = CompilationTier::from(ctx.capabilities(store)?);
        let compiled = ProjectionCompiler::new(graph, tier, data).compose(
            field,
            plan,
            &selection.children,
            1,
        )?;
        tracing::debug!(field = %field.name, store, ?tier, "Dispatching plan");
        ctx.dispatch(store, &compiled).await?
    };

    mapper.map_field(field, &selection.children, raw)
}
