//! Core executor orchestration

use graphql_parser::query::{
    Definition, Document, OperationDefinition, SelectionSet, VariableDefinition, parse_query,
};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::context::ExecutionContext;
use super::field_executor;
use super::selection::{Binder, ExecutionSelection};
use crate::config::EngineConfig;
use crate::core::complexity::{field_complexity, list_multiplier};
use crate::core::error::{DocumentError, EngineError};
use crate::core::schema::{Complexity, Schema, SchemaGraph, TypeId};
use crate::core::variables::literal_to_json;
use crate::storage::Backend;

/// Per-request inputs
#[derive(Clone, Default)]
pub struct Request {
    /// Operation to run when the document holds several
    pub operation_name: Option<String>,

    /// Variable values, by name without the `$`
    pub variables: Map<String, Value>,

    /// Opaque user data handed to plan builders through [`PlanScope::data`]
    ///
    /// [`PlanScope::data`]: crate::core::schema::PlanScope::data
    pub data: Option<Arc<dyn Any + Send + Sync>>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.data = Some(Arc::new(data));
        self
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("operation_name", &self.operation_name)
            .field("variables", &self.variables)
            .field("data", &self.data.is_some())
            .finish()
    }
}

/// Executes query documents against a completed schema
///
/// Each root field compiles into a single plan dispatched to the store it names
/// (or the configured default store). Root fields run one after another, so
/// mutation side effects are observed in document order.
pub struct Executor {
    schema: Schema,
    stores: HashMap<String, Arc<dyn Backend>>,
    config: EngineConfig,
}

impl Executor {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            stores: HashMap::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a backend under `name`
    pub fn with_store(self, name: impl Into<String>, store: impl Backend + 'static) -> Self {
        self.with_shared_store(name, Arc::new(store))
    }

    /// Register a backend that is also held elsewhere
    pub fn with_shared_store(mut self, name: impl Into<String>, store: Arc<dyn Backend>) -> Self {
        self.stores.insert(name.into(), store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Parse and execute a query string
    pub async fn execute_str(&self, query: &str, request: &Request) -> Result<Value, EngineError> {
        let document = parse_query::<String>(query).map_err(|e| DocumentError::Parse {
            message: e.to_string(),
        })?;
        self.execute(&document, request).await
    }

    /// Execute a parsed document
    ///
    /// Every selection is bound before the first backend call, so unknown
    /// fields and bad arguments never cause a partial execution.
    pub async fn execute(
        &self,
        document: &Document<'_, String>,
        request: &Request,
    ) -> Result<Value, EngineError> {
        let graph = self.schema.graph()?;
        let roots = self.bind(graph, document, request)?;

        let complexity = self.sum(graph, &roots);
        if let Some(limit) = self.config.complexity.warn_above {
            if complexity.high() > limit {
                tracing::warn!(
                    low = complexity.low(),
                    high = complexity.high(),
                    limit,
                    "Query complexity exceeds the configured threshold"
                );
            }
        }

        let data = request.data.as_deref();
        let mut ctx = ExecutionContext::new(&self.stores);
        let mut result = Map::new();

        for selection in &roots {
            let key = selection.output_name();
            if result.contains_key(key) {
                continue;
            }
            let value = field_executor::resolve_root_field(
                graph,
                &mut ctx,
                &self.config.default_store,
                data,
                selection,
            )
            .await?;
            result.insert(key.to_string(), value);
        }

        tracing::debug!(
            fields = result.len(),
            dispatches = ctx.dispatches(),
            "Executed operation"
        );
        Ok(Value::Object(result))
    }

    /// Advisory cost of a document, without executing it
    pub fn estimate_complexity(
        &self,
        document: &Document<'_, String>,
        request: &Request,
    ) -> Result<Complexity, EngineError> {
        let graph = self.schema.graph()?;
        let roots = self.bind(graph, document, request)?;
        Ok(self.sum(graph, &roots))
    }

    fn bind(
        &self,
        graph: &SchemaGraph,
        document: &Document<'_, String>,
        request: &Request,
    ) -> Result<Vec<ExecutionSelection>, EngineError> {
        let (root, variable_definitions, selection_set) =
            select_operation(graph, document, request.operation_name.as_deref())?;
        let variables = with_defaults(&request.variables, variable_definitions)?;

        Binder::new(
            graph,
            &document.definitions,
            &variables,
            self.config.max_depth,
        )
        .bind(root, &selection_set.items)
    }

    fn sum(&self, graph: &SchemaGraph, selections: &[ExecutionSelection]) -> Complexity {
        selections
            .iter()
            .fold(Complexity::Zero, |acc, s| acc.plus(self.cost(graph, s)))
    }

    fn cost(&self, graph: &SchemaGraph, selection: &ExecutionSelection) -> Complexity {
        let field = graph.field(selection.field);
        let cfg = &self.config.complexity;
        let own = field_complexity(graph, field, cfg);
        let children = self.sum(graph, &selection.children);
        own.plus(list_multiplier(field, cfg).times(children))
    }
}

type Operation<'d, 'q> = (
    TypeId,
    &'d [VariableDefinition<'q, String>],
    &'d SelectionSet<'q, String>,
);

/// Pick the operation to run: by name, else the first one
fn select_operation<'d, 'q>(
    graph: &SchemaGraph,
    document: &'d Document<'q, String>,
    name: Option<&str>,
) -> Result<Operation<'d, 'q>, EngineError> {
    let mut operations = document.definitions.iter().filter_map(|def| match def {
        Definition::Operation(op) => Some(op),
        Definition::Fragment(_) => None,
    });

    let operation = match name {
        Some(name) => operations
            .find(|op| operation_name(op) == Some(name))
            .ok_or_else(|| DocumentError::UnknownOperation {
                name: name.to_string(),
            })?,
        None => operations.next().ok_or(DocumentError::NoOperation)?,
    };

    let query = graph.query_type().id;
    let mutation = graph.mutation_type().id;
    match operation {
        OperationDefinition::SelectionSet(set) => Ok((query, &[], set)),
        OperationDefinition::Query(q) => Ok((query, &q.variable_definitions, &q.selection_set)),
        OperationDefinition::Mutation(m) => {
            Ok((mutation, &m.variable_definitions, &m.selection_set))
        }
        OperationDefinition::Subscription(_) => Err(DocumentError::Unsupported {
            operation: "Subscriptions".to_string(),
        }
        .into()),
    }
}

fn operation_name<'d>(operation: &'d OperationDefinition<'_, String>) -> Option<&'d str> {
    match operation {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(q) => q.name.as_deref(),
        OperationDefinition::Mutation(m) => m.name.as_deref(),
        OperationDefinition::Subscription(s) => s.name.as_deref(),
    }
}

/// Request variables, completed with the operation's declared defaults
fn with_defaults(
    supplied: &Map<String, Value>,
    definitions: &[VariableDefinition<'_, String>],
) -> Result<Map<String, Value>, EngineError> {
    let mut variables = supplied.clone();
    for definition in definitions {
        if variables.contains_key(&definition.name) {
            continue;
        }
        if let Some(default) = &definition.default_value {
            let value = literal_to_json(&definition.name, default, &Map::new())?;
            variables.insert(definition.name.clone(), value);
        }
    }
    Ok(variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{FieldDef, SchemaBuilder, SourceShape};
    use crate::plan::Expr;
    use crate::storage::InMemoryStore;
    use serde_json::json;

    fn user_schema() -> Schema {
        let mut builder = SchemaBuilder::new();
        let user = builder.declare_type(SourceShape::new("User")).unwrap();
        builder.add_field(user, FieldDef::new("id", "Int!")).unwrap();
        builder.add_field(user, FieldDef::new("name", "String")).unwrap();

        let query = builder.query_type();
        builder
            .add_field(
                query,
                FieldDef::new("user", "User")
                    .argument("id", "Int!")
                    .plan(|scope, args| {
                        Ok(scope
                            .context()
                            .member("users")
                            .filter(Expr::row().member("id").equals(Expr::constant(args.value("id")))))
                    })
                    .first_or_default(),
            )
            .unwrap();
        builder
            .add_field(
                query,
                FieldDef::new("users", "[User]")
                    .plan(|scope, _| Ok(scope.context().member("users"))),
            )
            .unwrap();
        builder.complete().unwrap()
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new().with_context(json!({
            "users": [
                {"__shape": "User", "id": 1, "name": "Joe"},
                {"__shape": "User", "id": 2, "name": "Ann"}
            ]
        }))
    }

    fn executor() -> Executor {
        Executor::new(user_schema()).with_store("default", store())
    }

    #[tokio::test]
    async fn test_execute_single_row() {
        let result = executor()
            .execute_str("{ user(id: 1) { id name } }", &Request::new())
            .await
            .unwrap();
        assert_eq!(result, json!({"user": {"id": 1, "name": "Joe"}}));
    }

    #[tokio::test]
    async fn test_execute_rejects_incomplete_schema() {
        let builder = SchemaBuilder::new();
        let executor = Executor::new(builder.schema());
        let err = executor
            .execute_str("{ __typename }", &Request::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotCompleted));
    }

    #[tokio::test]
    async fn test_parse_error() {
        let err = executor()
            .execute_str("{ user(id: 1) { ", &Request::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Document(DocumentError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_operation_selection_by_name() {
        let query = "query A { user(id: 1) { name } } query B { user(id: 2) { name } }";
        let executor = executor();

        let first = executor.execute_str(query, &Request::new()).await.unwrap();
        assert_eq!(first, json!({"user": {"name": "Joe"}}));

        let named = executor
            .execute_str(query, &Request::new().operation("B"))
            .await
            .unwrap();
        assert_eq!(named, json!({"user": {"name": "Ann"}}));

        let err = executor
            .execute_str(query, &Request::new().operation("C"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Document(DocumentError::UnknownOperation { .. })
        ));
    }

    #[tokio::test]
    async fn test_subscriptions_are_rejected() {
        let err = executor()
            .execute_str("subscription { users { id } }", &Request::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Document(DocumentError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_variable_defaults_apply() {
        let query = "query Q($id: Int = 2) { user(id: $id) { name } }";
        let executor = executor();

        let defaulted = executor.execute_str(query, &Request::new()).await.unwrap();
        assert_eq!(defaulted, json!({"user": {"name": "Ann"}}));

        let supplied = executor
            .execute_str(query, &Request::new().variable("id", 1))
            .await
            .unwrap();
        assert_eq!(supplied, json!({"user": {"name": "Joe"}}));
    }

    #[tokio::test]
    async fn test_unknown_store_fails() {
        let executor = Executor::new(user_schema());
        let err = executor
            .execute_str("{ users { id } }", &Request::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Backend(_)));
    }

    #[test]
    fn test_estimate_complexity() {
        let executor = executor();
        let single = parse_query::<String>("{ user(id: 1) { id name } }").unwrap();
        assert_eq!(
            executor.estimate_complexity(&single, &Request::new()).unwrap(),
            Complexity::One
        );

        let list = parse_query::<String>("{ users { id } a: user(id: 1) { id } }").unwrap();
        assert_eq!(
            executor.estimate_complexity(&list, &Request::new()).unwrap(),
            Complexity::Range { low: 2, high: 101 }
        );
    }
}
