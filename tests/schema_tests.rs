//! Schema completion and introspection through the public API

mod engine_harness;

use engine_harness::*;
use linqgraph::prelude::*;

#[test]
fn test_complete_runs_once() {
    let mut builder = SchemaBuilder::new();
    let user = builder.declare_type(SourceShape::new("User")).unwrap();
    builder.add_field(user, FieldDef::new("id", "Int!")).unwrap();

    let schema = builder.complete().unwrap();
    assert!(schema.is_completed());
    assert_eq!(builder.complete().unwrap_err(), SchemaError::AlreadyCompleted);
    assert!(matches!(
        builder.add_field(user, FieldDef::new("name", "String")),
        Err(SchemaError::AlreadyCompleted)
    ));
}

#[test]
fn test_handles_issued_before_completion_see_the_graph() {
    let mut builder = SchemaBuilder::new();
    let early = builder.schema();
    assert!(!early.is_completed());
    assert!(matches!(early.graph(), Err(EngineError::NotCompleted)));

    builder.complete().unwrap();
    assert!(early.is_completed());
    assert!(early.graph().unwrap().type_by_name("Query").is_some());
}

#[test]
fn test_unknown_target_type_fails_completion() {
    let mut builder = SchemaBuilder::new();
    let user = builder.declare_type(SourceShape::new("User")).unwrap();
    builder
        .add_field(user, FieldDef::new("company", "Company"))
        .unwrap();

    match builder.complete() {
        Err(SchemaError::UnknownType { name, .. }) => assert_eq!(name, "Company"),
        other => panic!("expected UnknownType, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_conflicting_merged_fields() {
    let mut builder = SchemaBuilder::new();
    let named = builder.declare_type(SourceShape::interface("Named")).unwrap();
    let user = builder.declare_type(SourceShape::new("User")).unwrap();
    builder.add_interface(named, user).unwrap();
    builder.add_field(named, FieldDef::new("name", "String")).unwrap();
    builder.add_field(user, FieldDef::new("name", "[String]")).unwrap();

    assert!(matches!(
        builder.complete(),
        Err(SchemaError::FieldTypeConflict { .. })
    ));
}

#[test]
fn test_reserved_names_are_rejected() {
    let mut builder = SchemaBuilder::new();
    assert!(matches!(
        builder.declare_type(SourceShape::new("__Secret")),
        Err(SchemaError::InvalidName { .. })
    ));
    assert!(matches!(
        builder.declare_type(SourceShape::new("Query")),
        Err(SchemaError::DuplicateType { .. })
    ));
}

#[tokio::test]
async fn test_type_introspection() {
    let (executor, store, _) = setup();
    let data = executor
        .execute_str(
            r#"{ __type(name: "Animal") { name kind possibleTypes { name } } }"#,
            &Request::new(),
        )
        .await
        .unwrap();

    assert_eq!(data["__type"]["name"], "Animal");
    assert_eq!(data["__type"]["kind"], "INTERFACE");
    let possible: Vec<&str> = data["__type"]["possibleTypes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(possible.contains(&"Dog"));
    assert!(possible.contains(&"Cat"));
    assert_eq!(store.dispatch_count(), 0);
}

#[tokio::test]
async fn test_schema_introspection_lists_root_fields() {
    let (executor, _, _) = setup();
    let data = executor
        .execute_str(
            "{ __schema { queryType { name fields { name } } mutationType { name } } }",
            &Request::new(),
        )
        .await
        .unwrap();

    let schema = &data["__schema"];
    assert_eq!(schema["queryType"]["name"], "Query");
    assert_eq!(schema["mutationType"]["name"], "Mutation");

    let fields: Vec<&str> = schema["queryType"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f["name"].as_str())
        .collect();
    assert!(fields.contains(&"user"));
    assert!(fields.contains(&"version"));
    assert!(!fields.iter().any(|f| f.starts_with("__")));
}

#[tokio::test]
async fn test_unknown_type_introspects_as_null() {
    let (executor, _, _) = setup();
    let data = executor
        .execute_str(r#"{ __type(name: "Nope") { name } }"#, &Request::new())
        .await
        .unwrap();
    assert_eq!(data, json!({"__type": null}));
}

#[tokio::test]
async fn test_complexity_estimate() {
    let (executor, _, _) = setup();
    let document =
        graphql_parser::query::parse_query::<String>("{ users { id orders { id } } }").unwrap();
    let estimate = executor
        .estimate_complexity(&document, &Request::new())
        .unwrap();

    // users: 1..100 rows, each with 1..100 orders
    assert_eq!(estimate.low(), 2);
    assert_eq!(estimate.high(), 100 + 100 * 100);
}
