//! Built-in introspection types
//!
//! `__schema` and `__type(name)` resolve from a JSON snapshot of the completed
//! graph. Both are `Unmodified` fields, so they are evaluated in-process and
//! never reach a backend.

use serde_json::{Value, json};
use std::sync::{Arc, OnceLock};

use crate::core::error::SchemaError;
use crate::core::schema::builder::SchemaBuilder;
use crate::core::schema::field::{Cardinality, Field, FieldDef};
use crate::core::schema::graph::SchemaGraph;
use crate::core::schema::types::{SchemaType, SourceShape, TypeKind};
use crate::core::variables::InputType;
use crate::plan::Expr;

pub const SCHEMA_FIELD: &str = "__schema";
pub const TYPE_FIELD: &str = "__type";

/// Declare the introspection types and root fields
pub(super) fn register(
    builder: &mut SchemaBuilder,
    snapshot: Arc<OnceLock<Value>>,
) -> Result<(), SchemaError> {
    let schema = builder.declare(SourceShape::new("__Schema"))?;
    let ty = builder.declare(SourceShape::new("__Type"))?;
    let field = builder.declare(SourceShape::new("__Field"))?;
    let input = builder.declare(SourceShape::new("__InputValue"))?;

    builder.insert_field(schema, FieldDef::new("queryType", "__Type!"))?;
    builder.insert_field(schema, FieldDef::new("mutationType", "__Type"))?;
    builder.insert_field(schema, FieldDef::new("types", "[__Type!]!"))?;

    builder.insert_field(ty, FieldDef::new("kind", "String!"))?;
    builder.insert_field(ty, FieldDef::new("name", "String"))?;
    builder.insert_field(ty, FieldDef::new("description", "String"))?;
    builder.insert_field(ty, FieldDef::new("fields", "[__Field!]"))?;
    builder.insert_field(ty, FieldDef::new("interfaces", "[__Type!]"))?;
    builder.insert_field(ty, FieldDef::new("possibleTypes", "[__Type!]"))?;
    builder.insert_field(ty, FieldDef::new("enumValues", "[String!]"))?;
    builder.insert_field(ty, FieldDef::new("ofType", "__Type"))?;

    builder.insert_field(field, FieldDef::new("name", "String!"))?;
    builder.insert_field(field, FieldDef::new("description", "String"))?;
    builder.insert_field(field, FieldDef::new("type", "__Type!"))?;
    builder.insert_field(field, FieldDef::new("args", "[__InputValue!]!"))?;

    builder.insert_field(input, FieldDef::new("name", "String!"))?;
    builder.insert_field(input, FieldDef::new("description", "String"))?;
    builder.insert_field(input, FieldDef::new("type", "__Type!"))?;
    builder.insert_field(input, FieldDef::new("defaultValue", "String"))?;

    let query = builder.query_type();
    let whole = snapshot.clone();
    builder.insert_field(
        query,
        FieldDef::new(SCHEMA_FIELD, "__Schema!")
            .plan(move |_, _| Ok(Expr::Const(whole.get().cloned().unwrap_or(Value::Null))))
            .unmodified(),
    )?;
    builder.insert_field(
        query,
        FieldDef::new(TYPE_FIELD, "__Type")
            .argument("name", "String!")
            .plan(move |_, args| {
                let name = args.get_str("name").unwrap_or_default();
                let found = snapshot
                    .get()
                    .and_then(|s| s.get("types"))
                    .and_then(Value::as_array)
                    .and_then(|types| types.iter().find(|t| t["name"] == name))
                    .cloned();
                Ok(Expr::Const(found.unwrap_or(Value::Null)))
            })
            .unmodified(),
    )?;
    Ok(())
}

/// JSON description of the whole schema
pub(super) fn snapshot(graph: &SchemaGraph) -> Value {
    let mutation = graph.mutation_type();
    let has_mutations = visible_fields(graph, mutation).next().is_some();

    json!({
        "queryType": describe_type(graph, graph.query_type()),
        "mutationType": if has_mutations { describe_type(graph, mutation) } else { Value::Null },
        "types": graph.types().map(|t| describe_type(graph, t)).collect::<Vec<_>>(),
    })
}

fn visible_fields<'g>(graph: &'g SchemaGraph, ty: &'g SchemaType) -> impl Iterator<Item = &'g Field> {
    ty.fields
        .values()
        .map(|id| graph.field(*id))
        .filter(|f| !f.name.starts_with("__"))
}

fn describe_type(graph: &SchemaGraph, ty: &SchemaType) -> Value {
    let fields = match ty.kind {
        TypeKind::Object | TypeKind::Interface => Value::Array(
            visible_fields(graph, ty)
                .map(|f| describe_field(graph, f))
                .collect(),
        ),
        _ => Value::Null,
    };
    let possible = if ty.kind.is_abstract() {
        Value::Array(
            ty.descendants
                .iter()
                .map(|d| named_ref(graph.schema_type(*d)))
                .collect(),
        )
    } else {
        Value::Null
    };
    let interfaces = match ty.kind {
        TypeKind::Object | TypeKind::Interface => Value::Array(
            ty.interfaces
                .iter()
                .map(|i| named_ref(graph.schema_type(*i)))
                .collect(),
        ),
        _ => Value::Null,
    };
    let enum_values = graph
        .variables()
        .get(&ty.name)
        .and_then(|rule| rule.enum_values())
        .map(|values| json!(values))
        .unwrap_or(Value::Null);

    json!({
        "kind": ty.kind.as_str(),
        "name": ty.name,
        "description": ty.description,
        "fields": fields,
        "interfaces": interfaces,
        "possibleTypes": possible,
        "enumValues": enum_values,
        "ofType": Value::Null,
    })
}

fn describe_field(graph: &SchemaGraph, field: &Field) -> Value {
    let target = named_ref(graph.schema_type(field.target_type));
    let ty = match field.cardinality {
        Cardinality::List => json!({ "kind": "LIST", "name": null, "ofType": target }),
        Cardinality::Single => target,
    };
    let args: Vec<Value> = field
        .arguments
        .iter()
        .map(|arg| {
            json!({
                "name": arg.name,
                "description": null,
                "type": input_ref(graph, &arg.ty),
                "defaultValue": arg.default.as_ref().map(|d| d.to_string()),
            })
        })
        .collect();

    json!({
        "name": field.name,
        "description": field.description,
        "type": ty,
        "args": args,
    })
}

fn named_ref(ty: &SchemaType) -> Value {
    json!({ "kind": ty.kind.as_str(), "name": ty.name, "ofType": null })
}

fn input_ref(graph: &SchemaGraph, ty: &InputType) -> Value {
    match ty {
        InputType::Named(name) => {
            let kind = graph
                .type_by_name(name)
                .map(|t| t.kind.as_str())
                .unwrap_or("SCALAR");
            json!({ "kind": kind, "name": name, "ofType": null })
        }
        InputType::List(inner) => {
            json!({ "kind": "LIST", "name": null, "ofType": input_ref(graph, inner) })
        }
        InputType::NonNull(inner) => {
            json!({ "kind": "NON_NULL", "name": null, "ofType": input_ref(graph, inner) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::field::FieldDef;

    #[test]
    fn test_snapshot_describes_user_types() {
        let mut builder = SchemaBuilder::new();
        let user = builder.declare_type(SourceShape::new("User")).unwrap();
        builder.describe_type(user, "A person").unwrap();
        builder.add_field(user, FieldDef::new("id", "Int!")).unwrap();
        builder
            .add_field(
                builder.query_type(),
                FieldDef::new("users", "[User]").argument("limit", "Int"),
            )
            .unwrap();
        let schema = builder.complete().unwrap();
        let snapshot = snapshot(schema.graph().unwrap());

        let types = snapshot["types"].as_array().unwrap();
        let user = types.iter().find(|t| t["name"] == "User").unwrap();
        assert_eq!(user["kind"], "OBJECT");
        assert_eq!(user["description"], "A person");
        assert_eq!(user["fields"][0]["name"], "id");

        let users = &snapshot["queryType"]["fields"][0];
        assert_eq!(users["name"], "users");
        assert_eq!(users["type"]["kind"], "LIST");
        assert_eq!(users["type"]["ofType"]["name"], "User");
        assert_eq!(users["args"][0]["type"]["name"], "Int");
        assert_eq!(snapshot["mutationType"], Value::Null);
    }
}
