//! Shared test harness for executor integration tests
//!
//! Builds a small schema over an [`InMemoryStore`]:
//!
//! - `User` with member, custom-plan and post fields
//! - `Order`, reached from users through a parent-row filter
//! - `Animal` interface implemented by `Dog` and `Cat`, and the `Pet` union of both
//! - `Puppy`, extending `Dog`, listed with a cat in the `kennel` collection
//! - `renameUser` and `noteEvent` mutations
//!
//! # Usage
//!
//! ```rust,ignore
//! mod engine_harness;
//! use engine_harness::*;
//! ```

#![allow(dead_code)]

use futures::FutureExt;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use linqgraph::prelude::*;

/// Records the order in which resolver callbacks ran
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
    greetings: Arc<AtomicUsize>,
}

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.into());
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn greetings(&self) -> usize {
        self.greetings.load(Ordering::SeqCst)
    }
}

pub fn users() -> Vec<Value> {
    vec![
        json!({
            "__shape": "User",
            "id": 1,
            "name": "Joe",
            "orders": [
                {"__shape": "Order", "id": 10, "total": 25.5, "userId": 1}
            ],
            "bestFriend": {"__shape": "User", "id": 2, "name": "Ann"}
        }),
        json!({
            "__shape": "User",
            "id": 2,
            "name": "Ann",
            "orders": []
        }),
    ]
}

pub fn orders() -> Vec<Value> {
    vec![
        json!({"__shape": "Order", "id": 10, "total": 25.5, "userId": 1}),
        json!({"__shape": "Order", "id": 11, "total": 80.0, "userId": 1}),
        json!({"__shape": "Order", "id": 12, "total": 12.0, "userId": 2}),
    ]
}

pub fn animals() -> Vec<Value> {
    vec![
        json!({"__shape": "Dog", "name": "Rex", "barks": true}),
        json!({"__shape": "Cat", "name": "Tom", "lives": 9}),
    ]
}

pub fn kennel() -> Vec<Value> {
    vec![
        json!({"__shape": "Puppy", "name": "Bit", "barks": false}),
        json!({"__shape": "Cat", "name": "Tom", "lives": 9}),
    ]
}

/// Store seeded with users, orders, animals and the kennel
pub fn seeded_store() -> InMemoryStore {
    InMemoryStore::new()
        .with_collection("users", users())
        .with_collection("orders", orders())
        .with_collection("animals", animals())
        .with_collection("kennel", kennel())
}

fn by_id(collection: &str, id: Value) -> Expr {
    Expr::collection(collection).filter(Expr::row().member("id").equals(Expr::constant(id)))
}

/// Build and complete the sample schema
///
/// `store` is the store mutations write to; `log` observes callback order.
pub fn build_schema(store: &InMemoryStore, log: &CallLog) -> Schema {
    let mut builder = SchemaBuilder::new();

    let user = builder.declare_type(SourceShape::new("User")).unwrap();
    let order = builder.declare_type(SourceShape::new("Order")).unwrap();
    let animal = builder.declare_type(SourceShape::interface("Animal")).unwrap();
    let dog = builder.declare_type(SourceShape::new("Dog")).unwrap();
    let cat = builder.declare_type(SourceShape::new("Cat")).unwrap();
    let pet = builder.declare_type(SourceShape::union("Pet")).unwrap();
    builder
        .declare_type(SourceShape::new("Puppy").extends("Dog"))
        .unwrap();

    builder.add_interface(animal, dog).unwrap();
    builder.add_interface(animal, cat).unwrap();
    builder.add_union_member(pet, dog).unwrap();
    builder.add_union_member(pet, cat).unwrap();

    // --- Order ---
    builder.add_field(order, FieldDef::new("id", "Int!")).unwrap();
    builder.add_field(order, FieldDef::new("total", "Float")).unwrap();

    // --- User ---
    builder.add_field(user, FieldDef::new("id", "Int!")).unwrap();
    builder.add_field(user, FieldDef::new("name", "String")).unwrap();
    builder
        .add_field(user, FieldDef::new("displayName", "String").member("name"))
        .unwrap();
    builder.add_field(user, FieldDef::new("orders", "[Order]")).unwrap();
    builder
        .add_field(user, FieldDef::new("bestFriend", "User"))
        .unwrap();
    builder
        .add_field(
            user,
            FieldDef::new("largeOrders", "[Order]")
                .argument("above", "Float")
                .plan(|scope, args| {
                    let above = args.value("above");
                    Ok(Expr::collection("orders")
                        .filter(
                            Expr::row()
                                .member("userId")
                                .equals(scope.parent().member("id"))
                                .and(Expr::row().member("total").greater_than(Expr::constant(above))),
                        )
                        .order_by(Expr::row().member("total"), true))
                }),
        )
        .unwrap();

    let greetings = log.greetings.clone();
    builder
        .add_computed_field(
            user,
            FieldDef::new("greeting", "String").arguments(
                ArgumentShape::new().argument_with_default("word", "String", json!("hi")),
            ),
            move |args| {
                greetings.fetch_add(1, Ordering::SeqCst);
                Ok(json!(format!("{} there", args.get_str("word").unwrap_or_default())))
            },
        )
        .unwrap();

    // --- Animals ---
    builder.add_field(animal, FieldDef::new("name", "String")).unwrap();
    builder.add_field(dog, FieldDef::new("name", "String")).unwrap();
    builder.add_field(dog, FieldDef::new("barks", "Boolean")).unwrap();
    builder.add_field(cat, FieldDef::new("name", "String")).unwrap();
    builder.add_field(cat, FieldDef::new("lives", "Int")).unwrap();

    // --- Query ---
    let query = builder.query_type();
    builder
        .add_field(
            query,
            FieldDef::new("user", "User")
                .argument("id", "Int!")
                .plan(|_, args| Ok(by_id("users", args.value("id"))))
                .description("Look up one user"),
        )
        .unwrap();
    builder
        .add_field(
            query,
            FieldDef::new("users", "[User]").plan(|_, _| Ok(Expr::collection("users"))),
        )
        .unwrap();
    builder
        .add_field(
            query,
            FieldDef::new("animals", "[Animal]").plan(|_, _| Ok(Expr::collection("animals"))),
        )
        .unwrap();
    builder
        .add_field(
            query,
            FieldDef::new("pets", "[Pet]").plan(|_, _| Ok(Expr::collection("animals"))),
        )
        .unwrap();
    builder
        .add_field(
            query,
            FieldDef::new("kennel", "[Animal]").plan(|_, _| Ok(Expr::collection("kennel"))),
        )
        .unwrap();
    builder
        .add_computed_field(query, FieldDef::new("version", "String"), |_| Ok(json!("1.0")))
        .unwrap();

    // --- Mutations ---
    let writer = store.clone();
    let effect_log = log.clone();
    let plan_log = log.clone();
    builder
        .add_mutation(
            MutationDef::new("renameUser", "User", move |args: Arguments| {
                let store = writer.clone();
                let log = effect_log.clone();
                async move {
                    log.push("effect");
                    let id = args.value("id");
                    store
                        .update("users", &id, json!({"name": args.value("name")}))
                        .await?;
                    Ok::<_, anyhow::Error>(json!({"id": id}))
                }
                .boxed()
            })
            .argument("id", "Int!")
            .argument("name", "String!")
            .plan(move |scope, _| {
                plan_log.push("plan");
                let id = scope
                    .mutation_result()
                    .and_then(|result| result.get("id"))
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok(by_id("users", id))
            }),
        )
        .unwrap();

    let note_log = log.clone();
    builder
        .add_mutation(MutationDef::new(
            "noteEvent",
            "String",
            move |args: Arguments| {
                let log = note_log.clone();
                async move {
                    let text = args.get_str("text").unwrap_or_default().to_string();
                    log.push(text.clone());
                    Ok::<_, anyhow::Error>(json!(text))
                }
                .boxed()
            },
        ).argument("text", "String!"))
        .unwrap();

    builder.complete().unwrap()
}

/// Executor over a fresh seeded store, plus handles to observe it
pub fn setup() -> (Executor, InMemoryStore, CallLog) {
    setup_with(Capabilities::ENUMERABLE)
}

pub fn setup_with(capabilities: Capabilities) -> (Executor, InMemoryStore, CallLog) {
    let store = seeded_store()
        .with_plan_log()
        .with_capabilities(capabilities);
    let log = CallLog::default();
    let schema = build_schema(&store, &log);
    let executor = Executor::new(schema).with_store("default", store.clone());
    (executor, store, log)
}

/// Whether any node of `plan` satisfies `predicate`
pub fn plan_contains(plan: &Expr, predicate: &dyn Fn(&Expr) -> bool) -> bool {
    plan.any(predicate)
}
