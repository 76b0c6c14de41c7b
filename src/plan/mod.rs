//! Composable backend query plans
//!
//! A plan is a plain expression tree. Field plan builders return an [`Expr`],
//! the compiler wraps it with projections and materialization operators, and a
//! [`Backend`](crate::storage::Backend) dispatches the finished tree in one
//! round-trip.
//!
//! Scoping is implicit: [`Expr::Row`] always refers to the innermost row bound by
//! `Filter`, `Project`, `OrderBy` or `NullGuard`. [`Expr::Context`] refers to the
//! single execution context shared by every fragment of the plan. Outer rows
//! stay reachable through `Let` bindings and [`Expr::Var`].

pub mod eval;
pub mod tier;

use indexmap::IndexMap;
use serde_json::Value;

pub use eval::{CollectionSource, Evaluator};
pub use tier::{Capabilities, CompilationTier};

/// Key under which stored documents carry their runtime source shape
pub const SHAPE_KEY: &str = "__shape";

/// Comparison operators usable in filter predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A node of a backend query plan
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The shared execution context handle
    Context,

    /// The row currently in scope
    Row,

    /// A literal value captured at plan-build time
    Const(Value),

    /// A null typed as the given schema type
    Null { type_name: String },

    /// A named collection exposed by the backend
    Collection { name: String },

    /// A value bound by an enclosing `Let`
    Var(String),

    /// Binds `value` to `name` while evaluating `body`
    Let {
        name: String,
        value: Box<Expr>,
        body: Box<Expr>,
    },

    /// Member access on an object value
    Member { target: Box<Expr>, name: String },

    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    And(Vec<Expr>),

    Or(Vec<Expr>),

    Not(Box<Expr>),

    IsNull(Box<Expr>),

    /// Runtime shape test: true when the value's shape is one of `shapes`
    TypeIs { target: Box<Expr>, shapes: Vec<String> },

    /// Downcast to a narrower type; yields null when the shape does not match
    Cast {
        target: Box<Expr>,
        type_name: String,
        shapes: Vec<String>,
    },

    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },

    /// Evaluates `value`; short-circuits to a typed null when it is null,
    /// otherwise evaluates `body` with the value bound as the row.
    NullGuard {
        value: Box<Expr>,
        body: Box<Expr>,
        type_name: String,
    },

    /// Builds an instance of a projection shape
    Record {
        shape: String,
        bindings: IndexMap<String, Expr>,
    },

    Filter { source: Box<Expr>, predicate: Box<Expr> },

    Project { source: Box<Expr>, body: Box<Expr> },

    OrderBy {
        source: Box<Expr>,
        key: Box<Expr>,
        descending: bool,
    },

    Skip { source: Box<Expr>, count: usize },

    Take { source: Box<Expr>, count: usize },

    ToList(Box<Expr>),

    First(Box<Expr>),

    FirstOrDefault(Box<Expr>),
}

impl Expr {
    pub fn context() -> Self {
        Expr::Context
    }

    pub fn row() -> Self {
        Expr::Row
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Const(value.into())
    }

    pub fn typed_null(type_name: impl Into<String>) -> Self {
        Expr::Null {
            type_name: type_name.into(),
        }
    }

    pub fn collection(name: impl Into<String>) -> Self {
        Expr::Collection { name: name.into() }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    /// Evaluate `body` with `value` bound to `name`
    pub fn bind(name: impl Into<String>, value: Expr, body: Expr) -> Self {
        Expr::Let {
            name: name.into(),
            value: Box::new(value),
            body: Box::new(body),
        }
    }

    pub fn member(self, name: impl Into<String>) -> Self {
        Expr::Member {
            target: Box::new(self),
            name: name.into(),
        }
    }

    pub fn compare(self, op: CompareOp, other: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn equals(self, other: Expr) -> Self {
        self.compare(CompareOp::Eq, other)
    }

    pub fn not_equals(self, other: Expr) -> Self {
        self.compare(CompareOp::Ne, other)
    }

    pub fn less_than(self, other: Expr) -> Self {
        self.compare(CompareOp::Lt, other)
    }

    pub fn greater_than(self, other: Expr) -> Self {
        self.compare(CompareOp::Gt, other)
    }

    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut terms) => {
                terms.push(other);
                Expr::And(terms)
            }
            first => Expr::And(vec![first, other]),
        }
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull(Box::new(self))
    }

    pub fn filter(self, predicate: Expr) -> Self {
        Expr::Filter {
            source: Box::new(self),
            predicate: Box::new(predicate),
        }
    }

    pub fn project(self, body: Expr) -> Self {
        Expr::Project {
            source: Box::new(self),
            body: Box::new(body),
        }
    }

    pub fn order_by(self, key: Expr, descending: bool) -> Self {
        Expr::OrderBy {
            source: Box::new(self),
            key: Box::new(key),
            descending,
        }
    }

    pub fn skip(self, count: usize) -> Self {
        Expr::Skip {
            source: Box::new(self),
            count,
        }
    }

    pub fn take(self, count: usize) -> Self {
        Expr::Take {
            source: Box::new(self),
            count,
        }
    }

    pub fn to_list(self) -> Self {
        Expr::ToList(Box::new(self))
    }

    pub fn first(self) -> Self {
        Expr::First(Box::new(self))
    }

    pub fn first_or_default(self) -> Self {
        Expr::FirstOrDefault(Box::new(self))
    }

    /// Whether this node produces a sequence rather than a single value
    pub fn is_sequence(&self) -> bool {
        matches!(
            self,
            Expr::Collection { .. }
                | Expr::Filter { .. }
                | Expr::Project { .. }
                | Expr::OrderBy { .. }
                | Expr::Skip { .. }
                | Expr::Take { .. }
                | Expr::ToList(_)
        )
    }

    /// Direct children of this node, in evaluation order
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Context
            | Expr::Row
            | Expr::Const(_)
            | Expr::Null { .. }
            | Expr::Var(_)
            | Expr::Collection { .. } => Vec::new(),
            Expr::Let { value, body, .. } => vec![value, body],
            Expr::Member { target, .. }
            | Expr::TypeIs { target, .. }
            | Expr::Cast { target, .. } => vec![target],
            Expr::Compare { left, right, .. } => vec![left, right],
            Expr::And(terms) | Expr::Or(terms) => terms.iter().collect(),
            Expr::Not(inner)
            | Expr::IsNull(inner)
            | Expr::ToList(inner)
            | Expr::First(inner)
            | Expr::FirstOrDefault(inner) => vec![inner],
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => vec![test, then, otherwise],
            Expr::NullGuard { value, body, .. } => vec![value, body],
            Expr::Record { bindings, .. } => bindings.values().collect(),
            Expr::Filter { source, predicate } => vec![source, predicate],
            Expr::Project { source, body } => vec![source, body],
            Expr::OrderBy { source, key, .. } => vec![source, key],
            Expr::Skip { source, .. } | Expr::Take { source, .. } => vec![source],
        }
    }

    /// Whether any node of the tree satisfies `predicate`
    pub fn any(&self, predicate: &dyn Fn(&Expr) -> bool) -> bool {
        predicate(self) || self.children().into_iter().any(|child| child.any(predicate))
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Const(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fluent_builders_nest_in_order() {
        let plan = Expr::collection("users")
            .filter(Expr::row().member("id").equals(Expr::constant(1)))
            .first_or_default();

        let Expr::FirstOrDefault(inner) = &plan else {
            panic!("expected FirstOrDefault, got {:?}", plan);
        };
        let Expr::Filter { source, predicate } = inner.as_ref() else {
            panic!("expected Filter");
        };
        assert_eq!(**source, Expr::collection("users"));
        assert!(matches!(
            predicate.as_ref(),
            Expr::Compare {
                op: CompareOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn test_and_flattens_terms() {
        let a = Expr::row().member("a").is_null();
        let b = Expr::row().member("b").is_null();
        let c = Expr::row().member("c").is_null();

        let combined = a.and(b).and(c);
        match combined {
            Expr::And(terms) => assert_eq!(terms.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_is_sequence() {
        assert!(Expr::collection("x").is_sequence());
        assert!(Expr::collection("x").take(2).is_sequence());
        assert!(!Expr::collection("x").first().is_sequence());
        assert!(!Expr::row().member("name").is_sequence());
    }

    #[test]
    fn test_any_walks_nested_records() {
        let mut bindings = IndexMap::new();
        bindings.insert(
            "barks".to_string(),
            Expr::Cast {
                target: Box::new(Expr::Row),
                type_name: "Dog".to_string(),
                shapes: vec!["Dog".to_string()],
            }
            .member("barks"),
        );
        let plan = Expr::collection("animals")
            .project(Expr::Record {
                shape: "Animal".to_string(),
                bindings,
            })
            .to_list();

        assert!(plan.any(&|e| matches!(e, Expr::Cast { .. })));
        assert!(!plan.any(&|e| matches!(e, Expr::NullGuard { .. })));
    }

    #[test]
    fn test_from_value() {
        let expr: Expr = json!("x").into();
        assert_eq!(expr, Expr::Const(json!("x")));
    }
}
