//! Field declarations and resolvers

use anyhow::{Result, bail};
use futures::future::BoxFuture;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::core::error::SchemaError;
use crate::core::schema::types::TypeId;
use crate::core::variables::{ArgumentShape, Arguments, InputType};
use crate::plan::Expr;

/// Arena index of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub(crate) usize);

impl FieldId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    List,
}

/// How a field's backend plan is forced into a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    /// The plan is an already-resolved value; no backend composition
    Unmodified,
    First,
    FirstOrDefault,
    ToList,
}

/// Advisory cost of resolving a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Zero,
    One,
    Range { low: u64, high: u64 },
}

/// Output type reference, resolved to a [`TypeId`] at completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputType {
    pub name: String,
    pub cardinality: Cardinality,
}

impl OutputType {
    /// Parse `"User"`, `"[User!]!"` and friends
    pub fn parse(spec: &str) -> Result<Self, SchemaError> {
        let parsed = InputType::parse(spec)?;
        let cardinality = match &parsed {
            InputType::List(_) => Cardinality::List,
            InputType::NonNull(inner) if matches!(**inner, InputType::List(_)) => {
                Cardinality::List
            }
            _ => Cardinality::Single,
        };
        Ok(Self {
            name: parsed.named().to_string(),
            cardinality,
        })
    }
}

/// Everything a plan builder may reference
///
/// The context expression is the single shared handle for the whole call: every
/// builder receives the same one, so nested fields fold into the parent's plan.
pub struct PlanScope<'a> {
    parent: Expr,
    mutation_result: Option<&'a Value>,
    data: Option<&'a (dyn Any + Send + Sync)>,
}

impl<'a> PlanScope<'a> {
    pub(crate) fn new(parent: Expr, data: Option<&'a (dyn Any + Send + Sync)>) -> Self {
        Self {
            parent,
            mutation_result: None,
            data,
        }
    }

    pub(crate) fn with_mutation_result(mut self, result: &'a Value) -> Self {
        self.mutation_result = Some(result);
        self
    }

    /// The shared execution context handle
    pub fn context(&self) -> Expr {
        Expr::Context
    }

    /// Expression for the value the field is resolved on
    pub fn parent(&self) -> Expr {
        self.parent.clone()
    }

    /// Result of the mutation side effect, for mutation read plans
    pub fn mutation_result(&self) -> Option<&Value> {
        self.mutation_result
    }

    /// Request-scoped user data
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.and_then(|d| d.downcast_ref::<T>())
    }
}

pub type PlanBuilder = Arc<dyn Fn(&PlanScope<'_>, &Arguments) -> Result<Expr> + Send + Sync>;

pub type ComputeFn = Arc<dyn Fn(&Arguments) -> Result<Value> + Send + Sync>;

pub type SideEffectFn = Arc<dyn Fn(Arguments) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// How a field produces its value
#[derive(Clone)]
pub enum FieldResolver {
    /// Member access on the parent value
    Member(String),

    /// Custom backend plan
    Plan(PlanBuilder),

    /// Post field computed in-process, never part of a backend plan
    Computed(ComputeFn),

    /// Backend write followed by a read plan over its result
    Mutation {
        side_effect: SideEffectFn,
        plan: PlanBuilder,
    },

    /// Synthesized runtime type name
    Typename,
}

impl fmt::Debug for FieldResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldResolver::Member(name) => write!(f, "Member({})", name),
            FieldResolver::Plan(_) => write!(f, "Plan"),
            FieldResolver::Computed(_) => write!(f, "Computed"),
            FieldResolver::Mutation { .. } => write!(f, "Mutation"),
            FieldResolver::Typename => write!(f, "Typename"),
        }
    }
}

/// Builder-side declaration of a field
///
/// # Example
///
/// ```rust,ignore
/// FieldDef::new("user", "User")
///     .argument("id", "Int!")
///     .plan(|_, args| {
///         Ok(Expr::collection("users")
///             .filter(Expr::row().member("id").equals(Expr::constant(args.value("id")))))
///     })
///     .first_or_default()
/// ```
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub(crate) name: String,
    pub(crate) target: String,
    pub(crate) arguments: ArgumentShape,
    pub(crate) resolver: Option<FieldResolver>,
    pub(crate) resolution: Option<ResolutionKind>,
    pub(crate) complexity: Option<Complexity>,
    pub(crate) store: Option<String>,
    pub(crate) description: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            arguments: ArgumentShape::new(),
            resolver: None,
            resolution: None,
            complexity: None,
            store: None,
            description: None,
        }
    }

    pub fn arguments(mut self, shape: ArgumentShape) -> Self {
        self.arguments = shape;
        self
    }

    pub fn argument(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.arguments = self.arguments.argument(name, ty);
        self
    }

    /// Resolve through a custom backend plan
    pub fn plan(
        mut self,
        builder: impl Fn(&PlanScope<'_>, &Arguments) -> Result<Expr> + Send + Sync + 'static,
    ) -> Self {
        self.resolver = Some(FieldResolver::Plan(Arc::new(builder)));
        self
    }

    /// Read a differently named member of the parent
    pub fn member(mut self, member: impl Into<String>) -> Self {
        self.resolver = Some(FieldResolver::Member(member.into()));
        self
    }

    pub fn resolution(mut self, kind: ResolutionKind) -> Self {
        self.resolution = Some(kind);
        self
    }

    pub fn first(self) -> Self {
        self.resolution(ResolutionKind::First)
    }

    pub fn first_or_default(self) -> Self {
        self.resolution(ResolutionKind::FirstOrDefault)
    }

    pub fn to_list(self) -> Self {
        self.resolution(ResolutionKind::ToList)
    }

    pub fn unmodified(self) -> Self {
        self.resolution(ResolutionKind::Unmodified)
    }

    pub fn complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = Some(complexity);
        self
    }

    /// Name of the store root plans of this field dispatch to
    pub fn store(mut self, store: impl Into<String>) -> Self {
        self.store = Some(store.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Declaration of a mutation field
///
/// The side effect runs to completion first; its result is then visible to the
/// read plan through [`PlanScope::mutation_result`].
#[derive(Clone)]
pub struct MutationDef {
    pub(crate) field: FieldDef,
    pub(crate) side_effect: SideEffectFn,
}

impl MutationDef {
    pub fn new<F>(name: impl Into<String>, target: impl Into<String>, side_effect: F) -> Self
    where
        F: Fn(Arguments) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static,
    {
        Self {
            field: FieldDef::new(name, target),
            side_effect: Arc::new(side_effect),
        }
    }

    pub fn argument(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.field = self.field.argument(name, ty);
        self
    }

    pub fn arguments(mut self, shape: ArgumentShape) -> Self {
        self.field = self.field.arguments(shape);
        self
    }

    /// Read plan built after the side effect completes
    pub fn plan(
        mut self,
        builder: impl Fn(&PlanScope<'_>, &Arguments) -> Result<Expr> + Send + Sync + 'static,
    ) -> Self {
        self.field = self.field.plan(builder);
        self
    }

    pub fn resolution(mut self, kind: ResolutionKind) -> Self {
        self.field = self.field.resolution(kind);
        self
    }

    pub fn complexity(mut self, complexity: Complexity) -> Self {
        self.field = self.field.complexity(complexity);
        self
    }

    pub fn store(mut self, store: impl Into<String>) -> Self {
        self.field = self.field.store(store);
        self
    }

    pub(crate) fn into_field(self) -> FieldDef {
        let (plan, resolution): (PlanBuilder, _) = match self.field.resolver.clone() {
            Some(FieldResolver::Plan(plan)) => (plan, self.field.resolution),
            // Without a read plan the side effect's result is the value
            _ => (
                Arc::new(|scope: &PlanScope<'_>, _: &Arguments| {
                    Ok(Expr::Const(
                        scope.mutation_result().cloned().unwrap_or(Value::Null),
                    ))
                }),
                Some(self.field.resolution.unwrap_or(ResolutionKind::Unmodified)),
            ),
        };
        FieldDef {
            resolver: Some(FieldResolver::Mutation {
                side_effect: self.side_effect,
                plan,
            }),
            resolution,
            ..self.field
        }
    }
}

/// A completed field
#[derive(Debug, Clone)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    pub declaring_type: TypeId,
    pub target_type: TypeId,
    pub cardinality: Cardinality,
    pub arguments: ArgumentShape,
    pub resolution: ResolutionKind,
    pub resolver: FieldResolver,
    pub complexity: Option<Complexity>,
    pub store: Option<String>,
    pub description: Option<String>,
}

impl Field {
    pub fn is_post(&self) -> bool {
        matches!(self.resolver, FieldResolver::Computed(_))
    }

    pub fn is_mutation(&self) -> bool {
        matches!(self.resolver, FieldResolver::Mutation { .. })
    }

    pub fn is_typename(&self) -> bool {
        matches!(self.resolver, FieldResolver::Typename)
    }

    pub fn is_list(&self) -> bool {
        self.cardinality == Cardinality::List
    }

    /// Instantiate the field's plan for one selection
    pub fn build_plan(&self, scope: &PlanScope<'_>, args: &Arguments) -> Result<Expr> {
        match &self.resolver {
            FieldResolver::Member(member) => Ok(scope.parent().member(member.as_str())),
            FieldResolver::Plan(builder) | FieldResolver::Mutation { plan: builder, .. } => {
                builder(scope, args)
            }
            FieldResolver::Computed(_) => bail!("post field '{}' has no backend plan", self.name),
            FieldResolver::Typename => {
                bail!("'{}' is resolved from the type's typename binding", self.name)
            }
        }
    }

    /// Invoke a post field's in-process function
    pub fn compute(&self, args: &Arguments) -> Result<Value> {
        match &self.resolver {
            FieldResolver::Computed(compute) => compute(args),
            _ => bail!("'{}' is not a post field", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_type_cardinality() {
        assert_eq!(
            OutputType::parse("[Order!]!").unwrap(),
            OutputType {
                name: "Order".to_string(),
                cardinality: Cardinality::List
            }
        );
        assert_eq!(
            OutputType::parse("User!").unwrap().cardinality,
            Cardinality::Single
        );
        assert!(OutputType::parse("[User").is_err());
    }

    #[test]
    fn test_plan_scope_exposes_parent_and_data() {
        let data: Box<dyn Any + Send + Sync> = Box::new(42_u32);
        let scope = PlanScope::new(Expr::Row.member("owner"), Some(data.as_ref()));

        assert_eq!(scope.context(), Expr::Context);
        assert_eq!(scope.parent(), Expr::Row.member("owner"));
        assert_eq!(scope.data::<u32>(), Some(&42));
        assert_eq!(scope.data::<String>(), None);
        assert!(scope.mutation_result().is_none());
    }

    #[test]
    fn test_mutation_without_plan_returns_side_effect_result() {
        let def = MutationDef::new("ping", "String", |_| Box::pin(async { Ok(json!("pong")) }))
            .into_field();

        assert_eq!(def.resolution, Some(ResolutionKind::Unmodified));
        let Some(FieldResolver::Mutation { plan, .. }) = &def.resolver else {
            panic!("expected mutation resolver");
        };
        let result = json!("pong");
        let scope = PlanScope::new(Expr::Context, None).with_mutation_result(&result);
        assert_eq!(
            plan(&scope, &Arguments::default()).unwrap(),
            Expr::Const(json!("pong"))
        );
    }
}
