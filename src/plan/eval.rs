//! In-process plan evaluation
//!
//! Used by the in-memory store, by `Unmodified` fields (already-resolved values
//! that never reach a backend) and by the just-in-time projections of post fields.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::{CompareOp, Expr, SHAPE_KEY};
use crate::storage::StoreError;

/// Supplies named collections to an [`Evaluator`]
pub trait CollectionSource {
    fn collection(&self, name: &str) -> Result<Vec<Value>, StoreError>;
}

/// Values bound by `Expr::Let`, innermost first
struct Bindings<'b> {
    name: &'b str,
    value: &'b Value,
    outer: Option<&'b Bindings<'b>>,
}

/// Tree-walking evaluator over JSON values
pub struct Evaluator<'a> {
    source: Option<&'a dyn CollectionSource>,
    context: Value,
    name: &'static str,
}

impl<'a> Evaluator<'a> {
    /// Evaluator without any backing collections
    pub fn in_process() -> Self {
        Self {
            source: None,
            context: Value::Null,
            name: "in-process evaluator",
        }
    }

    pub fn with_source(source: &'a dyn CollectionSource, name: &'static str) -> Self {
        Self {
            source: Some(source),
            context: Value::Null,
            name,
        }
    }

    /// Value that `Expr::Context` evaluates to
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Evaluate a complete plan
    pub fn run(&self, expr: &Expr) -> Result<Value, StoreError> {
        self.eval(expr, &Value::Null)
    }

    pub fn eval(&self, expr: &Expr, row: &Value) -> Result<Value, StoreError> {
        self.eval_in(expr, row, None)
    }

    fn eval_in(
        &self,
        expr: &Expr,
        row: &Value,
        env: Option<&Bindings<'_>>,
    ) -> Result<Value, StoreError> {
        match expr {
            Expr::Context => Ok(self.context.clone()),
            Expr::Row => Ok(row.clone()),
            Expr::Const(value) => Ok(value.clone()),
            Expr::Null { .. } => Ok(Value::Null),
            Expr::Var(name) => {
                let mut frame = env;
                while let Some(binding) = frame {
                    if binding.name == name {
                        return Ok(binding.value.clone());
                    }
                    frame = binding.outer;
                }
                Err(StoreError::UnboundVariable(name.clone()))
            }
            Expr::Let { name, value, body } => {
                let value = self.eval_in(value, row, env)?;
                let frame = Bindings {
                    name,
                    value: &value,
                    outer: env,
                };
                self.eval_in(body, row, Some(&frame))
            }
            Expr::Collection { name } => match self.source {
                Some(source) => source.collection(name).map(Value::Array),
                None => Err(StoreError::Unsupported {
                    backend: self.name.to_string(),
                    node: format!("collection '{}'", name),
                }),
            },
            Expr::Member { target, name } => {
                let value = self.eval_in(target, row, env)?;
                Ok(match value {
                    Value::Object(mut map) => map.remove(name).unwrap_or(Value::Null),
                    _ => Value::Null,
                })
            }
            Expr::Compare { op, left, right } => {
                let left = self.eval_in(left, row, env)?;
                let right = self.eval_in(right, row, env)?;
                Ok(Value::Bool(compare(*op, &left, &right)))
            }
            Expr::And(terms) => {
                for term in terms {
                    if !truthy(&self.eval_in(term, row, env)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Or(terms) => {
                for term in terms {
                    if truthy(&self.eval_in(term, row, env)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&self.eval_in(inner, row, env)?))),
            Expr::IsNull(inner) => Ok(Value::Bool(self.eval_in(inner, row, env)?.is_null())),
            Expr::TypeIs { target, shapes } => {
                let value = self.eval_in(target, row, env)?;
                Ok(Value::Bool(has_shape(&value, shapes)))
            }
            Expr::Cast { target, shapes, .. } => {
                let value = self.eval_in(target, row, env)?;
                if has_shape(&value, shapes) {
                    Ok(value)
                } else {
                    Ok(Value::Null)
                }
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                if truthy(&self.eval_in(test, row, env)?) {
                    self.eval_in(then, row, env)
                } else {
                    self.eval_in(otherwise, row, env)
                }
            }
            Expr::NullGuard { value, body, .. } => {
                let value = self.eval_in(value, row, env)?;
                if value.is_null() {
                    Ok(Value::Null)
                } else {
                    self.eval_in(body, &value, env)
                }
            }
            Expr::Record { bindings, .. } => {
                let mut record = Map::with_capacity(bindings.len());
                for (key, binding) in bindings {
                    record.insert(key.clone(), self.eval_in(binding, row, env)?);
                }
                Ok(Value::Object(record))
            }
            Expr::Filter { source, predicate } => {
                self.map_sequence(env, "filter", source, row, |items| {
                    let mut kept = Vec::with_capacity(items.len());
                    for item in items {
                        if truthy(&self.eval_in(predicate, &item, env)?) {
                            kept.push(item);
                        }
                    }
                    Ok(kept)
                })
            }
            Expr::Project { source, body } => self.map_sequence(env, "project", source, row, |items| {
                items.iter().map(|item| self.eval_in(body, item, env)).collect()
            }),
            Expr::OrderBy {
                source,
                key,
                descending,
            } => self.map_sequence(env, "order_by", source, row, |items| {
                let mut keyed = Vec::with_capacity(items.len());
                for item in items {
                    keyed.push((self.eval_in(key, &item, env)?, item));
                }
                keyed.sort_by(|(a, _), (b, _)| {
                    let ordering = order(a, b);
                    if *descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                });
                Ok(keyed.into_iter().map(|(_, item)| item).collect())
            }),
            Expr::Skip { source, count } => self.map_sequence(env, "skip", source, row, |items| {
                Ok(items.into_iter().skip(*count).collect())
            }),
            Expr::Take { source, count } => self.map_sequence(env, "take", source, row, |items| {
                Ok(items.into_iter().take(*count).collect())
            }),
            Expr::ToList(source) => self.map_sequence(env, "to_list", source, row, Ok),
            Expr::First(source) | Expr::FirstOrDefault(source) => {
                match self.sequence(env, "first", source, row)? {
                    Some(items) => Ok(items.into_iter().next().unwrap_or(Value::Null)),
                    None => Ok(Value::Null),
                }
            }
        }
    }

    /// Evaluate `expr` as a sequence; `None` when it is null
    fn sequence(
        &self,
        env: Option<&Bindings<'_>>,
        op: &'static str,
        expr: &Expr,
        row: &Value,
    ) -> Result<Option<Vec<Value>>, StoreError> {
        match self.eval_in(expr, row, env)? {
            Value::Array(items) => Ok(Some(items)),
            Value::Null => Ok(None),
            other => Err(StoreError::NotASequence {
                op,
                found: kind_of(&other).to_string(),
            }),
        }
    }

    fn map_sequence(
        &self,
        env: Option<&Bindings<'_>>,
        op: &'static str,
        source: &Expr,
        row: &Value,
        f: impl FnOnce(Vec<Value>) -> Result<Vec<Value>, StoreError>,
    ) -> Result<Value, StoreError> {
        match self.sequence(env, op, source, row)? {
            Some(items) => f(items).map(Value::Array),
            None => Ok(Value::Null),
        }
    }
}

/// Runtime shape carried by a stored document, if any
pub fn shape_of(value: &Value) -> Option<&str> {
    value.get(SHAPE_KEY).and_then(Value::as_str)
}

fn has_shape(value: &Value, shapes: &[String]) -> bool {
    shape_of(value).is_some_and(|shape| shapes.iter().any(|s| s == shape))
}

fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    match op {
        CompareOp::Eq => loosely_equal(left, right),
        CompareOp::Ne => !loosely_equal(left, right),
        CompareOp::Lt => comparable(left, right) && order(left, right) == Ordering::Less,
        CompareOp::Le => comparable(left, right) && order(left, right) != Ordering::Greater,
        CompareOp::Gt => comparable(left, right) && order(left, right) == Ordering::Greater,
        CompareOp::Ge => comparable(left, right) && order(left, right) != Ordering::Less,
    }
}

// 1 and 1.0 compare equal
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn comparable(left: &Value, right: &Value) -> bool {
    matches!(
        (left, right),
        (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Bool(_), Value::Bool(_))
    )
}

/// Total order used by `OrderBy`; nulls sort first
fn order(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b))
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
