//! Variable and argument translation
//!
//! Converts parsed argument literals and document variables into the
//! backend-native JSON values a field's plan builder consumes. Each input type
//! name maps to a [`ScalarRule`] that validates and translates raw values.

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use graphql_parser::query::Value as GqlValue;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::{ArgumentError, SchemaError};

type TranslateFn = dyn Fn(Value) -> Result<Value> + Send + Sync;

/// Validate/translate rule for one scalar or enum input type
#[derive(Clone)]
pub struct ScalarRule {
    translate: Arc<TranslateFn>,
    zero: Value,
    enum_values: Option<Vec<String>>,
}

impl fmt::Debug for ScalarRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarRule")
            .field("zero", &self.zero)
            .field("enum_values", &self.enum_values)
            .finish()
    }
}

impl ScalarRule {
    /// Custom rule with the value used when an optional argument is omitted
    pub fn new(
        zero: Value,
        translate: impl Fn(Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            translate: Arc::new(translate),
            zero,
            enum_values: None,
        }
    }

    pub fn int() -> Self {
        Self::new(json!(0), |value| match value.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => Ok(json!(i)),
            Some(i) => bail!("{} does not fit in a 32-bit Int", i),
            None => bail!("expected Int, found {}", value),
        })
    }

    pub fn float() -> Self {
        Self::new(json!(0.0), |value| match value.as_f64() {
            Some(f) => Ok(json!(f)),
            None => bail!("expected Float, found {}", value),
        })
    }

    pub fn string() -> Self {
        Self::new(json!(""), |value| match value {
            Value::String(_) => Ok(value),
            other => bail!("expected String, found {}", other),
        })
    }

    pub fn boolean() -> Self {
        Self::new(json!(false), |value| match value {
            Value::Bool(_) => Ok(value),
            other => bail!("expected Boolean, found {}", other),
        })
    }

    /// ID accepts strings and integers and always yields a string
    pub fn id() -> Self {
        Self::new(json!(""), |value| match value {
            Value::String(_) => Ok(value),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
            other => bail!("expected ID, found {}", other),
        })
    }

    /// UUID strings, normalized to lowercase hyphenated form
    pub fn uuid() -> Self {
        Self::new(Value::Null, |value| {
            let raw = value
                .as_str()
                .ok_or_else(|| anyhow!("expected UUID string, found {}", value))?;
            let parsed = Uuid::parse_str(raw)?;
            Ok(Value::String(parsed.hyphenated().to_string()))
        })
    }

    /// RFC 3339 timestamps, normalized to UTC
    pub fn date_time() -> Self {
        Self::new(Value::Null, |value| {
            let raw = value
                .as_str()
                .ok_or_else(|| anyhow!("expected DateTime string, found {}", value))?;
            let parsed = DateTime::parse_from_rfc3339(raw)?;
            Ok(Value::String(parsed.with_timezone(&Utc).to_rfc3339()))
        })
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let allowed = values.clone();
        let mut rule = Self::new(Value::Null, move |value| match value.as_str() {
            Some(s) if allowed.iter().any(|v| v == s) => Ok(value),
            _ => bail!("expected one of [{}], found {}", allowed.join(", "), value),
        });
        rule.enum_values = Some(values);
        rule
    }

    pub fn apply(&self, value: Value) -> Result<Value> {
        (self.translate)(value)
    }

    pub fn zero(&self) -> &Value {
        &self.zero
    }

    pub fn enum_values(&self) -> Option<&[String]> {
        self.enum_values.as_deref()
    }
}

/// Registry of input type rules, frozen into the schema at completion
#[derive(Debug, Clone)]
pub struct VariableTypes {
    rules: HashMap<String, ScalarRule>,
    frozen: bool,
}

impl Default for VariableTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableTypes {
    /// Registry pre-populated with the built-in scalars
    pub fn new() -> Self {
        let mut rules = HashMap::new();
        rules.insert("Int".to_string(), ScalarRule::int());
        rules.insert("Float".to_string(), ScalarRule::float());
        rules.insert("String".to_string(), ScalarRule::string());
        rules.insert("Boolean".to_string(), ScalarRule::boolean());
        rules.insert("ID".to_string(), ScalarRule::id());
        Self {
            rules,
            frozen: false,
        }
    }

    pub const BUILT_IN: [&'static str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

    pub fn register(&mut self, name: impl Into<String>, rule: ScalarRule) -> Result<(), SchemaError> {
        if self.frozen {
            return Err(SchemaError::AlreadyCompleted);
        }
        self.rules.insert(name.into(), rule);
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn get(&self, name: &str) -> Option<&ScalarRule> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Bind the arguments supplied on one selection against the field's shape
    pub fn translate(
        &self,
        field: &str,
        shape: &ArgumentShape,
        supplied: &[(String, GqlValue<'_, String>)],
        variables: &Map<String, Value>,
    ) -> Result<Arguments, ArgumentError> {
        for (name, _) in supplied {
            if shape.get(name).is_none() {
                return Err(ArgumentError::Unknown {
                    field: field.to_string(),
                    argument: name.clone(),
                });
            }
        }

        let mut arguments = Arguments::default();
        for spec in shape.iter() {
            let literal = supplied
                .iter()
                .find(|(name, _)| name == &spec.name)
                .map(|(_, value)| value);

            let raw = match literal {
                Some(GqlValue::Variable(var)) if !variables.contains_key(var) => None,
                Some(literal) => Some(literal_to_json(field, literal, variables)?),
                None => None,
            };

            let value = match raw {
                Some(raw) => {
                    arguments.supplied.insert(spec.name.clone());
                    self.coerce(field, &spec.name, &spec.ty, raw)?
                }
                None => match &spec.default {
                    Some(default) => self.coerce(field, &spec.name, &spec.ty, default.clone())?,
                    None if spec.ty.is_non_null() => {
                        return Err(match literal {
                            Some(GqlValue::Variable(var)) => ArgumentError::UndefinedVariable {
                                field: field.to_string(),
                                variable: var.clone(),
                            },
                            _ => ArgumentError::Missing {
                                field: field.to_string(),
                                argument: spec.name.clone(),
                            },
                        });
                    }
                    None => self.zero_value(field, &spec.name, &spec.ty)?,
                },
            };
            arguments.values.insert(spec.name.clone(), value);
        }

        Ok(arguments)
    }

    fn coerce(
        &self,
        field: &str,
        argument: &str,
        ty: &InputType,
        value: Value,
    ) -> Result<Value, ArgumentError> {
        let invalid = |message: String| ArgumentError::Invalid {
            field: field.to_string(),
            argument: argument.to_string(),
            message,
        };

        match ty {
            InputType::NonNull(inner) => {
                if value.is_null() {
                    Err(invalid(format!("null given for non-null type {}", ty)))
                } else {
                    self.coerce(field, argument, inner, value)
                }
            }
            InputType::List(inner) => match value {
                Value::Null => Ok(Value::Null),
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| self.coerce(field, argument, inner, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                single => Ok(Value::Array(vec![self.coerce(field, argument, inner, single)?])),
            },
            InputType::Named(name) => {
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let rule = self.rule(field, argument, name)?;
                rule.apply(value).map_err(|e| invalid(e.to_string()))
            }
        }
    }

    fn zero_value(&self, field: &str, argument: &str, ty: &InputType) -> Result<Value, ArgumentError> {
        match ty {
            InputType::NonNull(inner) => self.zero_value(field, argument, inner),
            InputType::List(_) => Ok(Value::Array(Vec::new())),
            InputType::Named(name) => Ok(self.rule(field, argument, name)?.zero().clone()),
        }
    }

    fn rule(&self, field: &str, argument: &str, name: &str) -> Result<&ScalarRule, ArgumentError> {
        self.rules.get(name).ok_or_else(|| ArgumentError::UnknownType {
            field: field.to_string(),
            argument: argument.to_string(),
            type_name: name.to_string(),
        })
    }
}

/// Convert a parsed literal to JSON, substituting variables
pub fn literal_to_json(
    field: &str,
    value: &GqlValue<'_, String>,
    variables: &Map<String, Value>,
) -> Result<Value, ArgumentError> {
    Ok(match value {
        GqlValue::Null => Value::Null,
        GqlValue::Int(i) => json!(i.as_i64().unwrap_or(0)),
        GqlValue::Float(f) => json!(f),
        GqlValue::String(s) => json!(s),
        GqlValue::Boolean(b) => json!(b),
        GqlValue::Enum(e) => json!(e),
        GqlValue::List(list) => Value::Array(
            list.iter()
                .map(|item| literal_to_json(field, item, variables))
                .collect::<Result<_, _>>()?,
        ),
        GqlValue::Object(obj) => {
            let mut map = Map::new();
            for (k, v) in obj {
                map.insert(k.clone(), literal_to_json(field, v, variables)?);
            }
            Value::Object(map)
        }
        GqlValue::Variable(name) => {
            variables
                .get(name)
                .cloned()
                .ok_or_else(|| ArgumentError::UndefinedVariable {
                    field: field.to_string(),
                    variable: name.clone(),
                })?
        }
    })
}

// =============================================================================
// Argument shapes
// =============================================================================

/// An input type reference such as `Int`, `[String!]` or `ID!`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputType {
    Named(String),
    List(Box<InputType>),
    NonNull(Box<InputType>),
}

impl InputType {
    /// Parse GraphQL type syntax
    pub fn parse(spec: &str) -> Result<Self, SchemaError> {
        let invalid = || SchemaError::InvalidName {
            name: spec.to_string(),
        };
        let trimmed = spec.trim();

        if let Some(inner) = trimmed.strip_suffix('!') {
            let inner = Self::parse(inner).map_err(|_| invalid())?;
            if matches!(inner, InputType::NonNull(_)) {
                return Err(invalid());
            }
            return Ok(InputType::NonNull(Box::new(inner)));
        }
        if let Some(inner) = trimmed.strip_prefix('[') {
            let inner = inner.strip_suffix(']').ok_or_else(invalid)?;
            let inner = Self::parse(inner).map_err(|_| invalid())?;
            return Ok(InputType::List(Box::new(inner)));
        }
        if crate::core::schema::is_valid_name(trimmed) {
            Ok(InputType::Named(trimmed.to_string()))
        } else {
            Err(invalid())
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, InputType::NonNull(_))
    }

    /// Innermost named type
    pub fn named(&self) -> &str {
        match self {
            InputType::Named(name) => name,
            InputType::List(inner) | InputType::NonNull(inner) => inner.named(),
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputType::Named(name) => write!(f, "{}", name),
            InputType::List(inner) => write!(f, "[{}]", inner),
            InputType::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

/// One declared argument
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentSpec {
    pub name: String,
    pub ty: InputType,
    pub default: Option<Value>,
}

/// Declared arguments of a field, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentShape {
    specs: Vec<ArgumentSpec>,
    pending: Vec<(String, String, Option<Value>)>,
}

impl ArgumentShape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an argument; `ty` uses GraphQL syntax (`"Int!"`, `"[String]"`)
    pub fn argument(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.pending.push((name.into(), ty.into(), None));
        self
    }

    pub fn argument_with_default(
        mut self,
        name: impl Into<String>,
        ty: impl Into<String>,
        default: Value,
    ) -> Self {
        self.pending.push((name.into(), ty.into(), Some(default)));
        self
    }

    /// Parse pending declarations; called when the owning field is added
    pub(crate) fn resolve(mut self) -> Result<Self, SchemaError> {
        for (name, ty, default) in std::mem::take(&mut self.pending) {
            if !crate::core::schema::is_valid_name(&name) {
                return Err(SchemaError::InvalidName { name });
            }
            if self.specs.iter().any(|s| s.name == name) {
                return Err(SchemaError::DuplicateField {
                    type_name: "argument list".to_string(),
                    field: name,
                });
            }
            let ty = InputType::parse(&ty)?;
            self.specs.push(ArgumentSpec { name, ty, default });
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ArgumentSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgumentSpec> {
        self.specs.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty() && self.pending.is_empty()
    }
}

/// Translated argument values for one selection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: IndexMap<String, Value>,
    supplied: HashSet<String>,
}

impl Arguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Whether the query gave this argument explicitly
    pub fn is_supplied(&self, name: &str) -> bool {
        self.supplied.contains(name)
    }

    /// Value of an argument for use in a plan; null when absent
    pub fn value(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Deserialize all arguments into a typed struct
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let map: Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::from_value(Value::Object(map))
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.supplied.insert(name.clone());
        self.values.insert(name, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
