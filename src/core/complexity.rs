//! Advisory complexity estimation

use crate::config::ComplexityConfig;
use crate::core::schema::{Complexity, Field, SchemaGraph};

impl Complexity {
    pub fn from_bounds(low: u64, high: u64) -> Self {
        match (low, high) {
            (0, 0) => Complexity::Zero,
            (1, 1) => Complexity::One,
            (low, high) => Complexity::Range { low, high },
        }
    }

    /// Inclusive `(low, high)` bounds
    pub fn bounds(self) -> (u64, u64) {
        match self {
            Complexity::Zero => (0, 0),
            Complexity::One => (1, 1),
            Complexity::Range { low, high } => (low, high),
        }
    }

    pub fn low(self) -> u64 {
        self.bounds().0
    }

    pub fn high(self) -> u64 {
        self.bounds().1
    }

    pub fn plus(self, other: Complexity) -> Complexity {
        let (a, b) = self.bounds();
        let (c, d) = other.bounds();
        Complexity::from_bounds(a.saturating_add(c), b.saturating_add(d))
    }

    pub fn times(self, other: Complexity) -> Complexity {
        let (a, b) = self.bounds();
        let (c, d) = other.bounds();
        Complexity::from_bounds(a.saturating_mul(c), b.saturating_mul(d))
    }
}

/// Cost of resolving `field` once
///
/// Explicit overrides win. Otherwise leaf fields are free, singular fields and
/// lists narrowed by an `id` argument cost one, and other lists cost the
/// configured range.
pub fn field_complexity(graph: &SchemaGraph, field: &Field, config: &ComplexityConfig) -> Complexity {
    if let Some(complexity) = field.complexity {
        return complexity;
    }
    if field.is_typename() || field.is_post() || graph.schema_type(field.target_type).is_scalar() {
        return Complexity::Zero;
    }
    list_multiplier(field, config)
}

/// How many rows a field is expected to yield
pub fn list_multiplier(field: &Field, config: &ComplexityConfig) -> Complexity {
    if field.is_list() && field.arguments.get("id").is_none() {
        Complexity::from_bounds(config.list_low, config.list_high)
    } else {
        Complexity::One
    }
}
