//! Binding parsed selections against the completed schema

use graphql_parser::query::{Definition, Field, FragmentDefinition, Selection, TypeCondition};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::core::error::{DocumentError, EngineError};
use crate::core::schema::{FieldId, SchemaGraph, TypeId};
use crate::core::variables::Arguments;

/// A field selection resolved against the schema, built fresh per query
#[derive(Debug, Clone)]
pub struct ExecutionSelection {
    pub name: String,
    pub alias: Option<String>,
    pub field: FieldId,

    /// Set only when the selection sits in a fragment narrowing the parent type
    pub type_condition: Option<TypeId>,
    pub arguments: Arguments,
    pub children: Vec<ExecutionSelection>,
}

impl ExecutionSelection {
    /// Key of this selection in the response
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Resolves a document's selections into [`ExecutionSelection`] trees
///
/// Every lookup failure surfaces here, before any backend is contacted.
pub(crate) struct Binder<'a, 'q> {
    graph: &'a SchemaGraph,
    fragments: HashMap<&'a str, &'a FragmentDefinition<'q, String>>,
    variables: &'a Map<String, Value>,
    max_depth: Option<usize>,
}

impl<'a, 'q> Binder<'a, 'q> {
    pub fn new(
        graph: &'a SchemaGraph,
        definitions: &'a [Definition<'q, String>],
        variables: &'a Map<String, Value>,
        max_depth: Option<usize>,
    ) -> Self {
        let fragments = definitions
            .iter()
            .filter_map(|def| match def {
                Definition::Fragment(fragment) => Some((fragment.name.as_str(), fragment)),
                Definition::Operation(_) => None,
            })
            .collect();

        Self {
            graph,
            fragments,
            variables,
            max_depth,
        }
    }

    /// Bind a root selection set
    pub fn bind(
        &self,
        owner: TypeId,
        items: &'a [Selection<'q, String>],
    ) -> Result<Vec<ExecutionSelection>, EngineError> {
        let mut out = Vec::new();
        self.bind_set(owner, items, None, 1, &mut Vec::new(), &mut out)?;
        Ok(merge_repeated(out))
    }

    fn bind_set(
        &self,
        owner: TypeId,
        items: &'a [Selection<'q, String>],
        condition: Option<TypeId>,
        depth: usize,
        spreads: &mut Vec<&'a str>,
        out: &mut Vec<ExecutionSelection>,
    ) -> Result<(), EngineError> {
        for item in items {
            match item {
                Selection::Field(field) => {
                    out.push(self.bind_field(owner, field, condition, depth, spreads)?);
                }
                Selection::InlineFragment(fragment) => {
                    let narrowed = match &fragment.type_condition {
                        Some(TypeCondition::On(name)) => Some(self.condition_type(name)?),
                        None => condition,
                    };
                    self.bind_set(
                        owner,
                        &fragment.selection_set.items,
                        narrowed,
                        depth,
                        spreads,
                        out,
                    )?;
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    let fragment = self.fragments.get(name).copied().ok_or_else(|| {
                        DocumentError::UnknownFragment {
                            name: name.to_string(),
                        }
                    })?;
                    // A fragment spreading itself would never terminate
                    if spreads.contains(&name) {
                        continue;
                    }
                    let TypeCondition::On(type_name) = &fragment.type_condition;
                    let narrowed = Some(self.condition_type(type_name)?);

                    spreads.push(name);
                    self.bind_set(
                        owner,
                        &fragment.selection_set.items,
                        narrowed,
                        depth,
                        spreads,
                        out,
                    )?;
                    spreads.pop();
                }
            }
        }
        Ok(())
    }

    fn bind_field(
        &self,
        owner: TypeId,
        selected: &'a Field<'q, String>,
        condition: Option<TypeId>,
        depth: usize,
        spreads: &mut Vec<&'a str>,
    ) -> Result<ExecutionSelection, EngineError> {
        if let Some(max_depth) = self.max_depth {
            if depth > max_depth {
                return Err(DocumentError::TooDeep { max_depth }.into());
            }
        }

        // A condition naming the parent type itself does not narrow anything
        let condition = condition.filter(|c| *c != owner);
        let scope = condition.unwrap_or(owner);

        let not_found = |type_id: TypeId| EngineError::FieldNotFound {
            type_name: self.graph.schema_type(type_id).name.clone(),
            field: selected.name.clone(),
        };

        let field = self
            .graph
            .lookup_field(scope, &selected.name)
            .ok_or_else(|| not_found(scope))?;

        // The parent's projection must be able to carry the value
        if !field.is_post()
            && !field.is_typename()
            && self
                .graph
                .schema_type(owner)
                .projection
                .slot_for(field.id)
                .is_none()
        {
            return Err(not_found(owner));
        }

        let arguments = self.graph.variables().translate(
            &field.name,
            &field.arguments,
            &selected.arguments,
            self.variables,
        )?;

        let mut children = Vec::new();
        if !self.graph.schema_type(field.target_type).is_scalar() {
            self.bind_set(
                field.target_type,
                &selected.selection_set.items,
                None,
                depth + 1,
                spreads,
                &mut children,
            )?;
        }

        Ok(ExecutionSelection {
            name: selected.name.clone(),
            alias: selected.alias.clone(),
            field: field.id,
            type_condition: condition,
            arguments,
            children: merge_repeated(children),
        })
    }

    fn condition_type(&self, name: &str) -> Result<TypeId, EngineError> {
        self.graph
            .type_by_name(name)
            .map(|t| t.id)
            .ok_or_else(|| EngineError::TypeNotFound {
                type_name: name.to_string(),
            })
    }
}

/// Fold selections repeating an earlier response key into it
///
/// Overlapping fragments may select one field twice under the same key with
/// different children; the merged selection carries all of them.
fn merge_repeated(selections: Vec<ExecutionSelection>) -> Vec<ExecutionSelection> {
    let mut merged: Vec<ExecutionSelection> = Vec::with_capacity(selections.len());
    for selection in selections {
        let earlier = merged.iter_mut().find(|m| {
            m.field == selection.field
                && m.type_condition == selection.type_condition
                && m.output_name() == selection.output_name()
        });
        match earlier {
            Some(earlier) if !selection.children.is_empty() => {
                let mut children = std::mem::take(&mut earlier.children);
                children.extend(selection.children);
                earlier.children = merge_repeated(children);
            }
            Some(_) => {}
            None => merged.push(selection),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(name: &str, alias: Option<&str>, field: usize) -> ExecutionSelection {
        ExecutionSelection {
            name: name.to_string(),
            alias: alias.map(str::to_string),
            field: FieldId(field),
            type_condition: None,
            arguments: Arguments::default(),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_repeated_keys_merge_children() {
        let mut first = selection("bestFriend", Some("friend"), 1);
        first.children.push(selection("id", None, 2));
        let mut second = selection("bestFriend", Some("friend"), 1);
        second.children.push(selection("name", None, 3));
        second.children.push(selection("id", None, 2));

        let merged = merge_repeated(vec![first, second]);
        assert_eq!(merged.len(), 1);
        let children: Vec<&str> = merged[0].children.iter().map(|c| c.output_name()).collect();
        assert_eq!(children, vec!["id", "name"]);
    }

    #[test]
    fn test_distinct_aliases_stay_apart() {
        let merged = merge_repeated(vec![
            selection("bestFriend", Some("a"), 1),
            selection("bestFriend", Some("b"), 1),
            selection("bestFriend", Some("a"), 1),
        ]);
        let keys: Vec<&str> = merged.iter().map(|s| s.output_name()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
