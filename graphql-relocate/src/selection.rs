//! Field-level helpers over `apollo_compiler::ast` selection sets.
//!
//! Every helper here returns new nodes and leaves its input untouched. Because [`Node`] is
//! reference counted, sub-selections that are not rewritten stay shared between the input
//! and the output trees.

use std::collections::HashSet;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use indexmap::IndexMap;

use crate::error::TransformError;

/// Named fragment definitions visible to a request, keyed by fragment name.
pub type FragmentMap = IndexMap<Name, Node<ast::FragmentDefinition>>;

/// Collects the fragment definitions of a document.
pub fn fragments(document: &ast::Document) -> FragmentMap {
    document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            ast::Definition::FragmentDefinition(fragment) => {
                Some((fragment.name.clone(), fragment.clone()))
            }
            _ => None,
        })
        .collect()
}

/// The key under which a field's value appears in the response.
pub fn response_key(field: &ast::Field) -> &Name {
    field.alias.as_ref().unwrap_or(&field.name)
}

/// Flattens a selection set into the field selections it denotes, in document order.
///
/// Inline fragments and fragment spreads are expanded in place. A named fragment is expanded
/// at most once per call, which also guards against fragment cycles. Fields are not merged:
/// two selections of the same field are both returned.
pub fn collect_fields(
    selection_set: &[ast::Selection],
    fragments: &FragmentMap,
) -> Vec<Node<ast::Field>> {
    let mut fields = Vec::new();
    let mut visited_fragments = HashSet::new();
    collect_fields_into(selection_set, fragments, &mut fields, &mut visited_fragments);
    fields
}

fn collect_fields_into<'a>(
    selection_set: &'a [ast::Selection],
    fragments: &'a FragmentMap,
    fields: &mut Vec<Node<ast::Field>>,
    visited_fragments: &mut HashSet<&'a Name>,
) {
    for selection in selection_set {
        match selection {
            ast::Selection::Field(field) => fields.push(field.clone()),
            ast::Selection::InlineFragment(inline_fragment) => collect_fields_into(
                &inline_fragment.selection_set,
                fragments,
                fields,
                visited_fragments,
            ),
            ast::Selection::FragmentSpread(spread) => {
                if !visited_fragments.insert(&spread.fragment_name) {
                    continue;
                }
                match fragments.get(&spread.fragment_name) {
                    Some(fragment) => collect_fields_into(
                        &fragment.selection_set,
                        fragments,
                        fields,
                        visited_fragments,
                    ),
                    None => tracing::warn!(
                        "The fragment {} was not found in the query document.",
                        spread.fragment_name
                    ),
                }
            }
        }
    }
}

/// Selects `new_name` instead of the field's current name, under the same response key.
pub fn rename_field(field: &Node<ast::Field>, new_name: Name) -> Node<ast::Field> {
    let mut renamed = field.clone();
    let alias = response_key(field).clone();
    let renamed_mut = renamed.make_mut();
    renamed_mut.alias = Some(alias);
    renamed_mut.name = new_name;
    renamed
}

/// Prepends `prefix` to the field's response key.
pub fn prefix_alias(
    field: &Node<ast::Field>,
    prefix: &str,
) -> Result<Node<ast::Field>, TransformError> {
    let alias = Name::new(&format!("{prefix}{}", response_key(field)))?;
    let mut prefixed = field.clone();
    prefixed.make_mut().alias = Some(alias);
    Ok(prefixed)
}

/// Nests `field` under a chain of synthetic fields, `path[0]` outermost.
pub fn wrap_field(field: Node<ast::Field>, path: &[Name]) -> Node<ast::Field> {
    path.iter().rev().fold(field, |inner, name| {
        Node::new(ast::Field {
            alias: None,
            name: name.clone(),
            arguments: Vec::new(),
            directives: Default::default(),
            selection_set: vec![ast::Selection::Field(inner)],
        })
    })
}
