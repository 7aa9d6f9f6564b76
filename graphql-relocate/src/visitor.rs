//! Typed traversals of request documents and response data.
//!
//! Requests are rewritten bottom-up: a field's sub-selections are rewritten before the field
//! itself is offered to the [`RequestRewriter`], so rewriters always see rewritten children.
//! Response data is walked alongside the request that produced it, and [`ResponseRewriter`]
//! gets each object on leave, children first.

use std::collections::HashSet;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::schema::ExtendedType;
use indexmap::IndexMap;
use serde_json_bytes::Value;

use crate::error::TransformError;
use crate::graphql::Request;
use crate::json_ext::Object;
use crate::selection::FragmentMap;
use crate::selection::fragments;
use crate::selection::response_key;

const TYPENAME_FIELD: Name = apollo_compiler::name!("__typename");

pub(crate) trait RequestRewriter {
    /// The schema the rewritten document is typed against.
    fn schema(&self) -> &Schema;

    /// Rewrites one field selection of `parent_type`.
    ///
    /// Return `Ok(None)` to keep the field as it is. The returned selections replace the field
    /// in its parent selection set, in place.
    fn field(
        &mut self,
        parent_type: &str,
        field: &Node<ast::Field>,
        fragments: &FragmentMap,
    ) -> Result<Option<Vec<ast::Selection>>, TransformError>;
}

/// Rewrites every operation and fragment definition of a document.
///
/// Fragment definitions are rewritten first, in document order, so that operations see
/// rewritten fragments. Fragments that were used before the rewrite and are no longer used
/// after it are dropped.
pub(crate) fn rewrite_document(
    rewriter: &mut impl RequestRewriter,
    document: &ast::Document,
) -> Result<ast::Document, TransformError> {
    let original_fragments = fragments(document);
    let mut rewritten_fragments = original_fragments.clone();
    for fragment in original_fragments.values() {
        if let Some(selection_set) = selection_set(
            rewriter,
            &fragment.type_condition,
            &fragment.selection_set,
            &rewritten_fragments,
        )? {
            let mut fragment = fragment.clone();
            fragment.make_mut().selection_set = selection_set;
            rewritten_fragments.insert(fragment.name.clone(), fragment);
        }
    }

    let mut definitions = Vec::with_capacity(document.definitions.len());
    for definition in &document.definitions {
        definitions.push(match definition {
            ast::Definition::OperationDefinition(operation) => {
                let root_type = rewriter
                    .schema()
                    .root_operation(operation.operation_type)
                    .ok_or_else(|| TransformError::MissingRootOperation {
                        operation_type: operation_type_name(operation.operation_type).to_owned(),
                    })?
                    .clone();
                match selection_set(
                    rewriter,
                    &root_type,
                    &operation.selection_set,
                    &rewritten_fragments,
                )? {
                    Some(selection_set) => {
                        let mut operation = operation.clone();
                        operation.make_mut().selection_set = selection_set;
                        ast::Definition::OperationDefinition(operation)
                    }
                    None => definition.clone(),
                }
            }
            ast::Definition::FragmentDefinition(fragment) => rewritten_fragments
                .get(&fragment.name)
                .map(|fragment| ast::Definition::FragmentDefinition(fragment.clone()))
                .unwrap_or_else(|| definition.clone()),
            _ => definition.clone(),
        });
    }

    let used_before = used_fragments(&document.definitions, &original_fragments);
    let used_after = used_fragments(&definitions, &rewritten_fragments);
    definitions.retain(|definition| match definition {
        ast::Definition::FragmentDefinition(fragment) => {
            let dropped =
                used_before.contains(&fragment.name) && !used_after.contains(&fragment.name);
            if dropped {
                tracing::trace!(fragment = %fragment.name, "dropping unused fragment");
            }
            !dropped
        }
        _ => true,
    });

    let mut rewritten = document.clone();
    rewritten.definitions = definitions;
    Ok(rewritten)
}

fn operation_type_name(operation_type: ast::OperationType) -> &'static str {
    match operation_type {
        ast::OperationType::Query => "query",
        ast::OperationType::Mutation => "mutation",
        ast::OperationType::Subscription => "subscription",
    }
}

/// Rewrites a selection set. Returns `Ok(None)` when nothing in it changed.
fn selection_set(
    rewriter: &mut impl RequestRewriter,
    parent_type: &str,
    selections: &[ast::Selection],
    fragments: &FragmentMap,
) -> Result<Option<Vec<ast::Selection>>, TransformError> {
    let mut rewritten: Option<Vec<ast::Selection>> = None;
    for (index, selection) in selections.iter().enumerate() {
        let replacement = match selection {
            ast::Selection::Field(field) => {
                field_selection(rewriter, parent_type, field, fragments)?
            }
            ast::Selection::InlineFragment(inline_fragment) => {
                let fragment_type = inline_fragment
                    .type_condition
                    .as_deref()
                    .unwrap_or(parent_type);
                selection_set(
                    rewriter,
                    fragment_type,
                    &inline_fragment.selection_set,
                    fragments,
                )?
                .map(|selection_set| {
                    let mut inline_fragment = inline_fragment.clone();
                    inline_fragment.make_mut().selection_set = selection_set;
                    vec![ast::Selection::InlineFragment(inline_fragment)]
                })
            }
            ast::Selection::FragmentSpread(_) => None,
        };
        match replacement {
            Some(replacement) => rewritten
                .get_or_insert_with(|| selections[..index].to_vec())
                .extend(replacement),
            None => {
                if let Some(rewritten) = &mut rewritten {
                    rewritten.push(selection.clone());
                }
            }
        }
    }
    Ok(rewritten)
}

fn field_selection(
    rewriter: &mut impl RequestRewriter,
    parent_type: &str,
    field: &Node<ast::Field>,
    fragments: &FragmentMap,
) -> Result<Option<Vec<ast::Selection>>, TransformError> {
    let field_type = match rewriter.schema().type_field(parent_type, &field.name) {
        Ok(definition) => definition.ty.inner_named_type().clone(),
        // fields unknown to the schema are not ours to rewrite
        Err(_) => return Ok(None),
    };

    let children = selection_set(rewriter, &field_type, &field.selection_set, fragments)?;
    let field = match &children {
        Some(selection_set) => {
            let mut field = field.clone();
            field.make_mut().selection_set = selection_set.clone();
            field
        }
        None => field.clone(),
    };

    match rewriter.field(parent_type, &field, fragments)? {
        Some(replacement) => Ok(Some(replacement)),
        None if children.is_some() => Ok(Some(vec![ast::Selection::Field(field)])),
        None => Ok(None),
    }
}

/// The fragments reachable from the operations among `definitions`.
fn used_fragments(definitions: &[ast::Definition], fragments: &FragmentMap) -> HashSet<Name> {
    let mut used = HashSet::new();
    for definition in definitions {
        if let ast::Definition::OperationDefinition(operation) = definition {
            spread_fragments(&operation.selection_set, fragments, &mut used);
        }
    }
    used
}

fn spread_fragments(
    selections: &[ast::Selection],
    fragments: &FragmentMap,
    used: &mut HashSet<Name>,
) {
    for selection in selections {
        match selection {
            ast::Selection::Field(field) => {
                spread_fragments(&field.selection_set, fragments, used)
            }
            ast::Selection::InlineFragment(inline_fragment) => {
                spread_fragments(&inline_fragment.selection_set, fragments, used)
            }
            ast::Selection::FragmentSpread(spread) => {
                if used.insert(spread.fragment_name.clone()) {
                    if let Some(fragment) = fragments.get(&spread.fragment_name) {
                        spread_fragments(&fragment.selection_set, fragments, used);
                    }
                }
            }
        }
    }
}

/// Selects `__typename` in every selection set typed by an interface or a union that does
/// not select it already, so that response objects at abstract positions can be typed.
///
/// Returns `None` when the document needs no change.
pub(crate) fn add_typename_to_abstract_types(
    schema: &Schema,
    document: &ast::Document,
) -> Option<ast::Document> {
    let mut changed = false;
    let definitions = document
        .definitions
        .iter()
        .map(|definition| match definition {
            ast::Definition::OperationDefinition(operation) => {
                let rewritten = schema
                    .root_operation(operation.operation_type)
                    .and_then(|root_type| {
                        typename_selection_set(schema, root_type, &operation.selection_set)
                    });
                match rewritten {
                    Some(selection_set) => {
                        changed = true;
                        let mut operation = operation.clone();
                        operation.make_mut().selection_set = selection_set;
                        ast::Definition::OperationDefinition(operation)
                    }
                    None => definition.clone(),
                }
            }
            ast::Definition::FragmentDefinition(fragment) => {
                match typename_selection_set(
                    schema,
                    &fragment.type_condition,
                    &fragment.selection_set,
                ) {
                    Some(selection_set) => {
                        changed = true;
                        let mut fragment = fragment.clone();
                        fragment.make_mut().selection_set = selection_set;
                        ast::Definition::FragmentDefinition(fragment)
                    }
                    None => definition.clone(),
                }
            }
            _ => definition.clone(),
        })
        .collect::<Vec<_>>();

    changed.then(|| {
        let mut rewritten = document.clone();
        rewritten.definitions = definitions;
        rewritten
    })
}

fn typename_selection_set(
    schema: &Schema,
    parent_type: &str,
    selections: &[ast::Selection],
) -> Option<Vec<ast::Selection>> {
    let mut rewritten: Option<Vec<ast::Selection>> = None;
    if !selections.is_empty()
        && is_abstract(schema, parent_type)
        && !selections.iter().any(|selection| {
            matches!(
                selection,
                ast::Selection::Field(field) if response_key(field).as_str() == TYPENAME_FIELD.as_str()
            )
        })
    {
        rewritten = Some(vec![ast::Selection::Field(Node::new(ast::Field {
            alias: None,
            name: TYPENAME_FIELD,
            arguments: Vec::new(),
            directives: Default::default(),
            selection_set: Vec::new(),
        }))]);
    }

    for (index, selection) in selections.iter().enumerate() {
        let replacement = match selection {
            ast::Selection::Field(field) => schema
                .type_field(parent_type, &field.name)
                .ok()
                .and_then(|definition| {
                    typename_selection_set(
                        schema,
                        definition.ty.inner_named_type(),
                        &field.selection_set,
                    )
                })
                .map(|selection_set| {
                    let mut field = field.clone();
                    field.make_mut().selection_set = selection_set;
                    ast::Selection::Field(field)
                }),
            ast::Selection::InlineFragment(inline_fragment) => typename_selection_set(
                schema,
                inline_fragment
                    .type_condition
                    .as_deref()
                    .unwrap_or(parent_type),
                &inline_fragment.selection_set,
            )
            .map(|selection_set| {
                let mut inline_fragment = inline_fragment.clone();
                inline_fragment.make_mut().selection_set = selection_set;
                ast::Selection::InlineFragment(inline_fragment)
            }),
            ast::Selection::FragmentSpread(_) => None,
        };
        match (replacement, &mut rewritten) {
            (Some(replacement), rewritten) => rewritten
                .get_or_insert_with(|| selections[..index].to_vec())
                .push(replacement),
            (None, Some(rewritten)) => rewritten.push(selection.clone()),
            (None, None) => {}
        }
    }
    rewritten
}

fn is_abstract(schema: &Schema, type_name: &str) -> bool {
    matches!(
        schema.types.get(type_name),
        Some(ExtendedType::Interface(_) | ExtendedType::Union(_))
    )
}

pub(crate) trait ResponseRewriter {
    /// The schema the delegated request was typed against.
    fn schema(&self) -> &Schema;

    /// Rewrites an object value of type `type_name`, after its fields were visited.
    fn leave_object(&self, type_name: &str, value: Value) -> Value;
}

/// Walks response data alongside the request that produced it.
///
/// Without a request, only the root object is offered to the rewriter, as the query root
/// type.
pub(crate) fn rewrite_data(
    rewriter: &impl ResponseRewriter,
    request: Option<&Request>,
    data: Value,
) -> Value {
    let schema = rewriter.schema();
    let Some(request) = request else {
        return match schema.root_operation(ast::OperationType::Query) {
            Some(root_type) if data.is_object() => rewriter.leave_object(root_type, data),
            _ => data,
        };
    };
    let Some(operation) = request.operation() else {
        return data;
    };
    let Some(root_type) = schema.root_operation(operation.operation_type) else {
        tracing::warn!(
            "The schema does not define a root {} type.",
            operation_type_name(operation.operation_type)
        );
        return data;
    };

    let fragments = fragments(&request.document);
    let visitor = DataVisitor {
        rewriter,
        schema,
        fragments: &fragments,
    };
    visitor.value(root_type, &operation.selection_set, data)
}

struct DataVisitor<'a, R> {
    rewriter: &'a R,
    schema: &'a Schema,
    fragments: &'a FragmentMap,
}

impl<R: ResponseRewriter> DataVisitor<'_, R> {
    fn value(&self, ty: &str, selections: &[ast::Selection], value: Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.value(ty, selections, item))
                    .collect(),
            ),
            Value::Object(object) => {
                let concrete_type = match object.get(TYPENAME_FIELD.as_str()) {
                    Some(Value::String(typename))
                        if self.schema.types.contains_key(typename.as_str()) =>
                    {
                        typename.as_str().to_owned()
                    }
                    _ => ty.to_owned(),
                };
                let object = self.object(&concrete_type, selections, object);
                self.rewriter
                    .leave_object(&concrete_type, Value::Object(object))
            }
            value => value,
        }
    }

    fn object(&self, ty: &str, selections: &[ast::Selection], mut object: Object) -> Object {
        // fields sharing a response key have their sub-selections merged
        let mut grouped: IndexMap<Name, (Name, Vec<ast::Selection>)> = IndexMap::new();
        let mut fields = Vec::new();
        self.applicable_fields(ty, selections, &mut fields, &mut HashSet::new());
        for field in fields {
            let Ok(definition) = self.schema.type_field(ty, &field.name) else {
                continue;
            };
            let (_, sub_selections) = grouped
                .entry(response_key(&field).clone())
                .or_insert_with(|| (definition.ty.inner_named_type().clone(), Vec::new()));
            sub_selections.extend(field.selection_set.iter().cloned());
        }

        for (key, (field_type, sub_selections)) in grouped {
            if sub_selections.is_empty() {
                continue;
            }
            if let Some(slot) = object.get_mut(key.as_str()) {
                let value = std::mem::replace(slot, Value::Null);
                *slot = self.value(&field_type, &sub_selections, value);
            }
        }
        object
    }

    /// Collects the fields of `selections` that apply to an object of type `ty`: fragments
    /// whose type condition `ty` does not satisfy are skipped.
    fn applicable_fields<'s>(
        &'s self,
        ty: &str,
        selections: &'s [ast::Selection],
        fields: &mut Vec<&'s Node<ast::Field>>,
        visited_fragments: &mut HashSet<&'s Name>,
    ) {
        for selection in selections {
            match selection {
                ast::Selection::Field(field) => fields.push(field),
                ast::Selection::InlineFragment(inline_fragment) => {
                    let applies = inline_fragment
                        .type_condition
                        .as_ref()
                        .is_none_or(|condition| self.applies(condition, ty));
                    if applies {
                        self.applicable_fields(
                            ty,
                            &inline_fragment.selection_set,
                            fields,
                            visited_fragments,
                        );
                    }
                }
                ast::Selection::FragmentSpread(spread) => {
                    if !visited_fragments.insert(&spread.fragment_name) {
                        continue;
                    }
                    if let Some(fragment) = self.fragments.get(&spread.fragment_name) {
                        if self.applies(&fragment.type_condition, ty) {
                            self.applicable_fields(
                                ty,
                                &fragment.selection_set,
                                fields,
                                visited_fragments,
                            );
                        }
                    }
                }
            }
        }
    }

    /// Whether an object typed `ty` satisfies the type condition `condition`. Objects whose
    /// concrete type is unknown satisfy every condition.
    fn applies(&self, condition: &str, ty: &str) -> bool {
        condition == ty || self.schema.is_subtype(condition, ty) || is_abstract(self.schema, ty)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::selection::collect_fields;

    const SDL: &str = r#"
        type Query { a: A list: [A] node: Node }
        type A { b: Int c: A }
        interface Node { id: ID }
        type Thing implements Node { id: ID name: String inner: A }
        type Other implements Node { id: ID inner: Thing }
    "#;

    fn schema() -> Schema {
        Schema::parse(SDL, "schema.graphql").unwrap()
    }

    fn normalize(source: &str) -> String {
        ast::Document::parse(source, "expected.graphql")
            .unwrap()
            .to_string()
    }

    /// Renames every `A.b` selection to `renamed: b`, and records where it was called.
    struct AliasB {
        schema: Schema,
        calls: Vec<String>,
    }

    impl RequestRewriter for AliasB {
        fn schema(&self) -> &Schema {
            &self.schema
        }

        fn field(
            &mut self,
            parent_type: &str,
            field: &Node<ast::Field>,
            _fragments: &FragmentMap,
        ) -> Result<Option<Vec<ast::Selection>>, TransformError> {
            self.calls.push(format!("{parent_type}.{}", field.name));
            if parent_type != "A" || field.name.as_str() != "b" {
                return Ok(None);
            }
            let mut field = field.clone();
            field.make_mut().alias = Some(apollo_compiler::name!("renamed"));
            Ok(Some(vec![ast::Selection::Field(field)]))
        }
    }

    fn rewrite(source: &str) -> (String, Vec<String>, ast::Document) {
        let document = ast::Document::parse(source, "request.graphql").unwrap();
        let mut rewriter = AliasB {
            schema: schema(),
            calls: Vec::new(),
        };
        let rewritten = rewrite_document(&mut rewriter, &document).unwrap();
        (rewritten.to_string(), rewriter.calls, document)
    }

    #[test]
    fn rewrites_bottom_up() {
        let (rewritten, calls, _) = rewrite("{ a { c { b } } other }");
        assert_eq!(rewritten, normalize("{ a { c { renamed: b } } other }"));
        // children are offered before their parents, unknown fields never are
        assert_eq!(calls, ["A.b", "A.c", "Query.a"]);
    }

    #[test]
    fn rewrites_fragments_and_inline_fragments() {
        let (rewritten, _, _) = rewrite(
            r#"
            { node { ... on Thing { inner { b } } } ...F }
            fragment F on Query { list { b } }
            "#,
        );
        assert_eq!(
            rewritten,
            normalize(
                r#"
                { node { ... on Thing { inner { renamed: b } } } ...F }
                fragment F on Query { list { renamed: b } }
                "#
            )
        );
    }

    #[test]
    fn untouched_documents_share_their_nodes() {
        let (rewritten, _, document) =
            rewrite("query Q { node { id } } fragment Unused on Thing { name inner { c } }");
        assert_eq!(rewritten, document.to_string());
    }

    #[test]
    fn drops_fragments_that_became_unused() {
        struct InlineSpreads(Schema);

        impl RequestRewriter for InlineSpreads {
            fn schema(&self) -> &Schema {
                &self.0
            }

            fn field(
                &mut self,
                _parent_type: &str,
                field: &Node<ast::Field>,
                fragments: &FragmentMap,
            ) -> Result<Option<Vec<ast::Selection>>, TransformError> {
                if field.name.as_str() != "a" {
                    return Ok(None);
                }
                let selection_set = collect_fields(&field.selection_set, fragments)
                    .into_iter()
                    .map(ast::Selection::Field)
                    .collect();
                let mut field = field.clone();
                field.make_mut().selection_set = selection_set;
                Ok(Some(vec![ast::Selection::Field(field)]))
            }
        }

        let document = ast::Document::parse(
            "{ a { ...F } } fragment F on A { b } fragment Kept on A { c { b } }",
            "request.graphql",
        )
        .unwrap();
        let rewritten = rewrite_document(&mut InlineSpreads(schema()), &document).unwrap();
        assert_eq!(
            rewritten.to_string(),
            normalize("{ a { b } } fragment Kept on A { c { b } }")
        );
    }

    #[test]
    fn adds_typename_to_abstract_selection_sets() {
        let document = ast::Document::parse(
            r#"
            { a { b } node { id ...F ... on Thing { inner { b } } } }
            fragment F on Node { id }
            "#,
            "request.graphql",
        )
        .unwrap();
        let rewritten = add_typename_to_abstract_types(&schema(), &document).unwrap();
        assert_eq!(
            rewritten.to_string(),
            normalize(
                r#"
                { a { b } node { __typename id ...F ... on Thing { inner { b } } } }
                fragment F on Node { __typename id }
                "#
            )
        );

        let typed = ast::Document::parse("{ a { b } node { __typename id } }", "request.graphql")
            .unwrap();
        assert!(add_typename_to_abstract_types(&schema(), &typed).is_none());
    }

    #[test]
    fn skips_fragments_of_other_types() {
        let rewriter = RecordLeaves {
            schema: schema(),
            visited: RefCell::new(Vec::new()),
        };
        let request = Request::parse(
            "{ node { __typename ... on Other { inner { name } } ...F } } fragment F on Other { id }",
        )
        .unwrap();
        let data = json!({ "node": { "__typename": "Thing", "inner": { "b": 1 } } });
        rewrite_data(&rewriter, Some(&request), data);
        // `inner` is only selected on `Other`
        assert_eq!(rewriter.visited.into_inner(), ["Thing", "Query"]);
    }

    struct RecordLeaves {
        schema: Schema,
        visited: RefCell<Vec<String>>,
    }

    impl ResponseRewriter for RecordLeaves {
        fn schema(&self) -> &Schema {
            &self.schema
        }

        fn leave_object(&self, type_name: &str, mut value: Value) -> Value {
            self.visited.borrow_mut().push(type_name.to_owned());
            if let Value::Object(object) = &mut value {
                object.insert("__visited", Value::String(type_name.into()));
            }
            value
        }
    }

    #[test]
    fn visits_data_on_leave() {
        let rewriter = RecordLeaves {
            schema: schema(),
            visited: RefCell::new(Vec::new()),
        };
        let request = Request::parse(
            "{ a { c { b } } list { b } node { __typename ... on Thing { inner { b } } } }",
        )
        .unwrap();
        let data = json!({
            "a": { "c": null },
            "list": [{ "b": 1 }, null],
            "node": { "__typename": "Thing", "inner": { "b": 2 } },
        });
        let data = rewrite_data(&rewriter, Some(&request), data);
        assert_eq!(
            rewriter.visited.into_inner(),
            ["A", "A", "A", "Thing", "Query"]
        );
        assert_eq!(
            data,
            json!({
                "a": { "c": null, "__visited": "A" },
                "list": [{ "b": 1, "__visited": "A" }, null],
                "node": {
                    "__typename": "Thing",
                    "inner": { "b": 2, "__visited": "A" },
                    "__visited": "Thing",
                },
                "__visited": "Query",
            })
        );
    }

    #[test]
    fn visits_only_the_root_without_a_request() {
        let rewriter = RecordLeaves {
            schema: schema(),
            visited: RefCell::new(Vec::new()),
        };
        let data = rewrite_data(&rewriter, None, json!({ "a": { "b": 1 } }));
        assert_eq!(rewriter.visited.into_inner(), ["Query"]);
        assert_eq!(data, json!({ "a": { "b": 1 }, "__visited": "Query" }));
    }
}
