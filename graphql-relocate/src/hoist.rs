//! Reversible flattening of nested selections into delimiter-encoded aliases.
//!
//! [`hoist_fields`] lifts fields found at the end of a path of nested selections so that they
//! become siblings of the field the path starts from. Each lifted field is aliased with the
//! chain of response keys it was nested under, joined with a delimiter:
//!
//! ```graphql
//! # before
//! { w1 { w2 { x y: z } } }
//! # after hoisting `w1` along `["w2"]`
//! { w1__gqltf__w2__gqltf__x: x w1__gqltf__w2__gqltf__y: z }
//! ```
//!
//! [`dehoist_value`] and [`dehoist_errors`] reverse that encoding on the response side. The
//! encoding is only injective as long as no response key contains the delimiter.

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;

use crate::error::TransformError;
use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::selection::FragmentMap;
use crate::selection::collect_fields;
use crate::selection::prefix_alias;
use crate::selection::response_key;

/// The delimiter used to join response keys into a single alias.
pub const DEFAULT_DELIMITER: &str = "__gqltf__";

/// Lifts the fields nested along `path` under `field` so they can replace `field` in its
/// parent selection set.
///
/// `path` is matched against field names (not aliases). When `field_names` is given, only the
/// fields with those names are kept at the end of the path. A path segment that matches no
/// selection yields no fields for that branch.
pub fn hoist_fields(
    field: &Node<ast::Field>,
    field_names: Option<&[Name]>,
    path: &[Name],
    delimiter: &str,
    fragments: &FragmentMap,
) -> Result<Vec<Node<ast::Field>>, TransformError> {
    let prefix = format!("{}{delimiter}", response_key(field));
    let candidates = collect_fields(&field.selection_set, fragments);

    match path.split_first() {
        Some((segment, remaining)) => {
            let mut hoisted = Vec::new();
            for candidate in candidates.iter().filter(|c| &c.name == segment) {
                hoisted.extend(hoist_fields(
                    &prefix_alias(candidate, &prefix)?,
                    field_names,
                    remaining,
                    delimiter,
                    fragments,
                )?);
            }
            Ok(hoisted)
        }
        None => candidates
            .iter()
            .filter(|candidate| field_names.is_none_or(|names| names.contains(&candidate.name)))
            .map(|candidate| prefix_alias(candidate, &prefix))
            .collect(),
    }
}

/// Rebuilds the nested shape of an object whose keys were produced by [`hoist_fields`].
///
/// Keys without the delimiter are kept as they are. `null` and non-object values are returned
/// unchanged.
pub fn dehoist_value(value: Value, delimiter: &str) -> Value {
    let Value::Object(flat) = value else {
        return value;
    };

    let mut nested = Object::new();
    for (alias, value) in flat {
        let mut segments = alias.as_str().split(delimiter).collect::<Vec<_>>();
        // `split` always yields at least one segment
        let leaf = segments.pop().unwrap_or_default();
        let mut object = &mut nested;
        for segment in segments {
            let entry = object
                .entry(segment)
                .or_insert(Value::Object(Object::new()));
            if !entry.is_object() {
                *entry = Value::Object(Object::new());
            }
            let Value::Object(inner) = entry else {
                unreachable!("entry was just made an object")
            };
            object = inner;
        }
        object.insert(ByteString::from(leaf), value);
    }
    Value::Object(nested)
}

/// Rewrites error paths that go through delimiter-encoded aliases so that they point into the
/// dehoisted shape.
///
/// Only key segments are split; list indices are kept as they are. Errors without a path are
/// passed through.
pub fn dehoist_errors(errors: Vec<Error>, delimiter: &str) -> Vec<Error> {
    errors
        .into_iter()
        .map(|error| {
            let Some(path) = &error.path else {
                return error;
            };
            if path.is_empty() {
                return error;
            }
            let path = path
                .iter()
                .flat_map(|element| match element {
                    PathElement::Key(key) => key
                        .split(delimiter)
                        .map(|segment| PathElement::Key(segment.to_owned()))
                        .collect::<Vec<_>>(),
                    PathElement::Index(_) => vec![element.clone()],
                })
                .collect::<Path>();
            error.relocated(Some(path))
        })
        .collect()
}

/// Collapses the object found at the end of `path` into `value`.
///
/// The key of the first path segment is removed from `value`. When every segment of `path`
/// resolves to a non-null value and the last one is an object, its entries are merged into
/// `value`, replacing existing entries with the same key. When the path stops early on a
/// `null` or missing value, nothing is merged, so the relocated fields read as `null`.
pub fn unwrap_value(value: Value, path: &[Name]) -> Value {
    let Some(first) = path.first() else {
        return value;
    };
    let Value::Object(mut object) = value else {
        return value;
    };

    let Some(reached) = object.remove(first.as_str()) else {
        return Value::Object(object);
    };
    let reached = path[1..].iter().try_fold(reached, |current, segment| match current {
        Value::Object(mut inner) => inner.remove(segment.as_str()).filter(|v| !v.is_null()),
        _ => None,
    });

    if let Some(Value::Object(entries)) = reached {
        for (key, entry) in entries {
            if object.contains_key(key.as_str()) {
                tracing::trace!(key = key.as_str(), "unwrapped value replaces an existing key");
            }
            object.insert(key, entry);
        }
    }
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::path;
    use crate::selection::fragments;

    fn hoist(source: &str, path: &[Name], field_names: Option<&[Name]>) -> Vec<String> {
        let document = ast::Document::parse(source, "test.graphql").unwrap();
        let fragments = fragments(&document);
        let ast::Definition::OperationDefinition(operation) = &document.definitions[0] else {
            panic!("expected an operation first")
        };
        let ast::Selection::Field(field) = &operation.selection_set[0] else {
            panic!("expected a field first")
        };
        hoist_fields(field, field_names, path, DEFAULT_DELIMITER, &fragments)
            .unwrap()
            .iter()
            .map(|field| format!("{}: {}", response_key(field), field.name))
            .collect()
    }

    #[test]
    fn hoists_along_a_path() {
        assert_eq!(
            hoist("{ w1 { w2 { x y: z } } }", &[name!("w2")], None),
            [
                "w1__gqltf__w2__gqltf__x: x",
                "w1__gqltf__w2__gqltf__y: z"
            ]
        );
    }

    #[test]
    fn base_case_filters_field_names() {
        assert_eq!(
            hoist("{ w { x y z } }", &[], Some(&[name!("x"), name!("z")])),
            ["w__gqltf__x: x", "w__gqltf__z: z"]
        );
    }

    #[test]
    fn path_segments_are_encoded_with_their_aliases() {
        assert_eq!(
            hoist("{ w: w1 { v: w2 { x } } }", &[name!("w2")], None),
            ["w__gqltf__v__gqltf__x: x"]
        );
    }

    #[test]
    fn expands_fragments_at_every_level() {
        assert_eq!(
            hoist(
                r#"
                { w1 { ...F } }
                fragment F on W1 { w2 { ... on W2 { x } } }
                "#,
                &[name!("w2")],
                None,
            ),
            ["w1__gqltf__w2__gqltf__x: x"]
        );
    }

    #[test]
    fn unmatched_path_segments_are_dropped() {
        assert!(hoist("{ w1 { other { x } } }", &[name!("w2")], None).is_empty());
    }

    #[test]
    fn dehoists_values() {
        let flat = json!({
            "w1__gqltf__w2__gqltf__x": 1,
            "w1__gqltf__w2__gqltf__y": [2],
            "w1__gqltf__z": null,
            "plain": "kept",
        });
        assert_eq!(
            dehoist_value(flat, DEFAULT_DELIMITER),
            json!({
                "w1": { "w2": { "x": 1, "y": [2] }, "z": null },
                "plain": "kept",
            })
        );
        assert_eq!(dehoist_value(Value::Null, DEFAULT_DELIMITER), Value::Null);
    }

    #[test]
    fn dehoists_error_paths() {
        let errors = vec![
            Error::new("nested").with_path(path!["w1__gqltf__w2__gqltf__x", 0]),
            Error::new("unpathed"),
            Error::new("empty").with_path(Path::empty()),
        ];
        let dehoisted = dehoist_errors(errors.clone(), DEFAULT_DELIMITER);
        assert_eq!(dehoisted[0].path, Some(path!["w1", "w2", "x", 0]));
        assert_eq!(dehoisted[0].message, "nested");
        assert_eq!(dehoisted[1], errors[1]);
        assert_eq!(dehoisted[2], errors[2]);
    }

    #[test]
    fn unwraps_a_fixed_path() {
        let value = json!({ "a": { "b": { "c2": 5 } }, "other": true });
        assert_eq!(
            unwrap_value(value, &[name!("a"), name!("b")]),
            json!({ "other": true, "c2": 5 })
        );
    }

    #[test]
    fn unwrap_stops_on_null() {
        let value = json!({ "a": { "b": null } });
        assert_eq!(unwrap_value(value, &[name!("a"), name!("b")]), json!({}));

        // siblings of the null are not merged either
        let value = json!({ "a": { "b": null, "other": 1 } });
        assert_eq!(unwrap_value(value, &[name!("a"), name!("b")]), json!({}));

        let value = json!({ "a": null });
        assert_eq!(unwrap_value(value, &[name!("a"), name!("b")]), json!({}));

        let value = json!({ "other": 1 });
        assert_eq!(
            unwrap_value(value, &[name!("a"), name!("b")]),
            json!({ "other": 1 })
        );
        assert_eq!(unwrap_value(Value::Null, &[name!("a")]), Value::Null);
    }

    #[test]
    fn unwrap_overwrites_colliding_keys() {
        let value = json!({ "c2": "stale", "a": { "c2": "fresh" } });
        assert_eq!(
            unwrap_value(value, &[name!("a")]),
            json!({ "c2": "fresh" })
        );
    }
}
