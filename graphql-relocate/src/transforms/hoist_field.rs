use apollo_compiler::Name;
use apollo_compiler::ast;

use super::DelegationContext;
use super::MapFields;
use super::Transform;
use super::TransformationContext;
use crate::error::TransformError;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::hoist::unwrap_value;
use crate::schema::ComposedSchema;
use crate::schema::FieldConfigMap;
use crate::schema::FieldResolver;
use crate::selection::rename_field;
use crate::selection::wrap_field;

/// Moves a field found at the end of a path of nested fields up to the type the path starts
/// from, under a new name.
///
/// Hoisting `["a", "b", "c"]` of `Query` as `c2` exposes `Query.c2`; a request for `c2` is
/// delegated as `a { b { c2: c } }` and the delegated value at `a.b.c2` comes back as `c2`.
#[derive(Debug)]
pub struct HoistField {
    type_name: Name,
    path_to_field: Vec<Name>,
    old_field_name: Name,
    new_field_name: Name,
    transformer: MapFields,
}

impl HoistField {
    /// `path` runs from a field of `type_name` down to the field to hoist, included.
    pub fn new(
        type_name: Name,
        mut path: Vec<Name>,
        new_field_name: Name,
    ) -> Result<Self, TransformError> {
        let old_field_name = path.pop().ok_or_else(|| {
            TransformError::invalid_configuration("the path to a hoisted field cannot be empty")
        })?;
        let path_to_field = path;

        let transformer = MapFields::default()
            .map_field(type_name.clone(), new_field_name.clone(), {
                let old_field_name = old_field_name.clone();
                let path_to_field = path_to_field.clone();
                move |field, _| {
                    let renamed = rename_field(field, old_field_name.clone());
                    Ok(vec![ast::Selection::Field(wrap_field(
                        renamed,
                        &path_to_field,
                    ))])
                }
            })
            .map_value(type_name.clone(), {
                let path_to_field = path_to_field.clone();
                move |value| unwrap_value(value, &path_to_field)
            });

        Ok(Self {
            type_name,
            path_to_field,
            old_field_name,
            new_field_name,
            transformer,
        })
    }
}

impl Transform for HoistField {
    fn transform_schema(
        &mut self,
        schema: ComposedSchema,
    ) -> Result<ComposedSchema, TransformError> {
        let inner_type = schema.resolve_path(&self.type_name, &self.path_to_field)?;
        let (edited, mut removed) = schema
            .clone()
            .remove_object_fields(&inner_type, |name| name == &self.old_field_name)?;
        let target = removed.shift_remove(&self.old_field_name).ok_or_else(|| {
            let mut path = self.path_to_field.clone();
            path.push(self.old_field_name.clone());
            TransformError::unresolved_path(&self.type_name, &path)
        })?;

        tracing::debug!(
            from = %inner_type,
            field = %self.old_field_name,
            to = %self.type_name,
            new_field = %self.new_field_name,
            "hoisting field"
        );
        let edited = edited.append_object_fields(
            &self.type_name,
            FieldConfigMap::from([(
                self.new_field_name.clone(),
                target.with_resolver(FieldResolver::Merged),
            )]),
        )?;
        self.transformer.transform_edited_schema(schema, edited)
    }

    fn transform_request(
        &self,
        request: Request,
        delegation: &DelegationContext,
        context: &mut TransformationContext,
    ) -> Result<Request, TransformError> {
        self.transformer
            .transform_request(request, delegation, context)
    }

    fn transform_result(
        &self,
        response: Response,
        delegation: &DelegationContext,
        context: &TransformationContext,
    ) -> Result<Response, TransformError> {
        self.transformer
            .transform_result(response, delegation, context)
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json_bytes::Value;
    use serde_json_bytes::json;

    use super::*;

    const SDL: &str = r#"
        type Query { a: A other: Int }
        type A { b: B }
        type B { c(flag: Boolean): Int d: String }
    "#;

    fn hoist_c() -> HoistField {
        HoistField::new(
            name!("Query"),
            vec![name!("a"), name!("b"), name!("c")],
            name!("c2"),
        )
        .unwrap()
    }

    fn compose(transform: &mut HoistField) -> ComposedSchema {
        transform
            .transform_schema(ComposedSchema::parse(SDL, "schema.graphql").unwrap())
            .unwrap()
    }

    #[test]
    fn moves_the_field_definition() {
        let exposed = compose(&mut hoist_c());
        let c2 = exposed.schema().type_field("Query", "c2").unwrap();
        assert_eq!(c2.ty.inner_named_type().as_str(), "Int");
        assert_eq!(c2.arguments.len(), 1);
        assert!(exposed.schema().type_field("B", "c").is_err());
        assert!(exposed.schema().type_field("B", "d").is_ok());
        assert_eq!(exposed.resolver("Query", "c2"), Some(FieldResolver::Merged));
    }

    #[test]
    fn rewrites_requests_along_the_path() {
        let mut transform = hoist_c();
        compose(&mut transform);
        let delegated = transform
            .transform_request(
                Request::parse("{ other c2(flag: true) mine: c2 }").unwrap(),
                &DelegationContext::default(),
                &mut TransformationContext::default(),
            )
            .unwrap();
        assert_eq!(
            delegated.document.to_string(),
            Request::parse("{ other a { b { c2: c(flag: true) } } a { b { mine: c } } }")
                .unwrap()
                .document
                .to_string()
        );
    }

    #[rstest]
    #[case::present(json!({ "a": { "b": { "c2": 5 } } }), json!({ "c2": 5 }))]
    #[case::null_leaf(json!({ "a": { "b": { "c2": null } } }), json!({ "c2": null }))]
    #[case::null_intermediate(json!({ "a": { "b": null } }), json!({}))]
    #[case::null_root(json!({ "a": null }), json!({}))]
    fn unwraps_results(#[case] data: Value, #[case] expected: Value) {
        let mut transform = hoist_c();
        compose(&mut transform);
        let mut context = TransformationContext::default();
        transform
            .transform_request(
                Request::parse("{ c2 }").unwrap(),
                &DelegationContext::default(),
                &mut context,
            )
            .unwrap();
        let response = transform
            .transform_result(
                Response::from_data(data),
                &DelegationContext::default(),
                &context,
            )
            .unwrap();
        assert_eq!(response.data, Some(expected));
    }

    #[test]
    fn rejects_unresolvable_paths() {
        assert!(matches!(
            HoistField::new(name!("Query"), Vec::new(), name!("x")),
            Err(TransformError::InvalidConfiguration { .. })
        ));

        let path = vec![name!("a"), name!("x"), name!("c")];
        let mut transform = HoistField::new(name!("Query"), path, name!("c2")).unwrap();
        assert_eq!(
            transform
                .transform_schema(ComposedSchema::parse(SDL, "schema.graphql").unwrap())
                .map(|_| ()),
            Err(TransformError::UnresolvedPath {
                type_name: "Query".to_owned(),
                path: "a.x".to_owned(),
            })
        );

        let path = vec![name!("a"), name!("b"), name!("nope")];
        let mut transform = HoistField::new(name!("Query"), path, name!("c2")).unwrap();
        assert_eq!(
            transform
                .transform_schema(ComposedSchema::parse(SDL, "schema.graphql").unwrap())
                .map(|_| ()),
            Err(TransformError::UnresolvedPath {
                type_name: "Query".to_owned(),
                path: "a.b.nope".to_owned(),
            })
        );
    }
}
