use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::ast::FieldDefinition;
use indexmap::IndexMap;
use serde_json_bytes::Value;

use super::DelegationContext;
use super::Transform;
use super::TransformCompositeFields;
use super::TransformationContext;
use super::map_data;
use crate::error::TransformError;
use crate::graphql::Error;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::schema::ComposedSchema;
use crate::schema::FieldEdit;
use crate::selection::FragmentMap;
use crate::visitor::ResponseRewriter;
use crate::visitor::add_typename_to_abstract_types;
use crate::visitor::rewrite_data;

/// Replaces a selection of a configured field with zero, one or many selections.
pub type FieldNodeMapper = Arc<
    dyn Fn(&Node<ast::Field>, &FragmentMap) -> Result<Vec<ast::Selection>, TransformError>
        + Send
        + Sync,
>;

/// Rewrites a whole response object of a configured type.
pub type ObjectValueTransformer = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Rewrites the error list of a response.
pub type ErrorsTransformer = Arc<dyn Fn(Vec<Error>) -> Vec<Error> + Send + Sync>;

/// Rewrites selections of configured `Type.field` pairs in requests, and objects of
/// configured types in responses. Leaves the schema as it is.
///
/// ```ignore
/// let transform = MapFields::default()
///     .map_field(name!("Query"), name!("c2"), |field, _| {
///         Ok(vec![ast::Selection::Field(field.clone())])
///     })
///     .map_value(name!("Query"), |value| value)
///     .map_errors(|errors| errors);
/// ```
#[derive(Default)]
pub struct MapFields {
    field_mappers: IndexMap<Name, IndexMap<Name, FieldNodeMapper>>,
    value_transformers: IndexMap<Name, ObjectValueTransformer>,
    errors_transformer: Option<ErrorsTransformer>,
    transformer: Option<TransformCompositeFields>,
}

impl MapFields {
    pub fn map_field(
        mut self,
        type_name: Name,
        field_name: Name,
        mapper: impl Fn(&Node<ast::Field>, &FragmentMap) -> Result<Vec<ast::Selection>, TransformError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.field_mappers
            .entry(type_name)
            .or_default()
            .insert(field_name, Arc::new(mapper));
        self
    }

    pub fn map_value(
        mut self,
        type_name: Name,
        transformer: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.value_transformers
            .insert(type_name, Arc::new(transformer));
        self
    }

    pub fn map_errors(
        mut self,
        transformer: impl Fn(Vec<Error>) -> Vec<Error> + Send + Sync + 'static,
    ) -> Self {
        self.errors_transformer = Some(Arc::new(transformer));
        self
    }

    pub(crate) fn transform_edited_schema(
        &mut self,
        delegated: ComposedSchema,
        edited: ComposedSchema,
    ) -> Result<ComposedSchema, TransformError> {
        let field_mappers = Arc::new(self.field_mappers.clone());
        let field_node_transformer = (!field_mappers.is_empty()).then(|| {
            Arc::new(
                move |type_name: &str, field: &Node<ast::Field>, fragments: &FragmentMap| {
                    let Some(mapper) = field_mappers
                        .get(type_name)
                        .and_then(|mappers| mappers.get(field.name.as_str()))
                    else {
                        return Ok(None);
                    };
                    mapper(field, fragments).map(Some)
                },
            ) as super::FieldNodeTransformer
        });
        let mut transformer = TransformCompositeFields::from_parts(
            Arc::new(|_: &Name, _: &Name, _: &FieldDefinition| FieldEdit::Keep),
            field_node_transformer,
        );
        let exposed = transformer.transform_edited_schema(delegated, edited)?;
        self.transformer = Some(transformer);
        Ok(exposed)
    }

    fn transformer(&self) -> Result<&TransformCompositeFields, TransformError> {
        self.transformer
            .as_ref()
            .ok_or(TransformError::SchemaNotTransformed)
    }
}

impl fmt::Debug for MapFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self
            .field_mappers
            .iter()
            .flat_map(|(type_name, mappers)| {
                mappers
                    .keys()
                    .map(move |field_name| format!("{type_name}.{field_name}"))
            })
            .collect::<Vec<_>>();
        f.debug_struct("MapFields")
            .field("fields", &fields)
            .field("values", &self.value_transformers.keys().collect::<Vec<_>>())
            .field("errors", &self.errors_transformer.is_some())
            .finish()
    }
}

impl Transform for MapFields {
    fn transform_schema(
        &mut self,
        schema: ComposedSchema,
    ) -> Result<ComposedSchema, TransformError> {
        self.transform_edited_schema(schema.clone(), schema)
    }

    fn transform_request(
        &self,
        request: Request,
        delegation: &DelegationContext,
        context: &mut TransformationContext,
    ) -> Result<Request, TransformError> {
        let transformer = self.transformer()?;
        let mut request = transformer.transform_request(request, delegation, context)?;
        // value transformers are chosen by concrete type
        if !self.value_transformers.is_empty() {
            let schema = transformer.delegated_schema()?;
            if let Some(document) = add_typename_to_abstract_types(schema, &request.document) {
                request.document = document;
                context.record(&request);
            }
        }
        Ok(request)
    }

    fn transform_result(
        &self,
        mut response: Response,
        _delegation: &DelegationContext,
        context: &TransformationContext,
    ) -> Result<Response, TransformError> {
        let schema = self.transformer()?.delegated_schema()?;
        if !self.value_transformers.is_empty() {
            let rewriter = ValueRewriter {
                schema,
                value_transformers: &self.value_transformers,
            };
            map_data(&mut response, |data| {
                rewrite_data(&rewriter, context.delegated_request.as_ref(), data)
            });
        }
        if let Some(errors_transformer) = &self.errors_transformer {
            response.errors = errors_transformer(std::mem::take(&mut response.errors));
        }
        Ok(response)
    }
}

struct ValueRewriter<'a> {
    schema: &'a Schema,
    value_transformers: &'a IndexMap<Name, ObjectValueTransformer>,
}

impl ResponseRewriter for ValueRewriter<'_> {
    fn schema(&self) -> &Schema {
        self.schema
    }

    fn leave_object(&self, type_name: &str, value: Value) -> Value {
        match self.value_transformers.get(type_name) {
            Some(transformer) => transformer(value),
            None => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::path;
    use crate::selection::rename_field;

    const SDL: &str = "type Query { a: A b: A } type A { x: Int y: Int }";

    fn composed(mut transform: MapFields) -> MapFields {
        transform
            .transform_schema(ComposedSchema::parse(SDL, "schema.graphql").unwrap())
            .unwrap();
        transform
    }

    fn round_trip(
        transform: &MapFields,
        source: &str,
        response: Response,
    ) -> (String, Response) {
        let mut context = TransformationContext::default();
        let delegated = transform
            .transform_request(
                Request::parse(source).unwrap(),
                &DelegationContext::default(),
                &mut context,
            )
            .unwrap();
        let response = transform
            .transform_result(response, &DelegationContext::default(), &context)
            .unwrap();
        (delegated.document.to_string(), response)
    }

    #[test]
    fn maps_configured_fields_only() {
        let transform = composed(MapFields::default().map_field(
            name!("A"),
            name!("x"),
            |field, _| {
                Ok(vec![
                    ast::Selection::Field(rename_field(field, name!("y"))),
                    ast::Selection::Field(field.clone()),
                ])
            },
        ));
        let (delegated, _) = round_trip(&transform, "{ a { x y } }", Response::default());
        assert_eq!(
            delegated,
            Request::parse("{ a { x: y x y } }")
                .unwrap()
                .document
                .to_string()
        );
    }

    #[test]
    fn transforms_values_by_type_and_errors_once() {
        let transform = composed(
            MapFields::default()
                .map_value(name!("A"), |mut value| {
                    if let Value::Object(object) = &mut value {
                        object.insert("seen", Value::Bool(true));
                    }
                    value
                })
                .map_errors(|mut errors| {
                    errors.push(Error::new("appended"));
                    errors
                }),
        );
        let response = Response::from_data(json!({ "a": { "x": 1 }, "b": null }))
            .with_errors(vec![Error::new("m").with_path(path!["a", "x"])]);
        let (_, response) = round_trip(&transform, "{ a { x } b { y } }", response);
        assert_eq!(
            response.data,
            Some(json!({ "a": { "x": 1, "seen": true }, "b": null }))
        );
        assert_eq!(
            response
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>(),
            ["m", "appended"]
        );
    }

    #[test]
    fn values_at_abstract_positions_are_typed_by_typename() {
        let mut transform = MapFields::default().map_value(name!("Thing"), |mut value| {
            if let Value::Object(object) = &mut value {
                object.insert("seen", Value::Bool(true));
            }
            value
        });
        transform
            .transform_schema(
                ComposedSchema::parse(
                    r#"
                    type Query { node: Node }
                    interface Node { id: ID }
                    type Thing implements Node { id: ID x: Int }
                    type Other implements Node { id: ID }
                    "#,
                    "schema.graphql",
                )
                .unwrap(),
            )
            .unwrap();

        let response = Response::from_data(json!({
            "node": { "__typename": "Thing", "x": 1 },
        }));
        let (delegated, response) =
            round_trip(&transform, "{ node { ... on Thing { x } } }", response);
        assert_eq!(
            delegated,
            Request::parse("{ node { __typename ... on Thing { x } } }")
                .unwrap()
                .document
                .to_string()
        );
        assert_eq!(
            response.data,
            Some(json!({ "node": { "__typename": "Thing", "x": 1, "seen": true } }))
        );

        let response = Response::from_data(json!({ "node": { "__typename": "Other" } }));
        let (_, response) = round_trip(&transform, "{ node { ... on Thing { x } } }", response);
        assert_eq!(
            response.data,
            Some(json!({ "node": { "__typename": "Other" } }))
        );
    }

    #[test]
    fn without_configuration_everything_passes_through() {
        let transform = composed(MapFields::default());
        let response = Response::from_data(json!({ "a": { "x": 1 } }))
            .with_errors(vec![Error::new("m")]);
        let source = "query Q { a { x } ...F } fragment F on Query { b { y } }";
        let (delegated, transformed) = round_trip(&transform, source, response.clone());
        assert_eq!(
            delegated,
            Request::parse(source).unwrap().document.to_string()
        );
        assert_eq!(transformed, response);
    }
}
