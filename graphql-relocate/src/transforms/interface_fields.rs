use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::ast::FieldDefinition;

use super::DelegationContext;
use super::FieldNodeTransformer;
use super::FieldTransformer;
use super::Transform;
use super::TransformCompositeFields;
use super::TransformationContext;
use crate::error::TransformError;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::schema::ComposedSchema;
use crate::schema::FieldEdit;
use crate::selection::FragmentMap;

/// Edits fields of interface types only, leaving the object types that implement them alone.
///
/// Whether a type is an interface is decided against the schema this transform receives, not
/// the one it produces.
pub struct TransformInterfaceFields {
    interface_field_transformer: FieldTransformer,
    field_node_transformer: Option<FieldNodeTransformer>,
    transformer: Option<TransformCompositeFields>,
}

impl TransformInterfaceFields {
    pub fn new(
        interface_field_transformer: impl Fn(&Name, &Name, &FieldDefinition) -> FieldEdit
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            interface_field_transformer: Arc::new(interface_field_transformer),
            field_node_transformer: None,
            transformer: None,
        }
    }

    pub fn with_field_node_transformer(
        mut self,
        field_node_transformer: impl Fn(
            &str,
            &Node<ast::Field>,
            &FragmentMap,
        ) -> Result<Option<Vec<ast::Selection>>, TransformError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.field_node_transformer = Some(Arc::new(field_node_transformer));
        self
    }

    fn transformer(&self) -> Result<&TransformCompositeFields, TransformError> {
        self.transformer
            .as_ref()
            .ok_or(TransformError::SchemaNotTransformed)
    }
}

impl std::fmt::Debug for TransformInterfaceFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformInterfaceFields")
            .field("transformer", &self.transformer)
            .finish_non_exhaustive()
    }
}

impl Transform for TransformInterfaceFields {
    fn transform_schema(
        &mut self,
        schema: ComposedSchema,
    ) -> Result<ComposedSchema, TransformError> {
        let interfaces = schema.interface_names();
        let interface_field_transformer = self.interface_field_transformer.clone();
        let mut transformer = TransformCompositeFields::from_parts(
            Arc::new(
                move |type_name: &Name, field_name: &Name, field: &FieldDefinition| {
                    if interfaces.contains(type_name) {
                        interface_field_transformer(type_name, field_name, field)
                    } else {
                        FieldEdit::Keep
                    }
                },
            ),
            self.field_node_transformer.clone(),
        );
        let exposed = transformer.transform_schema(schema)?;
        self.transformer = Some(transformer);
        Ok(exposed)
    }

    fn transform_request(
        &self,
        request: Request,
        delegation: &DelegationContext,
        context: &mut TransformationContext,
    ) -> Result<Request, TransformError> {
        self.transformer()?
            .transform_request(request, delegation, context)
    }

    fn transform_result(
        &self,
        response: Response,
        delegation: &DelegationContext,
        context: &TransformationContext,
    ) -> Result<Response, TransformError> {
        self.transformer()?
            .transform_result(response, delegation, context)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use apollo_compiler::name;
    use pretty_assertions::assert_eq;

    use super::*;

    const SDL: &str = r#"
        type Query { node: Iface obj: Obj }
        interface Iface { f: String }
        type Obj implements Iface { f: String g: Int }
    "#;

    #[test]
    fn only_interface_fields_are_offered() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        let mut transform = TransformInterfaceFields::new(move |type_name, field_name, field| {
            recorded
                .lock()
                .unwrap()
                .push(format!("{type_name}.{field_name}"));
            FieldEdit::Rename(name!("renamedF"), field.clone())
        });
        let exposed = transform
            .transform_schema(ComposedSchema::parse(SDL, "schema.graphql").unwrap())
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), ["Iface.f"]);
        assert!(exposed.schema().type_field("Iface", "renamedF").is_ok());
        assert!(exposed.schema().type_field("Obj", "f").is_ok());

        let delegated = transform
            .transform_request(
                Request::parse("{ node { renamedF } obj { f } }").unwrap(),
                &DelegationContext::default(),
                &mut TransformationContext::default(),
            )
            .unwrap();
        assert_eq!(
            delegated.document.to_string(),
            Request::parse("{ node { renamedF: f } obj { f } }")
                .unwrap()
                .document
                .to_string()
        );
    }

    #[test]
    fn requires_the_schema_edit_first() {
        let transform = TransformInterfaceFields::new(|_, _, _| FieldEdit::Keep);
        assert_eq!(
            transform
                .transform_request(
                    Request::parse("{ node { f } }").unwrap(),
                    &DelegationContext::default(),
                    &mut TransformationContext::default(),
                )
                .map(|_| ()),
            Err(TransformError::SchemaNotTransformed)
        );
    }
}
