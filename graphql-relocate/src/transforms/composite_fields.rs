use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::ast::FieldDefinition;

use super::DelegationContext;
use super::Transform;
use super::TransformationContext;
use crate::error::TransformError;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::schema::ComposedSchema;
use crate::schema::FieldEdit;
use crate::schema::FieldRenames;
use crate::selection::FragmentMap;
use crate::selection::rename_field;
use crate::visitor::RequestRewriter;
use crate::visitor::rewrite_document;

/// Decides what happens to one field of a composite type: `(type name, field name, field)`.
pub type FieldTransformer = Arc<dyn Fn(&Name, &Name, &FieldDefinition) -> FieldEdit + Send + Sync>;

/// Rewrites one field selection of a type: `(type name, field, fragments)`.
///
/// Returns `Ok(None)` to leave the selection to the default handling.
pub type FieldNodeTransformer = Arc<
    dyn Fn(
            &str,
            &Node<ast::Field>,
            &FragmentMap,
        ) -> Result<Option<Vec<ast::Selection>>, TransformError>
        + Send
        + Sync,
>;

/// Edits the fields of every object and interface type, and renames selections of renamed
/// fields back to their source name in requests.
pub struct TransformCompositeFields {
    field_transformer: FieldTransformer,
    field_node_transformer: Option<FieldNodeTransformer>,
    state: Option<ComposedState>,
}

#[derive(Clone)]
struct ComposedState {
    /// The schema delegated requests are typed against.
    delegated_schema: Schema,
    /// The schema requests arrive typed against.
    exposed_schema: Schema,
    renames: FieldRenames,
}

impl TransformCompositeFields {
    pub fn new(
        field_transformer: impl Fn(&Name, &Name, &FieldDefinition) -> FieldEdit
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self::from_parts(Arc::new(field_transformer), None)
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

    pub(crate) fn from_parts(
        field_transformer: FieldTransformer,
        field_node_transformer: Option<FieldNodeTransformer>,
    ) -> Self {
        Self {
            field_transformer,
            field_node_transformer,
            state: None,
        }
    }

    /// Maps the fields of `edited`, a schema some other transform derived from `delegated`.
    ///
    /// Requests rewritten by this transform are delegated against `delegated`.
    pub(crate) fn transform_edited_schema(
        &mut self,
        delegated: ComposedSchema,
        edited: ComposedSchema,
    ) -> Result<ComposedSchema, TransformError> {
        let field_transformer = &self.field_transformer;
        let (exposed, renames) = edited.map_composite_fields(|type_name, field_name, field| {
            field_transformer(type_name, field_name, field)
        })?;
        if !renames.is_empty() {
            tracing::debug!(types = renames.len(), "composite fields renamed");
        }
        self.state = Some(ComposedState {
            delegated_schema: delegated.into_inner(),
            exposed_schema: exposed.schema().clone(),
            renames,
        });
        Ok(exposed)
    }

    /// The schema the requests produced by this transform are typed against.
    pub(crate) fn delegated_schema(&self) -> Result<&Schema, TransformError> {
        self.state()
            .map(|state| &state.delegated_schema)
    }

    fn state(&self) -> Result<&ComposedState, TransformError> {
        self.state
            .as_ref()
            .ok_or(TransformError::SchemaNotTransformed)
    }
}

impl fmt::Debug for TransformCompositeFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformCompositeFields")
            .field(
                "field_node_transformer",
                &self.field_node_transformer.is_some(),
            )
            .field("renames", &self.state.as_ref().map(|state| &state.renames))
            .finish_non_exhaustive()
    }
}

impl Transform for TransformCompositeFields {
    fn transform_schema(
        &mut self,
        schema: ComposedSchema,
    ) -> Result<ComposedSchema, TransformError> {
        self.transform_edited_schema(schema.clone(), schema)
    }

    fn transform_request(
        &self,
        mut request: Request,
        _delegation: &DelegationContext,
        context: &mut TransformationContext,
    ) -> Result<Request, TransformError> {
        let state = self.state()?;
        if self.field_node_transformer.is_some() || !state.renames.is_empty() {
            let mut rewriter = FieldRewriter {
                schema: &state.exposed_schema,
                renames: &state.renames,
                field_node_transformer: self.field_node_transformer.as_ref(),
            };
            request.document = rewrite_document(&mut rewriter, &request.document)?;
        }
        context.record(&request);
        Ok(request)
    }

    fn transform_result(
        &self,
        response: Response,
        _delegation: &DelegationContext,
        _context: &TransformationContext,
    ) -> Result<Response, TransformError> {
        self.state()?;
        Ok(response)
    }
}

struct FieldRewriter<'a> {
    schema: &'a Schema,
    renames: &'a FieldRenames,
    field_node_transformer: Option<&'a FieldNodeTransformer>,
}

impl RequestRewriter for FieldRewriter<'_> {
    fn schema(&self) -> &Schema {
        self.schema
    }

    fn field(
        &mut self,
        parent_type: &str,
        field: &Node<ast::Field>,
        fragments: &FragmentMap,
    ) -> Result<Option<Vec<ast::Selection>>, TransformError> {
        if let Some(field_node_transformer) = self.field_node_transformer {
            if let Some(selections) = field_node_transformer(parent_type, field, fragments)? {
                return Ok(Some(selections));
            }
        }
        let source_name = self
            .renames
            .get(parent_type)
            .and_then(|renames| renames.get(field.name.as_str()));
        Ok(source_name.map(|source_name| {
            tracing::trace!(%parent_type, field = %field.name, %source_name, "renaming selection");
            vec![ast::Selection::Field(rename_field(field, source_name.clone()))]
        }))
    }
}
