//! The transform protocol and the pipeline that composes transforms.
//!
//! A transform is a triple of edits: a schema edit, applied once when the pipeline is
//! composed, then a request edit and a result edit around every delegation. Schema edits run
//! from the source schema towards the exposed schema, in declaration order. A caller's request
//! is typed against the exposed schema, so request edits run the other way, from the last
//! declared transform to the first, and result edits come back from the first to the last.

use serde_json_bytes::Value;
use static_assertions::assert_impl_all;

use crate::error::TransformError;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::schema::ComposedSchema;
use crate::utils::logging::snapshot;

mod composite_fields;
mod hoist_field;
mod interface_fields;
mod map_fields;
mod wrap_fields;

pub use composite_fields::FieldNodeTransformer;
pub use composite_fields::FieldTransformer;
pub use composite_fields::TransformCompositeFields;
pub use hoist_field::HoistField;
pub use interface_fields::TransformInterfaceFields;
pub use map_fields::ErrorsTransformer;
pub use map_fields::FieldNodeMapper;
pub use map_fields::MapFields;
pub use map_fields::ObjectValueTransformer;
pub use wrap_fields::WrapFields;

/// What the delegation layer knows about the request being delegated.
#[derive(Clone, Debug, Default)]
pub struct DelegationContext {
    /// The root field the request is delegated for, if any.
    pub field_name: Option<String>,
}

/// Per-request state of one transform.
#[derive(Clone, Debug, Default)]
pub struct TransformationContext {
    /// The request this transform handed on towards the delegated service.
    pub delegated_request: Option<Request>,
}

impl TransformationContext {
    pub(crate) fn record(&mut self, request: &Request) {
        self.delegated_request = Some(request.clone());
    }
}

pub trait Transform {
    /// Edits the schema. Called once, before any request.
    fn transform_schema(
        &mut self,
        schema: ComposedSchema,
    ) -> Result<ComposedSchema, TransformError>;

    /// Edits a request on its way to the delegated service.
    fn transform_request(
        &self,
        request: Request,
        delegation: &DelegationContext,
        context: &mut TransformationContext,
    ) -> Result<Request, TransformError>;

    /// Edits a response on its way back to the caller.
    ///
    /// Must cope with a context in which no request was recorded.
    fn transform_result(
        &self,
        response: Response,
        delegation: &DelegationContext,
        context: &TransformationContext,
    ) -> Result<Response, TransformError>;
}

/// Every transform kind a [`Pipeline`] can hold.
#[derive(Debug)]
pub enum Transformer {
    CompositeFields(TransformCompositeFields),
    InterfaceFields(TransformInterfaceFields),
    MapFields(MapFields),
    HoistField(HoistField),
    WrapFields(WrapFields),
}

impl Transform for Transformer {
    fn transform_schema(
        &mut self,
        schema: ComposedSchema,
    ) -> Result<ComposedSchema, TransformError> {
        match self {
            Self::CompositeFields(transform) => transform.transform_schema(schema),
            Self::InterfaceFields(transform) => transform.transform_schema(schema),
            Self::MapFields(transform) => transform.transform_schema(schema),
            Self::HoistField(transform) => transform.transform_schema(schema),
            Self::WrapFields(transform) => transform.transform_schema(schema),
        }
    }

    fn transform_request(
        &self,
        request: Request,
        delegation: &DelegationContext,
        context: &mut TransformationContext,
    ) -> Result<Request, TransformError> {
        match self {
            Self::CompositeFields(transform) => {
                transform.transform_request(request, delegation, context)
            }
            Self::InterfaceFields(transform) => {
                transform.transform_request(request, delegation, context)
            }
            Self::MapFields(transform) => transform.transform_request(request, delegation, context),
            Self::HoistField(transform) => transform.transform_request(request, delegation, context),
            Self::WrapFields(transform) => transform.transform_request(request, delegation, context),
        }
    }

    fn transform_result(
        &self,
        response: Response,
        delegation: &DelegationContext,
        context: &TransformationContext,
    ) -> Result<Response, TransformError> {
        match self {
            Self::CompositeFields(transform) => {
                transform.transform_result(response, delegation, context)
            }
            Self::InterfaceFields(transform) => {
                transform.transform_result(response, delegation, context)
            }
            Self::MapFields(transform) => transform.transform_result(response, delegation, context),
            Self::HoistField(transform) => transform.transform_result(response, delegation, context),
            Self::WrapFields(transform) => transform.transform_result(response, delegation, context),
        }
    }
}

impl From<TransformCompositeFields> for Transformer {
    fn from(transform: TransformCompositeFields) -> Self {
        Self::CompositeFields(transform)
    }
}

impl From<TransformInterfaceFields> for Transformer {
    fn from(transform: TransformInterfaceFields) -> Self {
        Self::InterfaceFields(transform)
    }
}

impl From<MapFields> for Transformer {
    fn from(transform: MapFields) -> Self {
        Self::MapFields(transform)
    }
}

impl From<HoistField> for Transformer {
    fn from(transform: HoistField) -> Self {
        Self::HoistField(transform)
    }
}

impl From<WrapFields> for Transformer {
    fn from(transform: WrapFields) -> Self {
        Self::WrapFields(transform)
    }
}

/// The per-request state of a [`Pipeline`]: one [`TransformationContext`] per transform.
#[derive(Clone, Debug, Default)]
pub struct PipelineContext {
    contexts: Vec<TransformationContext>,
}

impl PipelineContext {
    /// The state recorded by the transform at `index`, in declaration order.
    pub fn get(&self, index: usize) -> Option<&TransformationContext> {
        self.contexts.get(index)
    }
}

/// An ordered list of transforms, composed into one.
///
/// Transforms are declared from the source schema outwards, and schema edits apply in that
/// order. Request edits run in the opposite order: the last declared transform sees the
/// caller's request first, since that request is typed against the exposed schema, and the
/// first declared transform produces the request sent to the delegated service. Result edits
/// then run in declaration order, each undoing the request edit of its transform.
///
/// ```ignore
/// // hoist is applied to the source schema, wrap to the hoisted one
/// let pipeline = Pipeline::new().with_transform(hoist).with_transform(wrap);
/// // request: wrap, then hoist; result: hoist, then wrap
/// ```
#[derive(Debug, Default)]
pub struct Pipeline {
    transforms: Vec<Transformer>,
    exposed_schema: Option<ComposedSchema>,
}

assert_impl_all!(Pipeline: Send, Sync);
assert_impl_all!(PipelineContext: Send);

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transform. Transforms are declared from the source schema outwards.
    pub fn with_transform(mut self, transform: impl Into<Transformer>) -> Self {
        self.transforms.push(transform.into());
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// The schema exposed to callers, once [`Pipeline::transform_schema`] has run.
    pub fn exposed_schema(&self) -> Option<&ComposedSchema> {
        self.exposed_schema.as_ref()
    }

    /// Applies every schema edit, in declaration order, and returns the exposed schema.
    pub fn transform_schema(
        &mut self,
        schema: ComposedSchema,
    ) -> Result<ComposedSchema, TransformError> {
        let exposed = self
            .transforms
            .iter_mut()
            .try_fold(schema, |schema, transform| transform.transform_schema(schema))?;
        tracing::debug!(transforms = self.transforms.len(), "pipeline schema composed");
        self.exposed_schema = Some(exposed.clone());
        Ok(exposed)
    }

    /// A fresh per-request state for this pipeline.
    pub fn context(&self) -> PipelineContext {
        PipelineContext {
            contexts: vec![TransformationContext::default(); self.transforms.len()],
        }
    }

    /// Rewrites a request typed against the exposed schema into the request the delegated
    /// service expects.
    pub fn transform_request(
        &self,
        request: Request,
        delegation: &DelegationContext,
        context: &mut PipelineContext,
    ) -> Result<Request, TransformError> {
        if self.exposed_schema.is_none() {
            return Err(TransformError::SchemaNotTransformed);
        }
        tracing::trace!(
            field = delegation.field_name.as_deref(),
            transforms = self.transforms.len(),
            "transforming request"
        );
        context
            .contexts
            .resize_with(self.transforms.len(), Default::default);
        let request = self
            .transforms
            .iter()
            .zip(context.contexts.iter_mut())
            .rev()
            .try_fold(request, |request, (transform, context)| {
                transform.transform_request(request, delegation, context)
            })?;
        snapshot!("DelegatedRequest", request.document, "request after pipeline");
        Ok(request)
    }

    /// Rewrites the delegated service's response back into the shape the caller asked for.
    pub fn transform_result(
        &self,
        response: Response,
        delegation: &DelegationContext,
        context: &PipelineContext,
    ) -> Result<Response, TransformError> {
        if self.exposed_schema.is_none() {
            return Err(TransformError::SchemaNotTransformed);
        }
        let unrecorded = TransformationContext::default();
        let response = self.transforms.iter().enumerate().try_fold(
            response,
            |response, (index, transform)| {
                let context = context.get(index).unwrap_or(&unrecorded);
                transform.transform_result(response, delegation, context)
            },
        )?;
        snapshot!(response, "response after pipeline");
        Ok(response)
    }
}

/// Applies `transform` to the value at `data`, unless there is no data.
pub(crate) fn map_data(response: &mut Response, transform: impl FnOnce(Value) -> Value) {
    if let Some(data) = response.data.take() {
        response.data = Some(transform(data));
    }
}
