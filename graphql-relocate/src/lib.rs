//! Reversible relocation of GraphQL fields.
//!
//! A relocation moves a field to another position of a schema, rewrites requests for the new
//! position into requests the delegated service understands, and rewrites its responses and
//! errors back into the shape the caller asked for.
//!
//! ## Usage
//!
//! ```ignore
//! use apollo_compiler::name;
//! use graphql_relocate::ComposedSchema;
//! use graphql_relocate::DelegationContext;
//! use graphql_relocate::HoistField;
//! use graphql_relocate::Pipeline;
//! use graphql_relocate::Request;
//!
//! let mut pipeline = Pipeline::new().with_transform(HoistField::new(
//!     name!("Query"),
//!     vec![name!("a"), name!("b"), name!("c")],
//!     name!("c2"),
//! )?);
//! let exposed = pipeline.transform_schema(ComposedSchema::parse(sdl, "schema.graphql")?)?;
//!
//! let mut context = pipeline.context();
//! let delegated = pipeline.transform_request(request, &DelegationContext::default(), &mut context)?;
//! // ... execute `delegated` against the source schema ...
//! let response = pipeline.transform_result(response, &DelegationContext::default(), &context)?;
//! ```

#![warn(
    rustdoc::broken_intra_doc_links,
    unreachable_pub,
    unreachable_patterns,
    unused,
    unused_qualifications,
    dead_code,
    while_true,
    unconditional_panic,
    clippy::all
)]

pub mod configuration;
pub mod error;
pub mod graphql;
pub mod hoist;
pub mod json_ext;
pub mod schema;
pub mod selection;
pub mod transforms;
pub(crate) mod utils;
pub(crate) mod visitor;

pub use crate::configuration::Configuration;
pub use crate::error::TransformError;
pub use crate::graphql::Request;
pub use crate::graphql::Response;
pub use crate::schema::ComposedSchema;
pub use crate::transforms::DelegationContext;
pub use crate::transforms::HoistField;
pub use crate::transforms::MapFields;
pub use crate::transforms::Pipeline;
pub use crate::transforms::PipelineContext;
pub use crate::transforms::Transform;
pub use crate::transforms::TransformCompositeFields;
pub use crate::transforms::TransformInterfaceFields;
pub use crate::transforms::TransformationContext;
pub use crate::transforms::Transformer;
pub use crate::transforms::WrapFields;
