//! Types related to GraphQL requests, responses, etc.

use apollo_compiler::ast;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::Value;

use crate::error::TransformError;
use crate::json_ext::Object;
use crate::json_ext::Path;

/// The error location
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// The line number
    pub line: u32,
    /// The column number
    pub column: u32,
}

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors)
/// as may be found in the `errors` field of a GraphQL [`Response`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The locations of the error in the GraphQL document of the originating request.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// If this is a field error, the JSON path to that field in [`Response::data`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

impl Error {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: Path) -> Self {
        self.path = Some(path);
        self
    }

    /// Returns the same error reported at another location of the response.
    pub fn relocated(self, path: Option<Path>) -> Self {
        Self { path, ..self }
    }
}

/// A GraphQL request as forwarded to the delegated service.
#[derive(Clone, Debug)]
pub struct Request {
    /// The operation and fragment definitions.
    pub document: ast::Document,

    /// The name of the operation to execute, if the document holds more than one.
    pub operation_name: Option<String>,

    /// Variable values, carried through unchanged.
    pub variables: Object,

    /// Request extensions, carried through unchanged.
    pub extensions: Object,
}

impl Request {
    pub fn new(document: ast::Document) -> Self {
        Self {
            document,
            operation_name: None,
            variables: Object::new(),
            extensions: Object::new(),
        }
    }

    /// Parses a request document, without validating it against any schema.
    pub fn parse(source_text: &str) -> Result<Self, TransformError> {
        let document = ast::Document::parse(source_text, "request.graphql").map_err(|err| {
            TransformError::InvalidDocument {
                message: err.errors.to_string(),
            }
        })?;
        Ok(Self::new(document))
    }

    pub fn with_operation_name(mut self, operation_name: impl Into<String>) -> Self {
        self.operation_name = Some(operation_name.into());
        self
    }

    /// The operation this request executes: the one named by `operation_name`, or the first
    /// operation of the document.
    pub fn operation(&self) -> Option<&ast::OperationDefinition> {
        let mut operations = self.document.definitions.iter().filter_map(|definition| {
            match definition {
                ast::Definition::OperationDefinition(operation) => Some(operation.as_ref()),
                _ => None,
            }
        });
        match &self.operation_name {
            Some(name) => operations.find(|op| op.name.as_ref().is_some_and(|n| n.as_str() == name)),
            None => operations.next(),
        }
    }
}

/// A GraphQL response, as returned by the delegated service and handed back to the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The errors encountered while resolving the data.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    /// The optional GraphQL extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

impl Response {
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn with_errors(mut self, errors: Vec<Error>) -> Self {
        self.errors = errors;
        self
    }
}
