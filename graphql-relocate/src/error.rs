use apollo_compiler::InvalidNameError;
use apollo_compiler::Name;

/// Errors raised while composing or applying relocation transforms.
///
/// Everything here is a composition-time failure: a transform whose configuration does not
/// match the schema it is applied to, or a source document that cannot be parsed. Response
/// shapes that do not match the expected nesting are never errors, they simply resolve to
/// `null`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("type `{type_name}` is not defined in the schema")]
    UnknownType { type_name: String },

    #[error("type `{type_name}` is not an object type")]
    NotAnObjectType { type_name: String },

    #[error("field path `{path}` cannot be resolved from type `{type_name}`")]
    UnresolvedPath { type_name: String, path: String },

    #[error("field name `{name}` contains the alias delimiter `{delimiter}`")]
    DelimiterInFieldName { name: String, delimiter: String },

    #[error("invalid GraphQL name `{name}`")]
    InvalidName { name: String },

    #[error("schema does not define a root {operation_type} type")]
    MissingRootOperation { operation_type: String },

    #[error("invalid transform configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("the transform was used before its schema was transformed")]
    SchemaNotTransformed,

    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    #[error("invalid document: {message}")]
    InvalidDocument { message: String },
}

impl TransformError {
    pub(crate) fn unresolved_path(type_name: &Name, path: &[Name]) -> Self {
        Self::UnresolvedPath {
            type_name: type_name.to_string(),
            path: path.iter().map(Name::as_str).collect::<Vec<_>>().join("."),
        }
    }

    pub(crate) fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

impl From<InvalidNameError> for TransformError {
    fn from(err: InvalidNameError) -> Self {
        Self::InvalidName {
            name: err.name.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for TransformError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::invalid_configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;

    use super::*;

    #[test]
    fn unresolved_paths_are_dotted() {
        insta::assert_snapshot!(
            TransformError::unresolved_path(&name!("Query"), &[name!("a"), name!("b")]),
            @"field path `a.b` cannot be resolved from type `Query`"
        );
    }

    #[test]
    fn invalid_names_convert() {
        let error = TransformError::from(Name::new("not a name").unwrap_err());
        assert_eq!(
            error,
            TransformError::InvalidName {
                name: "not a name".to_owned()
            }
        );
    }
}
