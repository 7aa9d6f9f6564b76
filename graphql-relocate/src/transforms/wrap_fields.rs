use apollo_compiler::Name;
use apollo_compiler::ast;
use apollo_compiler::ast::FieldDefinition;
use itertools::Itertools;

use super::DelegationContext;
use super::MapFields;
use super::Transform;
use super::TransformationContext;
use crate::error::TransformError;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::hoist::DEFAULT_DELIMITER;
use crate::hoist::dehoist_errors;
use crate::hoist::dehoist_value;
use crate::hoist::hoist_fields;
use crate::schema::ComposedSchema;
use crate::schema::FieldConfig;
use crate::schema::FieldConfigMap;
use crate::schema::FieldResolver;

/// Nests fields of an object type under a chain of new wrapping fields and types.
///
/// Wrapping `x` and `y` of `Query` under fields `["w1", "w2"]` of types `["W1", "W2"]`
/// exposes `Query.w1: W1`, `W1.w2: W2` and `W2 { x y }`. A request for `w1 { w2 { x } }` is
/// delegated as `w1__gqltf__w2__gqltf__x: x` and the delegated value is nested back.
#[derive(Debug)]
pub struct WrapFields {
    outer_type_name: Name,
    wrapping_field_names: Vec<Name>,
    wrapping_type_names: Vec<Name>,
    field_names: Option<Vec<Name>>,
    delimiter: String,
    transformer: MapFields,
}

impl WrapFields {
    /// Wraps `field_names` of `outer_type_name`, or all of its fields when `None`.
    ///
    /// `wrapping_field_names[i]` is a field of type `wrapping_type_names[i]`; both run from the
    /// outermost wrapper to the innermost.
    pub fn new(
        outer_type_name: Name,
        wrapping_field_names: Vec<Name>,
        wrapping_type_names: Vec<Name>,
        field_names: Option<Vec<Name>>,
    ) -> Result<Self, TransformError> {
        if wrapping_field_names.is_empty() {
            return Err(TransformError::invalid_configuration(
                "at least one wrapping field is required",
            ));
        }
        if wrapping_field_names.len() != wrapping_type_names.len() {
            return Err(TransformError::invalid_configuration(format!(
                "{} wrapping fields were given for {} wrapping types",
                wrapping_field_names.len(),
                wrapping_type_names.len()
            )));
        }
        let mut wrap_fields = Self {
            outer_type_name,
            wrapping_field_names,
            wrapping_type_names,
            field_names,
            delimiter: String::new(),
            transformer: MapFields::default(),
        };
        wrap_fields.set_delimiter(DEFAULT_DELIMITER)?;
        Ok(wrap_fields)
    }

    /// Uses another alias delimiter than [`DEFAULT_DELIMITER`].
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Result<Self, TransformError> {
        self.set_delimiter(delimiter)?;
        Ok(self)
    }

    fn set_delimiter(&mut self, delimiter: impl Into<String>) -> Result<(), TransformError> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(TransformError::invalid_configuration(
                "the alias delimiter cannot be empty",
            ));
        }
        // aliases are response keys joined by the delimiter
        if !Name::is_valid_syntax(&format!("_{delimiter}")) {
            return Err(TransformError::invalid_configuration(format!(
                "the alias delimiter `{delimiter}` cannot appear in a GraphQL name"
            )));
        }
        check_delimiter(&self.wrapping_field_names, &delimiter)?;
        if let Some(field_names) = &self.field_names {
            check_delimiter(field_names, &delimiter)?;
        }

        let path = self.wrapping_field_names[1..].to_vec();
        let field_names = self.field_names.clone();
        let request_delimiter = delimiter.clone();
        let value_delimiter = delimiter.clone();
        let errors_delimiter = delimiter.clone();
        self.transformer = MapFields::default()
            .map_field(
                self.outer_type_name.clone(),
                self.wrapping_field_names[0].clone(),
                move |field, fragments| {
                    let hoisted = hoist_fields(
                        field,
                        field_names.as_deref(),
                        &path,
                        &request_delimiter,
                        fragments,
                    )?;
                    Ok(hoisted.into_iter().map(ast::Selection::Field).collect())
                },
            )
            .map_value(self.outer_type_name.clone(), move |value| {
                dehoist_value(value, &value_delimiter)
            })
            .map_errors(move |errors| dehoist_errors(errors, &errors_delimiter));
        self.delimiter = delimiter;
        Ok(())
    }

    fn wrapping_field(&self, index: usize) -> (Name, FieldConfig) {
        let type_name = &self.wrapping_type_names[index];
        let field_name = self.wrapping_field_names[index].clone();
        let definition = FieldDefinition {
            description: None,
            name: field_name.clone(),
            arguments: Vec::new(),
            ty: ast::Type::Named(type_name.clone()),
            directives: Default::default(),
        };
        (
            field_name,
            FieldConfig::new(definition).with_resolver(FieldResolver::Wrapping),
        )
    }
}

impl Transform for WrapFields {
    fn transform_schema(
        &mut self,
        schema: ComposedSchema,
    ) -> Result<ComposedSchema, TransformError> {
        let selected = schema.select_object_fields(&self.outer_type_name, |name| {
            self.field_names
                .as_ref()
                .is_none_or(|field_names| field_names.contains(name))
        })?;
        check_delimiter(selected.keys(), &self.delimiter)?;
        tracing::debug!(
            outer_type = %self.outer_type_name,
            fields = %selected.keys().join(", "),
            wrappers = %self.wrapping_field_names.iter().join("."),
            "wrapping fields"
        );

        let innermost = self.wrapping_type_names.len() - 1;
        let mut edited = schema
            .clone()
            .append_object_fields(&self.wrapping_type_names[innermost], selected.clone())?;
        for index in (0..innermost).rev() {
            edited = edited.append_object_fields(
                &self.wrapping_type_names[index],
                FieldConfigMap::from([self.wrapping_field(index + 1)]),
            )?;
        }
        let (edited, _) = edited.modify_object_fields(
            &self.outer_type_name,
            |name| selected.contains_key(name),
            FieldConfigMap::from([self.wrapping_field(0)]),
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

fn check_delimiter<'a>(
    names: impl IntoIterator<Item = &'a Name>,
    delimiter: &str,
) -> Result<(), TransformError> {
    match names.into_iter().find(|name| name.contains(delimiter)) {
        Some(name) => Err(TransformError::DelimiterInFieldName {
            name: name.to_string(),
            delimiter: delimiter.to_owned(),
        }),
        None => Ok(()),
    }
}
