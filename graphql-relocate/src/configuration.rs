//! Declarative pipeline configuration.
//!
//! Transforms that only need names can be declared in YAML:
//!
//! ```yaml
//! transforms:
//!   - hoist_field:
//!       type_name: Query
//!       path: [a, b, c]
//!       new_field_name: c2
//!   - wrap_fields:
//!       outer_type_name: Query
//!       wrapping_field_names: [w1, w2]
//!       wrapping_type_names: [W1, W2]
//!       field_names: [x, y]
//! ```
//!
//! Transforms built from closures are only available through the API.

use apollo_compiler::Name;
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::error::TransformError;
use crate::hoist::DEFAULT_DELIMITER;
use crate::transforms::HoistField;
use crate::transforms::Pipeline;
use crate::transforms::WrapFields;

/// The transforms of a pipeline, from the source schema outwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct Configuration {
    /// Transforms, in the order their schema edits apply.
    #[serde(default)]
    pub transforms: Vec<TransformConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub enum TransformConfig {
    /// Move a nested field up to an ancestor type.
    HoistField(HoistFieldConfig),
    /// Nest fields of a type under new wrapping fields.
    WrapFields(WrapFieldsConfig),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct HoistFieldConfig {
    /// The type the hoisted field is added to.
    pub type_name: String,
    /// The field names leading from `type_name` to the hoisted field, the hoisted field last.
    pub path: Vec<String>,
    /// The name of the hoisted field on `type_name`.
    pub new_field_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct WrapFieldsConfig {
    /// The type whose fields are wrapped.
    pub outer_type_name: String,
    /// The wrapping fields, outermost first.
    pub wrapping_field_names: Vec<String>,
    /// The types of the wrapping fields, outermost first.
    pub wrapping_type_names: Vec<String>,
    /// The fields to wrap. All fields of `outer_type_name` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_names: Option<Vec<String>>,
    /// The alias delimiter used to flatten wrapped selections.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_owned()
}

impl Configuration {
    pub fn from_yaml(source: &str) -> Result<Self, TransformError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// The JSON schema of the configuration, for editors and validation tooling.
    pub fn json_schema() -> RootSchema {
        schemars::schema_for!(Configuration)
    }

    /// Builds the pipeline. Its schema edit still has to be applied.
    pub fn into_pipeline(self) -> Result<Pipeline, TransformError> {
        self.transforms
            .into_iter()
            .try_fold(Pipeline::new(), |pipeline, transform| {
                Ok(match transform {
                    TransformConfig::HoistField(config) => {
                        pipeline.with_transform(config.into_transform()?)
                    }
                    TransformConfig::WrapFields(config) => {
                        pipeline.with_transform(config.into_transform()?)
                    }
                })
            })
    }
}

impl HoistFieldConfig {
    fn into_transform(self) -> Result<HoistField, TransformError> {
        HoistField::new(
            Name::new(&self.type_name)?,
            names(&self.path)?,
            Name::new(&self.new_field_name)?,
        )
    }
}

impl WrapFieldsConfig {
    fn into_transform(self) -> Result<WrapFields, TransformError> {
        let field_names = self.field_names.as_deref().map(names).transpose()?;
        WrapFields::new(
            Name::new(&self.outer_type_name)?,
            names(&self.wrapping_field_names)?,
            names(&self.wrapping_type_names)?,
            field_names,
        )?
        .with_delimiter(self.delimiter)
    }
}

fn names(names: &[String]) -> Result<Vec<Name>, TransformError> {
    names
        .iter()
        .map(|name| Name::new(name).map_err(TransformError::from))
        .collect()
}
