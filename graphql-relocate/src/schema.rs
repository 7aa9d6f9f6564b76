//! The type graph that transforms edit.
//!
//! [`ComposedSchema`] wraps an `apollo_compiler` [`Schema`] together with the resolvers
//! installed on relocated and synthetic fields. Every edit consumes the schema and returns the
//! edited value; edits happen once, at composition time, and the result is read-only after that.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast::FieldDefinition;
use apollo_compiler::ast::NamedType;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::ObjectType;
use indexmap::IndexMap;
use serde_json_bytes::Value;

use crate::error::TransformError;
use crate::json_ext::Object;

/// A `Type.field` coordinate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldCoordinate {
    pub type_name: Name,
    pub field_name: Name,
}

impl FieldCoordinate {
    pub fn new(type_name: Name, field_name: Name) -> Self {
        Self {
            type_name,
            field_name,
        }
    }
}

impl fmt::Display for FieldCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field_name)
    }
}

/// How a relocated or synthetic field gets its value from its parent value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldResolver {
    /// Reads the field's response key from the parent object, which already holds the value
    /// returned by the delegated service.
    Merged,

    /// Like [`FieldResolver::Merged`], but resolves to an empty object when the parent is
    /// `null`, so that a wrapping level never fails on a missing ancestor.
    Wrapping,
}

impl FieldResolver {
    pub fn resolve(&self, parent: &Value, response_key: &str) -> Value {
        match (self, parent) {
            (Self::Wrapping, Value::Null) => Value::Object(Object::new()),
            (_, Value::Object(object)) => object.get(response_key).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

/// A field definition, plus the resolver to install with it.
#[derive(Clone, Debug)]
pub struct FieldConfig {
    pub definition: Component<FieldDefinition>,
    pub resolver: Option<FieldResolver>,
}

impl FieldConfig {
    pub fn new(definition: impl Into<Component<FieldDefinition>>) -> Self {
        Self {
            definition: definition.into(),
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: FieldResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// The same field under another name.
    fn renamed(self, name: &Name) -> Self {
        if &self.definition.name == name {
            return self;
        }
        let mut definition = FieldDefinition::clone(&self.definition);
        definition.name = name.clone();
        Self {
            definition: Component::new(definition),
            resolver: self.resolver,
        }
    }
}

/// Field configs keyed by field name.
pub type FieldConfigMap = IndexMap<Name, FieldConfig>;

/// What a field transformer does with one field of a composite type.
#[derive(Clone, Debug)]
pub enum FieldEdit {
    /// Leave the field as it is.
    Keep,
    /// Drop the field from the type.
    Remove,
    /// Replace the field's definition, under the same name.
    Replace(FieldDefinition),
    /// Expose the field under a new name, with the given definition.
    Rename(Name, FieldDefinition),
}

/// For each type, the fields renamed by [`ComposedSchema::map_composite_fields`], from new name
/// to original name.
pub type FieldRenames = HashMap<Name, HashMap<Name, Name>>;

#[derive(Clone, Debug)]
pub struct ComposedSchema {
    schema: Schema,
    resolvers: HashMap<FieldCoordinate, FieldResolver>,
}

impl ComposedSchema {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            resolvers: HashMap::new(),
        }
    }

    /// Parses a schema from SDL, without validating it.
    pub fn parse(source_text: &str, path: &str) -> Result<Self, TransformError> {
        let schema =
            Schema::parse(source_text, path).map_err(|err| TransformError::InvalidSchema {
                message: err.errors.to_string(),
            })?;
        Ok(Self::new(schema))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_inner(self) -> Schema {
        self.schema
    }

    /// The resolver installed on a relocated or synthetic field, if any.
    pub fn resolver(&self, type_name: &str, field_name: &str) -> Option<FieldResolver> {
        let coordinate =
            FieldCoordinate::new(Name::new(type_name).ok()?, Name::new(field_name).ok()?);
        self.resolvers.get(&coordinate).copied()
    }

    pub fn interface_names(&self) -> HashSet<Name> {
        self.schema
            .types
            .iter()
            .filter(|(_, ty)| ty.is_interface())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The named type of `type_name.field_name`, with list and non-null wrappers removed.
    pub fn field_type(&self, type_name: &str, field_name: &str) -> Option<&NamedType> {
        self.schema
            .type_field(type_name, field_name)
            .ok()
            .map(|field| field.ty.inner_named_type())
    }

    /// Follows `path` from `type_name` through the fields' named types and returns the type at
    /// the end of it.
    pub fn resolve_path(&self, type_name: &Name, path: &[Name]) -> Result<Name, TransformError> {
        path.iter().try_fold(type_name.clone(), |current, segment| {
            self.field_type(&current, segment)
                .cloned()
                .ok_or_else(|| TransformError::unresolved_path(type_name, path))
        })
    }

    fn object_type(&self, type_name: &str) -> Result<&Node<ObjectType>, TransformError> {
        match self.schema.types.get(type_name) {
            Some(ExtendedType::Object(object)) => Ok(object),
            Some(_) => Err(TransformError::NotAnObjectType {
                type_name: type_name.to_owned(),
            }),
            None => Err(TransformError::UnknownType {
                type_name: type_name.to_owned(),
            }),
        }
    }

    fn object_type_mut(&mut self, type_name: &str) -> Result<&mut ObjectType, TransformError> {
        match self.schema.types.get_mut(type_name) {
            Some(ExtendedType::Object(object)) => Ok(object.make_mut()),
            Some(_) => Err(TransformError::NotAnObjectType {
                type_name: type_name.to_owned(),
            }),
            None => Err(TransformError::UnknownType {
                type_name: type_name.to_owned(),
            }),
        }
    }

    fn field_config(&self, type_name: &Name, definition: &Component<FieldDefinition>) -> FieldConfig {
        FieldConfig {
            definition: definition.clone(),
            resolver: self
                .resolvers
                .get(&FieldCoordinate::new(type_name.clone(), definition.name.clone()))
                .copied(),
        }
    }

    /// Returns the fields of an object type matching `predicate`.
    pub fn select_object_fields(
        &self,
        type_name: &Name,
        predicate: impl Fn(&Name) -> bool,
    ) -> Result<FieldConfigMap, TransformError> {
        let object = self.object_type(type_name)?;
        Ok(object
            .fields
            .iter()
            .filter(|(name, _)| predicate(name))
            .map(|(name, definition)| (name.clone(), self.field_config(type_name, definition)))
            .collect())
    }

    /// Removes the fields of an object type matching `predicate`, returning them with the
    /// edited schema.
    pub fn remove_object_fields(
        mut self,
        type_name: &Name,
        predicate: impl Fn(&Name) -> bool,
    ) -> Result<(Self, FieldConfigMap), TransformError> {
        let removed = self.select_object_fields(type_name, &predicate)?;
        let object = self.object_type_mut(type_name)?;
        object.fields.retain(|name, _| !predicate(name));
        for name in removed.keys() {
            self.resolvers
                .remove(&FieldCoordinate::new(type_name.clone(), name.clone()));
        }
        Ok((self, removed))
    }

    /// Appends fields to an object type, creating the type when it does not exist yet. A field
    /// that already exists is replaced.
    pub fn append_object_fields(
        mut self,
        type_name: &Name,
        fields: FieldConfigMap,
    ) -> Result<Self, TransformError> {
        if !self.schema.types.contains_key(type_name) {
            tracing::debug!(%type_name, "creating object type");
            self.schema.types.insert(
                type_name.clone(),
                ExtendedType::Object(Node::new(ObjectType {
                    description: None,
                    name: type_name.clone(),
                    implements_interfaces: Default::default(),
                    directives: Default::default(),
                    fields: Default::default(),
                })),
            );
        }
        let object = self.object_type_mut(type_name)?;
        let mut resolvers = Vec::new();
        for (name, config) in fields {
            let config = config.renamed(&name);
            object.fields.insert(name.clone(), config.definition);
            resolvers.push((name, config.resolver));
        }
        for (name, resolver) in resolvers {
            let coordinate = FieldCoordinate::new(type_name.clone(), name);
            match resolver {
                Some(resolver) => self.resolvers.insert(coordinate, resolver),
                None => self.resolvers.remove(&coordinate),
            };
        }
        Ok(self)
    }

    /// Replaces the fields of an object type matching `predicate` with `new_fields`.
    pub fn modify_object_fields(
        self,
        type_name: &Name,
        predicate: impl Fn(&Name) -> bool,
        new_fields: FieldConfigMap,
    ) -> Result<(Self, FieldConfigMap), TransformError> {
        let (schema, removed) = self.remove_object_fields(type_name, predicate)?;
        Ok((schema.append_object_fields(type_name, new_fields)?, removed))
    }

    /// Offers every field of every object and interface type to `transformer` and applies the
    /// returned edits. Returns the renamed fields alongside the edited schema.
    pub fn map_composite_fields(
        mut self,
        mut transformer: impl FnMut(&Name, &Name, &FieldDefinition) -> FieldEdit,
    ) -> Result<(Self, FieldRenames), TransformError> {
        let mut renames = FieldRenames::new();
        let type_names = self
            .schema
            .types
            .iter()
            .filter(|(_, ty)| ty.is_object() || ty.is_interface())
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();

        for type_name in type_names {
            let fields = match self.schema.types.get(&type_name) {
                Some(ExtendedType::Object(object)) => object.fields.clone(),
                Some(ExtendedType::Interface(interface)) => interface.fields.clone(),
                _ => continue,
            };

            let mut changed = false;
            let mut new_fields = fields.clone();
            new_fields.clear();
            for (field_name, definition) in fields {
                match transformer(&type_name, &field_name, &definition) {
                    FieldEdit::Keep => {
                        new_fields.insert(field_name, definition);
                    }
                    FieldEdit::Remove => {
                        changed = true;
                        self.resolvers
                            .remove(&FieldCoordinate::new(type_name.clone(), field_name));
                    }
                    FieldEdit::Replace(mut replacement) => {
                        changed = true;
                        replacement.name = field_name.clone();
                        new_fields.insert(field_name, Component::new(replacement));
                    }
                    FieldEdit::Rename(new_name, mut replacement) => {
                        changed = true;
                        replacement.name = new_name.clone();
                        if let Some(resolver) = self
                            .resolvers
                            .remove(&FieldCoordinate::new(type_name.clone(), field_name.clone()))
                        {
                            self.resolvers.insert(
                                FieldCoordinate::new(type_name.clone(), new_name.clone()),
                                resolver,
                            );
                        }
                        renames
                            .entry(type_name.clone())
                            .or_default()
                            .insert(new_name.clone(), field_name);
                        new_fields.insert(new_name, Component::new(replacement));
                    }
                }
            }

            if !changed {
                continue;
            }
            match self.schema.types.get_mut(&type_name) {
                Some(ExtendedType::Object(object)) => object.make_mut().fields = new_fields,
                Some(ExtendedType::Interface(interface)) => {
                    interface.make_mut().fields = new_fields
                }
                _ => {}
            }
        }
        Ok((self, renames))
    }
}

impl From<Schema> for ComposedSchema {
    fn from(schema: Schema) -> Self {
        Self::new(schema)
    }
}
