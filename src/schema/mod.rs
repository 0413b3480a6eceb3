//! Static schema descriptors and registry.
//!
//! Every compiled statement resolves its table and column identifiers
//! through a `ModelDescriptor`; identifiers never come from pasted text.
//! The registry is populated once at startup, either from a YAML file or
//! from the built-in demo models, and never mutated afterwards.

pub mod builtin;

use crate::types::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Role a field plays beyond plain storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldRole {
    Plain,
    /// Auto-populated with the current instant on create
    CreatedAt,
    /// Auto-populated with the current instant on create and update
    UpdatedAt,
}

impl Default for FieldRole {
    fn default() -> Self {
        Self::Plain
    }
}

/// One logical field and its physical column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Logical name used in payloads
    pub name: String,
    /// Physical column name
    pub column: String,
    #[serde(default)]
    pub role: FieldRole,
}

/// Relation cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    One,
    Many,
}

/// A named relation to another model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDescriptor {
    pub name: String,
    pub kind: RelationKind,
    /// Target logical model name
    pub model: String,
    /// Logical field holding the foreign key (on the target model for
    /// `many`, on this model for `one`)
    pub foreign_key: String,
}

/// Immutable metadata for one logical model.
///
/// Field order is significant: payload keys are translated in descriptor
/// order only for auto-populated fields; everything else follows payload
/// encounter order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Logical model name (payload-facing)
    pub name: String,
    /// Physical table name
    pub table: String,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub relations: Vec<RelationDescriptor>,
}

impl ModelDescriptor {
    /// Look up a field by logical name.
    pub fn field(&self, logical: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == logical)
    }

    /// Physical column for a logical field name.
    pub fn column_for(&self, logical: &str) -> Option<&str> {
        self.field(logical).map(|f| f.column.as_str())
    }

    /// First field carrying the creation-timestamp role.
    pub fn created_at_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.role == FieldRole::CreatedAt)
    }

    /// First field carrying the update-timestamp role.
    pub fn updated_at_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.role == FieldRole::UpdatedAt)
    }
}

/// Registry mapping logical model names to descriptors.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    models: HashMap<String, ModelDescriptor>,
}

/// Top-level shape of a schema YAML file.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    models: Vec<ModelDescriptor>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model descriptor.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Schema` on duplicate model names or duplicate
    /// logical field names within the model.
    pub fn register(&mut self, model: ModelDescriptor) -> Result<()> {
        if self.models.contains_key(&model.name) {
            return Err(EngineError::schema(format!(
                "duplicate model '{}'",
                model.name
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &model.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(EngineError::schema(format!(
                    "duplicate field '{}' on model '{}'",
                    field.name, model.name
                )));
            }
        }
        self.models.insert(model.name.clone(), model);
        Ok(())
    }

    /// Get a descriptor by logical model name.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownModel` if the model is not registered.
    pub fn get(&self, name: &str) -> Result<&ModelDescriptor> {
        self.models
            .get(name)
            .ok_or_else(|| EngineError::UnknownModel(name.to_string()))
    }

    /// Check whether a model is registered.
    pub fn has(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Validate cross-model references: every relation must target a
    /// registered model, and the foreign-key field must exist on the side
    /// that holds it.
    pub fn validate(&self) -> Result<()> {
        for model in self.models.values() {
            for relation in &model.relations {
                let target = self.models.get(&relation.model).ok_or_else(|| {
                    EngineError::schema(format!(
                        "relation '{}' on model '{}' targets unknown model '{}'",
                        relation.name, model.name, relation.model
                    ))
                })?;
                let holder = match relation.kind {
                    RelationKind::Many => target,
                    RelationKind::One => model,
                };
                if holder.field(&relation.foreign_key).is_none() {
                    return Err(EngineError::schema(format!(
                        "relation '{}' on model '{}' names missing foreign key field '{}'",
                        relation.name, model.name, relation.foreign_key
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build a registry from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: SchemaFile = serde_yaml::from_str(text)?;
        let mut registry = Self::new();
        for model in file.models {
            registry.register(model)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Build a registry from a YAML file on disk.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}
