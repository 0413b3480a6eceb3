//! Built-in demo models.
//!
//! Registered when no schema file is configured: a `user`/`post` pair with
//! timestamp roles and a one-to-many relation, enough to exercise every
//! supported action against a scratch database.

use crate::schema::{
    FieldDescriptor, FieldRole, ModelDescriptor, RelationDescriptor, RelationKind, SchemaRegistry,
};

/// Build the demo registry.
///
/// Columns deliberately keep the logical camelCase names (quoted
/// identifiers), matching the table layout the demo migrations create.
pub fn builtin_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    // Demo descriptors are static; registration cannot collide.
    let _ = registry.register(user_model());
    let _ = registry.register(post_model());
    registry
}

fn field(name: &str, role: FieldRole) -> FieldDescriptor {
    FieldDescriptor {
        name: name.to_string(),
        column: name.to_string(),
        role,
    }
}

fn user_model() -> ModelDescriptor {
    ModelDescriptor {
        name: "user".to_string(),
        table: "users".to_string(),
        fields: vec![
            field("id", FieldRole::Plain),
            field("email", FieldRole::Plain),
            field("name", FieldRole::Plain),
            field("published", FieldRole::Plain),
            field("createdAt", FieldRole::CreatedAt),
            field("updatedAt", FieldRole::UpdatedAt),
        ],
        relations: vec![RelationDescriptor {
            name: "posts".to_string(),
            kind: RelationKind::Many,
            model: "post".to_string(),
            foreign_key: "authorId".to_string(),
        }],
    }
}

fn post_model() -> ModelDescriptor {
    ModelDescriptor {
        name: "post".to_string(),
        table: "posts".to_string(),
        fields: vec![
            field("id", FieldRole::Plain),
            field("title", FieldRole::Plain),
            field("content", FieldRole::Plain),
            field("published", FieldRole::Plain),
            field("authorId", FieldRole::Plain),
            field("createdAt", FieldRole::CreatedAt),
            field("updatedAt", FieldRole::UpdatedAt),
        ],
        relations: vec![RelationDescriptor {
            name: "author".to_string(),
            kind: RelationKind::One,
            model: "user".to_string(),
            foreign_key: "authorId".to_string(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_models_registered() {
        let registry = builtin_registry();
        assert!(registry.has("user"));
        assert!(registry.has("post"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_builtin_relations_validate() {
        assert!(builtin_registry().validate().is_ok());
    }

    #[test]
    fn test_timestamp_roles() {
        let registry = builtin_registry();
        let post = registry.get("post").unwrap();
        assert_eq!(post.created_at_field().unwrap().column, "createdAt");
        assert_eq!(post.updated_at_field().unwrap().column, "updatedAt");
    }
}
