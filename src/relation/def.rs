//! RelationDef struct for storing relationship metadata
//!
//! A `RelationDef` describes one relation of a parent model: its type, the
//! attribute on the child that points back to the parent, and the factory that
//! constructs fresh child instances for posted rows.

use crate::active_model::{ActiveModelError, ActiveModelTrait};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Type of relationship between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// One-to-one relationship
    HasOne,
    /// One-to-many relationship
    HasMany,
    /// Many-to-one relationship (belongs_to)
    BelongsTo,
}

/// Defines a relationship from a parent model to its child type `C`
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tabular::{ActiveModelTrait, RelationDef, RelationType};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct InvoiceLine { id: Option<i64>, invoice_id: Option<i64>, sku: String }
/// impl ActiveModelTrait for InvoiceLine { type Id = i64; }
///
/// let rel_def = RelationDef::<InvoiceLine>::has_many("lines", "invoice_id");
/// assert_eq!(rel_def.rel_type, RelationType::HasMany);
/// assert_eq!(rel_def.references, "id");
/// ```
#[derive(Clone)]
pub struct RelationDef<C> {
    /// Type of relationship
    pub rel_type: RelationType,
    /// Relation name as registered on the parent
    pub name: String,
    /// Attribute on the child holding the parent's key
    pub foreign_key: String,
    /// Attribute on the parent the foreign key refers to
    pub references: String,
    factory: Arc<dyn Fn() -> C + Send + Sync>,
}

impl<C> std::fmt::Debug for RelationDef<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationDef")
            .field("rel_type", &self.rel_type)
            .field("name", &self.name)
            .field("foreign_key", &self.foreign_key)
            .field("references", &self.references)
            .finish()
    }
}

impl<C: ActiveModelTrait> RelationDef<C> {
    /// Create a relation whose child instances are built by `factory`
    pub fn new<F>(rel_type: RelationType, name: &str, foreign_key: &str, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            rel_type,
            name: name.to_string(),
            foreign_key: foreign_key.to_string(),
            references: "id".to_string(),
            factory: Arc::new(factory),
        }
    }

    /// One-to-many relation constructing children with `C::default()`
    pub fn has_many(name: &str, foreign_key: &str) -> Self
    where
        C: Default,
    {
        Self::new(RelationType::HasMany, name, foreign_key, C::default)
    }

    /// Point the foreign key at a parent attribute other than `id`
    #[must_use]
    pub fn references(mut self, attribute: &str) -> Self {
        self.references = attribute.to_string();
        self
    }

    /// Replace the child factory
    #[must_use]
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.factory = Arc::new(factory);
        self
    }

    /// Construct a fresh child instance for an insert row
    pub fn new_model(&self) -> C {
        (self.factory)()
    }

    /// Value of the referenced parent attribute, `None` while the parent is unsaved
    pub fn parent_key<P: ActiveModelTrait>(
        &self,
        parent: &P,
    ) -> Result<Option<JsonValue>, ActiveModelError> {
        match parent.attribute(&self.references)? {
            Some(JsonValue::Null) => Ok(None),
            Some(value) => Ok(Some(value)),
            None => Err(ActiveModelError::AttributeNotFound(self.references.clone())),
        }
    }

    /// Set the child's foreign key to the parent's key
    pub fn assign_foreign_key<P: ActiveModelTrait>(
        &self,
        child: &mut C,
        parent: &P,
    ) -> Result<(), ActiveModelError> {
        let key = self
            .parent_key(parent)?
            .ok_or(ActiveModelError::PrimaryKeyRequired)?;
        child.set_attribute(&self.foreign_key, key)
    }

    /// Whether the child currently points at this parent
    pub fn is_linked<P: ActiveModelTrait>(&self, child: &C, parent: &P) -> bool {
        let Ok(Some(key)) = self.parent_key(parent) else {
            return false;
        };
        matches!(child.attribute(&self.foreign_key), Ok(Some(value)) if value == key)
    }
}
