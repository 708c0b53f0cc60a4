use serde::{Deserialize, Serialize};

use storefront_core::{CategoryId, DomainError, DomainResult, Entity};

/// A node in the category forest.
///
/// A category references its parent but does not own it; children are found
/// by querying for categories whose `parent` is this node. `(name, parent)` is
/// unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub parent: Option<CategoryId>,
}

impl Category {
    /// Build a new, not yet persisted category under `parent`.
    pub fn new(name: impl Into<String>, parent: Option<CategoryId>) -> DomainResult<Self> {
        let name = name.into();
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("category name cannot be empty"));
        }

        let id = CategoryId::new();
        if parent == Some(id) {
            return Err(DomainError::invariant("category cannot be its own parent"));
        }

        Ok(Self {
            id,
            name: name.to_string(),
            parent,
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_name() {
        let c = Category::new("  Bakery ", None).unwrap();
        assert_eq!(c.name, "Bakery");
        assert!(c.is_root());
    }

    #[test]
    fn new_rejects_blank_name() {
        let err = Category::new("   ", None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn child_keeps_parent_reference() {
        let root = Category::new("All Products", None).unwrap();
        let child = Category::new("Bakery", Some(root.id)).unwrap();
        assert_eq!(child.parent, Some(root.id));
        assert!(!child.is_root());
    }
}
