//! Category tree service: path upsert and descendant enumeration.

use std::collections::HashSet;

use tracing::{debug, instrument, warn};

use storefront_catalog::{Category, CategoryPath, DescendantWalk};
use storefront_core::CategoryId;

use crate::error::{ServiceError, ServiceResult};
use crate::store::{CatalogStore, StoreError, StoreTx};

/// Category tree operations over a [`CatalogStore`].
#[derive(Debug, Clone)]
pub struct CategoryTree<S> {
    store: S,
    max_attempts: u32,
}

impl<S: CatalogStore> CategoryTree<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: 3,
        }
    }

    /// Attempts before a repeatedly conflicting path resolution gives up.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve `path` to its leaf category, creating missing nodes.
    ///
    /// Runs in its own transaction. A uniqueness conflict means a concurrent
    /// caller created one of the nodes first: the transaction is discarded and
    /// the walk restarts, this time finding the committed rows.
    #[instrument(skip(self), fields(path = %path), err)]
    pub async fn get_or_create_path(&self, path: &CategoryPath) -> ServiceResult<Category> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_resolve(path).await {
                Ok(leaf) => return Ok(leaf),
                Err(StoreError::Conflict(reason)) if attempt < self.max_attempts => {
                    debug!(attempt, %reason, "category path conflict, retrying");
                }
                Err(err) => {
                    if err.is_conflict() {
                        warn!(attempt, error = %err, "category path still conflicting, giving up");
                    }
                    return Err(err.into());
                }
            }
        }
    }

    async fn try_resolve(&self, path: &CategoryPath) -> Result<Category, StoreError> {
        let mut tx = self.store.begin().await?;
        let leaf = resolve_in(&mut tx, path).await?;
        tx.commit().await?;
        Ok(leaf)
    }

    /// Leaf of `path` if every segment already exists. Creates nothing.
    pub async fn find_path(&self, path: &CategoryPath) -> ServiceResult<Option<Category>> {
        let mut tx = self.store.begin().await?;
        let mut parent: Option<CategoryId> = None;
        let mut current = None;
        for name in path.segments() {
            match tx.find_category(name, parent).await? {
                Some(node) => {
                    parent = Some(node.id);
                    current = Some(node);
                }
                None => return Ok(None),
            }
        }
        Ok(current)
    }

    /// Ids of `root` and every category below it.
    ///
    /// An unknown root yields just `{root}`; use [`CategoryTree::get_category`]
    /// when existence matters.
    #[instrument(skip(self), fields(root = %root), err)]
    pub async fn descendant_ids(&self, root: CategoryId) -> ServiceResult<HashSet<CategoryId>> {
        let mut tx = self.store.begin().await?;
        let walk = walk_from(&mut tx, root).await?;
        Ok(walk.into_set())
    }

    /// `root` and every category below it, root first, breadth-first.
    #[instrument(skip(self), fields(root = %root), err)]
    pub async fn descendants(&self, root: CategoryId) -> ServiceResult<Vec<Category>> {
        let mut tx = self.store.begin().await?;
        let walk = walk_from(&mut tx, root).await?;

        let mut out = Vec::with_capacity(walk.visited_in_order().len());
        for id in walk.visited_in_order() {
            if let Some(category) = tx.get_category(*id).await? {
                out.push(category);
            }
        }
        Ok(out)
    }

    pub async fn get_category(&self, id: CategoryId) -> ServiceResult<Category> {
        let mut tx = self.store.begin().await?;
        tx.get_category(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("category {id}")))
    }
}

/// Walk `path` inside `tx`, creating each missing `(name, parent)` node.
pub(crate) async fn resolve_in<T: StoreTx>(
    tx: &mut T,
    path: &CategoryPath,
) -> Result<Category, StoreError> {
    let mut parent: Option<CategoryId> = None;
    let mut current: Option<Category> = None;

    for name in path.segments() {
        let node = match tx.find_category(name, parent).await? {
            Some(existing) => existing,
            None => {
                let created = Category::new(name.as_str(), parent)
                    .map_err(|e| StoreError::Integrity(e.message()))?;
                tx.insert_category(&created).await?;
                debug!(category_id = %created.id, name = %created.name, "created category");
                created
            }
        };
        parent = Some(node.id);
        current = Some(node);
    }

    // CategoryPath is never empty.
    current.ok_or_else(|| StoreError::Integrity("empty category path".to_string()))
}

pub(crate) async fn walk_from<T: StoreTx>(
    tx: &mut T,
    root: CategoryId,
) -> Result<DescendantWalk, StoreError> {
    let mut walk = DescendantWalk::new(root);
    while let Some(parent) = walk.next_parent() {
        let children = tx.child_categories(parent).await?;
        walk.push_children(children.into_iter().map(|c| c.id));
    }
    Ok(walk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FailPoint, InMemoryStore};
    use std::sync::Arc;

    fn path(s: &str) -> CategoryPath {
        CategoryPath::parse(s).unwrap()
    }

    #[tokio::test]
    async fn creates_each_prefix_once() {
        let store = InMemoryStore::arc();
        let tree = CategoryTree::new(store.clone());

        let leaf = tree
            .get_or_create_path(&path("All Products > Bakery > Bread"))
            .await
            .unwrap();
        assert_eq!(leaf.name, "Bread");
        assert_eq!(store.category_count(), 3);

        let again = tree
            .get_or_create_path(&path("All Products/Bakery/Bread"))
            .await
            .unwrap();
        assert_eq!(again.id, leaf.id);
        assert_eq!(store.category_count(), 3);
    }

    #[tokio::test]
    async fn shared_prefix_is_reused() {
        let store = InMemoryStore::arc();
        let tree = CategoryTree::new(store.clone());

        let bread = tree
            .get_or_create_path(&path("All Products>Bakery>Bread"))
            .await
            .unwrap();
        let fruits = tree
            .get_or_create_path(&path("All Products|Produce|Fruits"))
            .await
            .unwrap();
        assert_ne!(bread.id, fruits.id);
        assert_eq!(store.category_count(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolution_converges_on_one_leaf() {
        let store = InMemoryStore::arc();
        let tree = Arc::new(CategoryTree::new(store.clone()).with_max_attempts(10));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let tree = tree.clone();
            handles.push(tokio::spawn(async move {
                tree.get_or_create_path(&path("All Products > Bakery > Bread"))
                    .await
            }));
        }

        let mut leaves = HashSet::new();
        for h in handles {
            leaves.insert(h.await.unwrap().unwrap().id);
        }
        assert_eq!(leaves.len(), 1);
        assert_eq!(store.category_count(), 3);
    }

    #[tokio::test]
    async fn descendants_of_chain_include_every_level() {
        let store = InMemoryStore::arc();
        let tree = CategoryTree::new(store.clone());
        let c = tree.get_or_create_path(&path("A > B > C")).await.unwrap();
        let a = tree.get_or_create_path(&path("A")).await.unwrap();
        let b = c.parent.unwrap();

        let ids = tree.descendant_ids(a.id).await.unwrap();
        assert!(ids.contains(&a.id));
        assert!(ids.contains(&b));
        assert!(ids.contains(&c.id));

        let names: Vec<String> = tree
            .descendants(a.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn find_path_does_not_create() {
        let store = InMemoryStore::arc();
        let tree = CategoryTree::new(store.clone());
        assert!(tree.find_path(&path("A > B")).await.unwrap().is_none());
        assert_eq!(store.category_count(), 0);

        let b = tree.get_or_create_path(&path("A > B")).await.unwrap();
        assert_eq!(tree.find_path(&path("A/B")).await.unwrap(), Some(b));
        assert!(tree.find_path(&path("A > C")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_root_yields_singleton() {
        let tree = CategoryTree::new(InMemoryStore::arc());
        let ghost = CategoryId::new();
        let ids = tree.descendant_ids(ghost).await.unwrap();
        assert_eq!(ids, HashSet::from([ghost]));

        let err = tree.get_category(ghost).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_infrastructure() {
        let store = InMemoryStore::arc();
        store.fail_on(FailPoint::InsertCategory);
        let tree = CategoryTree::new(store.clone());

        let err = tree.get_or_create_path(&path("Bakery")).await.unwrap_err();
        assert!(err.is_infrastructure());
        assert_eq!(store.category_count(), 0);
    }
}
