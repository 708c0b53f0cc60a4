//! Records with identity.

use std::collections::HashMap;
use std::hash::Hash;

/// A record identified by its id rather than its contents.
///
/// Categories, products, customers and orders are entities: two records with
/// the same id are the same record, whatever their other fields say. A renamed
/// product is still the product its order lines point at.
pub trait Entity {
    type Id: Copy + Eq + Hash + core::fmt::Debug + core::fmt::Display;

    fn id(&self) -> &Self::Id;
}

/// Index entities by id. A later duplicate replaces an earlier one.
pub fn index_by_id<E, I>(entities: I) -> HashMap<E::Id, E>
where
    E: Entity,
    I: IntoIterator<Item = E>,
{
    entities.into_iter().map(|e| (*e.id(), e)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProductId;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: ProductId,
        name: &'static str,
    }

    impl Entity for Row {
        type Id = ProductId;

        fn id(&self) -> &ProductId {
            &self.id
        }
    }

    #[test]
    fn index_keeps_last_record_per_id() {
        let id = ProductId::new();
        let other = ProductId::new();
        let index = index_by_id(vec![
            Row { id, name: "Lamp" },
            Row { id: other, name: "Desk" },
            Row { id, name: "Desk Lamp" },
        ]);

        assert_eq!(index.len(), 2);
        assert_eq!(index[&id].name, "Desk Lamp");
        assert_eq!(index[&other].name, "Desk");
    }
}
