//! Catalog domain module.
//!
//! This crate contains business rules for the category tree and products,
//! implemented purely as deterministic domain logic (no IO, no storage).

pub mod category;
pub mod path;
pub mod pricing;
pub mod product;
pub mod tree;

pub use category::Category;
pub use path::{CategoryPath, CategoryPathInput, PATH_SEPARATORS};
pub use pricing::{PriceAverage, round_to_price_scale};
pub use product::{NewProduct, Product, ProductDraft};
pub use tree::{DescendantWalk, descendant_ids_in};
