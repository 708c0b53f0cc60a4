use serde::{Deserialize, Serialize};

use storefront_core::{CategoryId, DomainError, DomainResult, Entity, Price, ProductId};

use crate::path::{CategoryPath, CategoryPathInput};

/// A catalog product.
///
/// `category` is optional: removing a category nulls the reference instead of
/// deleting its products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub category: Option<CategoryId>,
    pub stock_quantity: u32,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A validated product whose category has been resolved, ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    name: String,
    description: Option<String>,
    price: Price,
    category: CategoryId,
    stock_quantity: u32,
}

impl NewProduct {
    pub fn new(
        name: &str,
        description: Option<&str>,
        price: Price,
        category: CategoryId,
        stock_quantity: u32,
    ) -> DomainResult<Self> {
        Ok(Self {
            name: validate_name(name)?,
            description: normalize_description(description),
            price,
            category,
            stock_quantity,
        })
    }

    pub fn category(&self) -> CategoryId {
        self.category
    }

    /// Assign an identity; the result is what the store persists.
    pub fn into_product(self) -> Product {
        Product {
            id: ProductId::new(),
            name: self.name,
            description: self.description,
            price: self.price,
            category: Some(self.category),
            stock_quantity: self.stock_quantity,
        }
    }
}

/// Product fields validated before its category path has been resolved.
///
/// Validation order mirrors how an import row is read: name, price, category
/// path, then stock quantity. The first failure is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDraft {
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub category_path: CategoryPath,
    pub stock_quantity: u32,
}

impl ProductDraft {
    /// Validate textual fields as they arrive from a tabular source.
    pub fn from_text(
        name: Option<&str>,
        price: Option<&str>,
        category_path: Option<&str>,
        description: Option<&str>,
        stock_quantity: Option<&str>,
    ) -> DomainResult<Self> {
        let name = validate_name(name.unwrap_or_default())?;
        let price = Price::parse(price.unwrap_or_default())?;
        let category_path = CategoryPath::parse(category_path.unwrap_or_default())?;
        let stock_quantity = parse_stock_quantity(stock_quantity)?;

        Ok(Self {
            name,
            description: normalize_description(description),
            price,
            category_path,
            stock_quantity,
        })
    }

    /// Validate already-typed fields (e.g. from a JSON body).
    pub fn from_parts(
        name: &str,
        price: Price,
        category_path: CategoryPathInput,
        description: Option<&str>,
        stock_quantity: Option<u32>,
    ) -> DomainResult<Self> {
        Ok(Self {
            name: validate_name(name)?,
            description: normalize_description(description),
            price,
            category_path: category_path.into_path()?,
            stock_quantity: stock_quantity.unwrap_or(0),
        })
    }

    /// Bind the draft to the leaf category its path resolved to.
    pub fn resolve(self, category: CategoryId) -> NewProduct {
        NewProduct {
            name: self.name,
            description: self.description,
            price: self.price,
            category,
            stock_quantity: self.stock_quantity,
        }
    }
}

fn validate_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name is required"));
    }
    Ok(name.to_string())
}

fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

fn parse_stock_quantity(raw: Option<&str>) -> DomainResult<u32> {
    match raw.map(str::trim) {
        None | Some("") => Ok(0),
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| DomainError::validation("stock_quantity must be a non-negative integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_draft(
        name: &str,
        price: &str,
        path: &str,
        stock: Option<&str>,
    ) -> DomainResult<ProductDraft> {
        ProductDraft::from_text(Some(name), Some(price), Some(path), None, stock)
    }

    #[test]
    fn valid_row_builds_draft() {
        let draft = ProductDraft::from_text(
            Some(" Baguette "),
            Some("2.50"),
            Some("All Products>Bakery>Bread"),
            Some("Fresh"),
            Some("10"),
        )
        .unwrap();

        assert_eq!(draft.name, "Baguette");
        assert_eq!(draft.price.to_string(), "2.50");
        assert_eq!(draft.category_path.leaf(), "Bread");
        assert_eq!(draft.description.as_deref(), Some("Fresh"));
        assert_eq!(draft.stock_quantity, 10);
    }

    #[test]
    fn stock_quantity_defaults_to_zero() {
        assert_eq!(text_draft("Apple", "0.80", "Produce", None).unwrap().stock_quantity, 0);
        assert_eq!(text_draft("Apple", "0.80", "Produce", Some(" ")).unwrap().stock_quantity, 0);
    }

    #[test]
    fn rejects_negative_or_fractional_stock() {
        for raw in ["-1", "2.5", "lots"] {
            let err = text_draft("Apple", "0.80", "Produce", Some(raw)).unwrap_err();
            assert_eq!(
                err,
                DomainError::validation("stock_quantity must be a non-negative integer")
            );
        }
    }

    #[test]
    fn name_is_checked_before_price() {
        let err = text_draft(" ", "abc", "Produce", None).unwrap_err();
        assert_eq!(err.message(), "name is required");
    }

    #[test]
    fn non_numeric_price_is_reported() {
        let err = text_draft("Apple", "cheap", "Produce", None).unwrap_err();
        assert_eq!(err.message(), "price must be a decimal number");
    }

    #[test]
    fn empty_path_is_reported() {
        let err = text_draft("Apple", "1.00", " > ", None).unwrap_err();
        assert!(matches!(err, DomainError::InvalidPath(_)));
        assert_eq!(err.message(), "category_path is required");
    }

    #[test]
    fn blank_description_becomes_none() {
        let draft =
            ProductDraft::from_text(Some("Apple"), Some("1"), Some("Produce"), Some("  "), None)
                .unwrap();
        assert_eq!(draft.description, None);
    }

    #[test]
    fn resolve_binds_category_and_assigns_identity() {
        let category = CategoryId::new();
        let product = text_draft("Apple", "1.00", "Produce", Some("3"))
            .unwrap()
            .resolve(category)
            .into_product();

        assert_eq!(product.category, Some(category));
        assert_eq!(product.stock_quantity, 3);
    }

    #[test]
    fn new_product_requires_name() {
        let err = NewProduct::new("", None, Price::ZERO, CategoryId::new(), 0).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
