//! Bulk product import.
//!
//! Rows are validated one by one as they are read; a bad row is reported and
//! skipped without affecting its siblings. A run has two phases. First every
//! valid row's category path is resolved through [`CategoryTree`], each in its
//! own short transaction. Then the products are inserted in one transaction
//! that commits at the end. At most one transaction is open at any moment, so
//! an import never waits on a second pooled connection while holding the
//! first. A storage failure aborts the run and rolls back all of its products.

pub mod tabular;

use std::io::Read;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use storefront_auth::{Permission, Principal, authorize};
use storefront_catalog::{CategoryPathInput, NewProduct, Product, ProductDraft};
use storefront_core::{CategoryId, DomainError, DomainResult, Price, ProductId};

use crate::category_tree::CategoryTree;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{CatalogStore, StoreTx};

pub use tabular::{
    CsvRead, CsvRow, CsvRows, REQUIRED_COLUMNS, RowOutcome, TEMPLATE_COLUMNS, csv_template, read_csv,
};

/// Index reported for errors that concern the upload as a whole.
pub const HEADER_ERROR_INDEX: i64 = -1;

/// A row's position and its validated draft or rejection message.
type DraftRow = (i64, Result<ProductDraft, String>);

/// A rejected row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportError {
    /// CSV: record position with the header as 1. JSON: 0-based array index.
    /// `-1` for header-level problems.
    pub index: i64,
    pub message: String,
}

/// Outcome of an import run; both lists are in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub created_ids: Vec<ProductId>,
    pub errors: Vec<ImportError>,
}

/// One element of a JSON bulk upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stock_quantity: Option<u32>,
    pub category_path: CategoryPathInput,
}

impl ProductRecord {
    /// Validate in the same order as a CSV row: name, price, path.
    pub fn into_draft(self) -> DomainResult<ProductDraft> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name is required"));
        }
        let price = Price::new(self.price)?;
        ProductDraft::from_parts(
            &self.name,
            price,
            self.category_path,
            self.description.as_deref(),
            self.stock_quantity,
        )
    }
}

/// Where a directly created product goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductPlacement {
    /// Resolve (and create if needed) a category path.
    Path(CategoryPathInput),
    /// An existing category.
    Category(CategoryId),
}

/// Request to create a single product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProductRequest {
    pub name: String,
    pub price: Price,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stock_quantity: Option<u32>,
    pub placement: ProductPlacement,
}

/// Product upload service. Callers need the `catalog.import` permission.
#[derive(Debug, Clone)]
pub struct ProductImporter<S> {
    store: S,
    tree: CategoryTree<S>,
}

impl<S: CatalogStore + Clone> ProductImporter<S> {
    pub fn new(store: S, tree: CategoryTree<S>) -> Self {
        Self { store, tree }
    }

    /// Import a CSV upload. Row indices start at 2.
    #[instrument(skip(self, caller, source), fields(principal = %caller.principal_id), err)]
    pub async fn import_csv<R: Read + Send>(
        &self,
        caller: &Principal,
        source: R,
    ) -> ServiceResult<ImportReport> {
        authorize(caller, &Permission::IMPORT_PRODUCTS)?;

        let read = read_csv(source)
            .map_err(|e| ServiceError::Validation(format!("unreadable CSV: {e}")))?;

        let rows = match read {
            CsvRead::MissingColumns(missing) => {
                info!(missing = ?missing, "CSV upload rejected");
                return Ok(ImportReport {
                    created_ids: Vec::new(),
                    errors: vec![ImportError {
                        index: HEADER_ERROR_INDEX,
                        message: format!("Missing columns: {}", missing.join(", ")),
                    }],
                });
            }
            CsvRead::Rows(rows) => rows,
        };

        let drafts = rows.map(|row| -> ServiceResult<DraftRow> {
            let row = row.map_err(|e| ServiceError::Validation(format!("unreadable CSV: {e}")))?;
            Ok(match row {
                Ok(row) => {
                    let draft = ProductDraft::from_text(
                        row.get("name"),
                        row.get("price"),
                        row.get("category_path"),
                        row.get("description"),
                        row.get("stock_quantity"),
                    )
                    .map_err(|e| e.message());
                    (row.index, draft)
                }
                Err((index, message)) => (index, Err(message)),
            })
        });

        self.import_drafts(drafts).await
    }

    /// Import already-typed records. Indices are 0-based positions.
    #[instrument(skip(self, caller, records), fields(records = records.len()), err)]
    pub async fn import_records(
        &self,
        caller: &Principal,
        records: Vec<ProductRecord>,
    ) -> ServiceResult<ImportReport> {
        authorize(caller, &Permission::IMPORT_PRODUCTS)?;

        let drafts = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| -> ServiceResult<DraftRow> {
                Ok((i as i64, record.into_draft().map_err(|e| e.message())))
            });
        self.import_drafts(drafts).await
    }

    /// Import a JSON array body. An element that does not deserialize is a
    /// row error like any other; a body that is not an array is rejected.
    #[instrument(skip(self, caller, body), err)]
    pub async fn import_json(&self, caller: &Principal, body: &str) -> ServiceResult<ImportReport> {
        authorize(caller, &Permission::IMPORT_PRODUCTS)?;

        let items: Vec<serde_json::Value> = serde_json::from_str(body)
            .map_err(|e| ServiceError::Validation(format!("expected a JSON list of products: {e}")))?;

        let drafts = items
            .into_iter()
            .enumerate()
            .map(|(i, value)| -> ServiceResult<DraftRow> {
                let draft = serde_json::from_value::<ProductRecord>(value)
                    .map_err(|e| e.to_string())
                    .and_then(|record| record.into_draft().map_err(|e| e.message()));
                Ok((i as i64, draft))
            });
        self.import_drafts(drafts).await
    }

    /// Create one product, either under a category path or an existing
    /// category.
    #[instrument(skip(self, caller, request), fields(name = %request.name), err)]
    pub async fn create_product(
        &self,
        caller: &Principal,
        request: NewProductRequest,
    ) -> ServiceResult<Product> {
        authorize(caller, &Permission::IMPORT_PRODUCTS)?;

        let new_product = match request.placement {
            ProductPlacement::Path(path) => {
                let draft = ProductDraft::from_parts(
                    &request.name,
                    request.price,
                    path,
                    request.description.as_deref(),
                    request.stock_quantity,
                )?;
                let leaf = self.tree.get_or_create_path(&draft.category_path).await?;
                draft.resolve(leaf.id)
            }
            ProductPlacement::Category(id) => {
                let category = self.tree.get_category(id).await?;
                NewProduct::new(
                    &request.name,
                    request.description.as_deref(),
                    request.price,
                    category.id,
                    request.stock_quantity.unwrap_or(0),
                )?
            }
        };

        let product = new_product.into_product();
        let mut tx = self.store.begin().await?;
        tx.insert_product(&product).await?;
        tx.commit().await?;

        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    async fn import_drafts<I>(&self, rows: I) -> ServiceResult<ImportReport>
    where
        I: IntoIterator<Item = ServiceResult<DraftRow>>,
    {
        let mut report = ImportReport::default();
        let mut products = Vec::new();

        for row in rows {
            let (index, draft) = row?;
            let draft = match draft {
                Ok(draft) => draft,
                Err(message) => {
                    debug!(row = index, %message, "row rejected");
                    report.errors.push(ImportError { index, message });
                    continue;
                }
            };

            // Only storage failures can come back from here; they end the run
            // before any product is written.
            let leaf = self.tree.get_or_create_path(&draft.category_path).await?;
            products.push(draft.resolve(leaf.id).into_product());
        }

        let mut tx = self.store.begin().await?;
        for product in &products {
            tx.insert_product(product).await?;
        }
        tx.commit().await?;

        report.created_ids = products.iter().map(|p| p.id).collect();
        info!(
            created = report.created_ids.len(),
            rejected = report.errors.len(),
            "product import finished"
        );
        Ok(report)
    }
}
