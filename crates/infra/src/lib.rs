//! Infrastructure layer: storage, services, notifications, background jobs, config.
//!
//! The domain crates decide what is valid; this crate decides where rows live,
//! which transaction they are written in, and who hears about it afterwards.

pub mod aggregation;
pub mod category_tree;
pub mod config;
pub mod error;
pub mod import;
pub mod jobs;
pub mod notifications;
pub mod orders;
pub mod store;


pub use aggregation::{AveragePriceReport, PriceAggregator};
pub use category_tree::CategoryTree;
pub use config::{Config, ConfigError};
pub use error::{ServiceError, ServiceResult};
pub use import::{ImportError, ImportReport, NewProductRequest, ProductImporter, ProductPlacement, ProductRecord};
pub use notifications::{ChannelOutcome, DispatchReport, Mailer, NotificationDispatcher, SmsSender};
pub use orders::OrderService;
pub use store::{CatalogStore, InMemoryStore, PostgresStore, StoreError, StoreTx};
