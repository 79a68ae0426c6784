//! Infrastructure Database Layer
//!
//! PostgreSQL adapters for every port the totals engine consumes,
//! implemented with SQLx: the currency and tax code catalogs, the
//! document store with its transactional write session, and the audit
//! sink. The crate follows the ports-and-adapters pattern; the domain
//! defines the contracts, this crate satisfies them.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use infra_db::{create_pool_from_url, PgAuditSink, PgCurrencyCatalog, PgDocumentStore, PgTaxCodeCatalog};
//! use domain_totals::RecalculateTotals;
//!
//! let pool = create_pool_from_url("postgres://localhost/sourcing").await?;
//! let action = RecalculateTotals::new(
//!     Arc::new(PgDocumentStore::new(pool.clone())),
//!     Arc::new(PgCurrencyCatalog::new(pool.clone())),
//!     Arc::new(PgTaxCodeCatalog::new(pool.clone())),
//!     Arc::new(PgAuditSink::new(pool)),
//! );
//! ```

pub mod audit;
pub mod catalogs;
pub mod document_store;
pub mod error;
pub mod pool;

pub use audit::PgAuditSink;
pub use catalogs::{PgCurrencyCatalog, PgTaxCodeCatalog};
pub use document_store::{PgDocumentStore, PgDocumentTransaction};
pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool};
