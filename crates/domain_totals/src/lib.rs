//! Totals Domain - Monetary Totals & Tax Calculation Engine
//!
//! This crate is the calculation core of the sourcing marketplace: it
//! takes a document's priced lines and produces rounding-correct
//! subtotal, tax, and grand-total figures in both minor-unit integer and
//! decimal display form, keeping each line's persisted tax associations
//! in sync.
//!
//! # Guarantees
//!
//! - **Exactness**: all aggregation is integer arithmetic on minor units;
//!   `grand_total_minor == subtotal_minor + tax_total_minor` holds with
//!   zero tolerance after every recalculation.
//! - **Idempotence**: recalculating an unchanged document converges to
//!   identical figures and produces no second audit delta.
//! - **Auditability**: every effective recalculation emits a before/after
//!   delta restricted to the fields that changed.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_totals::RecalculateTotals;
//!
//! let action = RecalculateTotals::new(store, currencies, tax_codes, audit);
//! let summary = action.execute(document_id).await?;
//! assert_eq!(
//!     summary.totals.grand_total_minor,
//!     summary.totals.subtotal_minor + summary.totals.tax_total_minor,
//! );
//! ```

pub mod document;
pub mod error;
pub mod line;
pub mod ports;
pub mod recalculate;
pub mod tax_sync;
pub mod totals;

pub use document::{
    DocumentKind, DocumentRecord, DocumentTotalsUpdate, LineRecord, LineUpdate,
    NewTaxAssociation, TaxAssociationRecord, TaxAssociationUpdate,
};
pub use error::{CurrencyMismatch, TotalsError};
pub use line::{LineCalculator, LineInput, LineResult, TaxLine};
pub use ports::{
    AuditError, AuditFields, AuditSink, CatalogError, CurrencyCatalog, DocumentStore,
    DocumentTransaction, ResolvedTaxCode, StoreError, TaxCodeCatalog,
};
pub use recalculate::{RecalculateTotals, RecalculationSummary};
pub use tax_sync::{LineTaxSyncService, TaxSyncOutcome, TaxSyncPlan};
pub use totals::{CalculationOutcome, DocumentTotals, TotalsCalculator};
