//! Ports consumed by the totals engine
//!
//! The engine is a library, not a service: currency data, tax rates,
//! document storage, and audit recording are all contracts implemented by
//! the host application. Each port lives here so the domain owns the
//! contract and adapters (PostgreSQL, in-memory, external APIs) depend on
//! the domain rather than the other way around.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use core_kernel::{CurrencyCode, DocumentId, LineId, Rate, TaxAssociationId, TaxCodeId};

use crate::document::{
    DocumentRecord, DocumentTotalsUpdate, LineUpdate, NewTaxAssociation, TaxAssociationRecord,
    TaxAssociationUpdate,
};

/// Field map carried by audit records
///
/// A `BTreeMap` rather than a `HashMap` so serialized deltas list fields
/// in a stable order, which keeps audit logs reproducible across runs.
pub type AuditFields = BTreeMap<String, Value>;

/// Error type for catalog collaborators
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The lookup itself failed (connection, query, decode)
    #[error("Catalog lookup failed: {0}")]
    Lookup(String),

    /// The catalog returned a row the engine cannot accept
    #[error("Catalog entry for {entity} {id} is invalid: {message}")]
    InvalidEntry {
        entity: &'static str,
        id: String,
        message: String,
    },
}

/// Error type for storage collaborators
#[derive(Debug, Error)]
pub enum StoreError {
    /// A read or write failed
    #[error("Storage query failed: {0}")]
    Query(String),

    /// Beginning, committing, or rolling back a transaction failed
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// A referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Error type for the audit sink
///
/// Audit failures are logged by the engine and never propagated as
/// computation errors.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit sink failure: {0}")]
    Sink(String),
}

/// A tax code as resolved from the tax catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTaxCode {
    pub id: TaxCodeId,
    /// The tax rate as an exact fraction
    pub rate: Rate,
    /// Compounding codes are computed on the line subtotal plus all prior
    /// non-compounding tax amounts, in catalog-declared order
    pub compounding: bool,
    /// Catalog-declared ordering among a line's tax codes
    pub position: i32,
}

/// Resolves currency codes to their minor-unit exponent
///
/// Implementations may cache; the cache lifecycle (bounds, invalidation)
/// belongs to the implementation, never to hidden static state.
#[async_trait]
pub trait CurrencyCatalog: Send + Sync {
    /// Returns the minor-unit exponent for a currency, or `None` when the
    /// catalog has no entry for it
    async fn resolve_minor_unit(&self, currency: &CurrencyCode)
        -> Result<Option<u32>, CatalogError>;
}

/// Resolves tax-code ids to rates and compounding rules
#[async_trait]
pub trait TaxCodeCatalog: Send + Sync {
    /// Returns the catalog entry for a tax code, or `None` when the id is
    /// not known
    async fn resolve_rate(&self, id: TaxCodeId) -> Result<Option<ResolvedTaxCode>, CatalogError>;
}

/// Reads documents and opens write transactions against them
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Loads a document with its lines, their sourced quantities, and
    /// their persisted tax associations
    async fn load(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError>;

    /// Opens a write transaction
    ///
    /// Every write issued through the returned session becomes visible
    /// atomically on `commit` or not at all.
    async fn begin(&self) -> Result<Box<dyn DocumentTransaction>, StoreError>;
}

/// An open write transaction against the document store
///
/// This is the engine's explicit transaction capability: the recalculation
/// use case issues all of its writes through one session and finishes it
/// with exactly one `commit` or `rollback`. Dropping a session without
/// either must behave like a rollback.
#[async_trait]
pub trait DocumentTransaction: Send {
    /// Writes a line's recalculated monetary fields
    async fn update_line(&mut self, update: &LineUpdate) -> Result<(), StoreError>;

    /// Lists a line's persisted tax associations
    async fn list_line_taxes(
        &mut self,
        line: LineId,
    ) -> Result<Vec<TaxAssociationRecord>, StoreError>;

    /// Inserts a new tax association for a line
    async fn insert_line_tax(&mut self, association: &NewTaxAssociation) -> Result<(), StoreError>;

    /// Updates an existing tax association in place, preserving its
    /// creation timestamp
    async fn update_line_tax(&mut self, update: &TaxAssociationUpdate) -> Result<(), StoreError>;

    /// Deletes a stale tax association
    async fn delete_line_tax(&mut self, id: TaxAssociationId) -> Result<(), StoreError>;

    /// Writes the document-level totals
    async fn update_document_totals(
        &mut self,
        update: &DocumentTotalsUpdate,
    ) -> Result<(), StoreError>;

    /// Makes every write in this session visible atomically
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discards every write in this session
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Records before/after deltas for compliance audit logs
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records an update to an entity
    ///
    /// `before` and `after` carry only the fields that changed.
    async fn record_update(
        &self,
        entity: &str,
        entity_id: &str,
        before: &AuditFields,
        after: &AuditFields,
    ) -> Result<(), AuditError>;
}
