//! In-memory implementations of the engine's ports
//!
//! These adapters back the engine test suites without a database. The
//! document store counts every write it receives, which is what the
//! sync-minimality and rollback tests assert against.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use core_kernel::{CurrencyCode, DocumentId, LineId, Rate, TaxAssociationId, TaxCodeId};
use domain_totals::ports::{
    AuditError, AuditFields, AuditSink, CatalogError, CurrencyCatalog, DocumentStore,
    DocumentTransaction, ResolvedTaxCode, StoreError, TaxCodeCatalog,
};
use domain_totals::{
    DocumentRecord, DocumentTotalsUpdate, LineUpdate, NewTaxAssociation, TaxAssociationRecord,
    TaxAssociationUpdate,
};

/// Currency catalog backed by a plain map
#[derive(Debug, Clone, Default)]
pub struct InMemoryCurrencyCatalog {
    minor_units: HashMap<CurrencyCode, u32>,
}

impl InMemoryCurrencyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog with the currencies the test suite uses most
    pub fn standard() -> Self {
        Self::new()
            .with_currency("USD", 2)
            .with_currency("EUR", 2)
            .with_currency("JPY", 0)
            .with_currency("BHD", 3)
    }

    pub fn with_currency(mut self, code: &str, minor_unit: u32) -> Self {
        let code = CurrencyCode::new(code).expect("valid test currency code");
        self.minor_units.insert(code, minor_unit);
        self
    }
}

#[async_trait]
impl CurrencyCatalog for InMemoryCurrencyCatalog {
    async fn resolve_minor_unit(
        &self,
        currency: &CurrencyCode,
    ) -> Result<Option<u32>, CatalogError> {
        Ok(self.minor_units.get(currency).copied())
    }
}

/// Tax code catalog backed by a plain map
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaxCodeCatalog {
    codes: HashMap<TaxCodeId, ResolvedTaxCode>,
}

impl InMemoryTaxCodeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a non-compounding code at the given percentage
    pub fn with_code(self, id: i64, percent: Decimal) -> Self {
        self.with_code_entry(id, percent, false, 0)
    }

    /// Registers a code with full control over compounding and ordering
    pub fn with_code_entry(
        mut self,
        id: i64,
        percent: Decimal,
        compounding: bool,
        position: i32,
    ) -> Self {
        let id = TaxCodeId::new(id);
        self.codes.insert(
            id,
            ResolvedTaxCode {
                id,
                rate: Rate::from_percentage(percent),
                compounding,
                position,
            },
        );
        self
    }
}

#[async_trait]
impl TaxCodeCatalog for InMemoryTaxCodeCatalog {
    async fn resolve_rate(&self, id: TaxCodeId) -> Result<Option<ResolvedTaxCode>, CatalogError> {
        Ok(self.codes.get(&id).copied())
    }
}

/// One captured audit record
#[derive(Debug, Clone)]
pub struct CapturedAudit {
    pub entity: String,
    pub entity_id: String,
    pub before: AuditFields,
    pub after: AuditFields,
}

/// Audit sink that captures every record for later assertions
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<CapturedAudit>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CapturedAudit> {
        self.records.lock().expect("audit records mutex").clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record_update(
        &self,
        entity: &str,
        entity_id: &str,
        before: &AuditFields,
        after: &AuditFields,
    ) -> Result<(), AuditError> {
        self.records.lock().expect("audit records mutex").push(CapturedAudit {
            entity: entity.to_string(),
            entity_id: entity_id.to_string(),
            before: before.clone(),
            after: after.clone(),
        });
        Ok(())
    }
}

/// Audit sink that always fails, for the must-not-propagate tests
#[derive(Debug, Default)]
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record_update(
        &self,
        _entity: &str,
        _entity_id: &str,
        _before: &AuditFields,
        _after: &AuditFields,
    ) -> Result<(), AuditError> {
        Err(AuditError::Sink("audit sink is down".to_string()))
    }
}

/// Counters for every write the store received
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub line_updates: usize,
    pub tax_inserts: usize,
    pub tax_updates: usize,
    pub tax_deletes: usize,
    pub totals_updates: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

impl WriteStats {
    /// Tax association writes only (insert + update + delete)
    pub fn tax_writes(&self) -> usize {
        self.tax_inserts + self.tax_updates + self.tax_deletes
    }
}

/// Operations a test can make the store fail on, mid-transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    UpdateLine,
    InsertLineTax,
    UpdateDocumentTotals,
}

#[derive(Debug, Default)]
struct StoreInner {
    documents: HashMap<DocumentId, DocumentRecord>,
    stats: WriteStats,
    fail_on: Option<FailPoint>,
}

/// Document store backed by a shared map
///
/// Transactions clone the whole map on begin and swap it back on commit,
/// so a rollback (or a dropped transaction) leaves the shared state
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, document: DocumentRecord) -> Self {
        self.insert(document);
        self
    }

    pub fn insert(&self, document: DocumentRecord) {
        let mut inner = self.inner.lock().expect("store mutex");
        inner.documents.insert(document.id, document);
    }

    /// Returns the committed state of a document
    pub fn document(&self, id: DocumentId) -> Option<DocumentRecord> {
        self.inner.lock().expect("store mutex").documents.get(&id).cloned()
    }

    pub fn stats(&self) -> WriteStats {
        self.inner.lock().expect("store mutex").stats
    }

    pub fn reset_stats(&self) {
        self.inner.lock().expect("store mutex").stats = WriteStats::default();
    }

    /// Makes the next matching transactional write fail
    pub fn fail_on(&self, point: FailPoint) {
        self.inner.lock().expect("store mutex").fail_on = Some(point);
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn load(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.inner.lock().expect("store mutex").documents.get(&id).cloned())
    }

    async fn begin(&self) -> Result<Box<dyn DocumentTransaction>, StoreError> {
        let working = self.inner.lock().expect("store mutex").documents.clone();
        Ok(Box::new(InMemoryTransaction {
            inner: Arc::clone(&self.inner),
            working,
        }))
    }
}

struct InMemoryTransaction {
    inner: Arc<Mutex<StoreInner>>,
    working: HashMap<DocumentId, DocumentRecord>,
}

impl InMemoryTransaction {
    fn check_fail_point(&self, point: FailPoint) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex");
        if inner.fail_on == Some(point) {
            inner.fail_on = None;
            return Err(StoreError::Query(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }

    fn line_mut(&mut self, line: LineId) -> Result<&mut domain_totals::LineRecord, StoreError> {
        self.working
            .values_mut()
            .flat_map(|document| document.lines.iter_mut())
            .find(|candidate| candidate.id == line)
            .ok_or_else(|| StoreError::NotFound(format!("line {}", line)))
    }
}

#[async_trait]
impl DocumentTransaction for InMemoryTransaction {
    async fn update_line(&mut self, update: &LineUpdate) -> Result<(), StoreError> {
        self.check_fail_point(FailPoint::UpdateLine)?;
        self.inner.lock().expect("store mutex").stats.line_updates += 1;

        let line = self.line_mut(update.line)?;
        line.unit_price = update.unit_price;
        line.unit_price_minor = update.unit_price_minor;
        line.line_subtotal = update.line_subtotal;
        line.line_subtotal_minor = update.line_subtotal_minor;
        line.line_total = update.line_total;
        line.line_total_minor = update.line_total_minor;
        Ok(())
    }

    async fn list_line_taxes(
        &mut self,
        line: LineId,
    ) -> Result<Vec<TaxAssociationRecord>, StoreError> {
        Ok(self.line_mut(line)?.taxes.clone())
    }

    async fn insert_line_tax(&mut self, association: &NewTaxAssociation) -> Result<(), StoreError> {
        self.check_fail_point(FailPoint::InsertLineTax)?;
        self.inner.lock().expect("store mutex").stats.tax_inserts += 1;

        let line = self.line_mut(association.line_id)?;
        line.taxes.push(TaxAssociationRecord {
            id: TaxAssociationId::new(),
            line_id: association.line_id,
            tax_code_id: association.tax_code_id,
            rate_applied: association.rate_applied,
            amount_minor: association.amount_minor,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn update_line_tax(&mut self, update: &TaxAssociationUpdate) -> Result<(), StoreError> {
        self.inner.lock().expect("store mutex").stats.tax_updates += 1;

        let association = self
            .working
            .values_mut()
            .flat_map(|document| document.lines.iter_mut())
            .flat_map(|line| line.taxes.iter_mut())
            .find(|candidate| candidate.id == update.id)
            .ok_or_else(|| StoreError::NotFound(format!("tax association {}", update.id)))?;
        // created_at is deliberately untouched.
        association.rate_applied = update.rate_applied;
        association.amount_minor = update.amount_minor;
        Ok(())
    }

    async fn delete_line_tax(&mut self, id: TaxAssociationId) -> Result<(), StoreError> {
        self.inner.lock().expect("store mutex").stats.tax_deletes += 1;

        for document in self.working.values_mut() {
            for line in document.lines.iter_mut() {
                let before = line.taxes.len();
                line.taxes.retain(|association| association.id != id);
                if line.taxes.len() != before {
                    return Ok(());
                }
            }
        }
        Err(StoreError::NotFound(format!("tax association {}", id)))
    }

    async fn update_document_totals(
        &mut self,
        update: &DocumentTotalsUpdate,
    ) -> Result<(), StoreError> {
        self.check_fail_point(FailPoint::UpdateDocumentTotals)?;
        self.inner.lock().expect("store mutex").stats.totals_updates += 1;

        let document = self
            .working
            .get_mut(&update.document)
            .ok_or_else(|| StoreError::NotFound(format!("document {}", update.document)))?;
        document.subtotal = update.subtotal;
        document.subtotal_minor = update.subtotal_minor;
        document.tax_total = update.tax_total;
        document.tax_total_minor = update.tax_total_minor;
        document.grand_total = update.grand_total;
        document.grand_total_minor = update.grand_total_minor;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex");
        inner.documents = self.working;
        inner.stats.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // The working copy is simply dropped.
        self.inner.lock().expect("store mutex").stats.rollbacks += 1;
        Ok(())
    }
}
