//! The recalculate-totals use case
//!
//! Validates preconditions, computes the document's monetary breakdown,
//! persists it atomically, reconciles tax associations, and emits an
//! audit delta of exactly the fields that changed. Running it twice on
//! unchanged inputs produces identical figures and no second delta.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use core_kernel::{DocumentId, Money, TaxCodeId};

use crate::document::{DocumentRecord, DocumentTotalsUpdate, LineUpdate};
use crate::error::{CurrencyMismatch, TotalsError};
use crate::line::{LineInput, LineResult};
use crate::ports::{AuditFields, AuditSink, CurrencyCatalog, DocumentStore, DocumentTransaction, TaxCodeCatalog};
use crate::tax_sync::{LineTaxSyncService, TaxSyncOutcome};
use crate::totals::{CalculationOutcome, DocumentTotals, TotalsCalculator};

/// What a recalculation produced
#[derive(Debug, Clone, Serialize)]
pub struct RecalculationSummary {
    pub document: DocumentId,
    pub totals: DocumentTotals,
    /// Per-line results, in document line order
    pub lines: Vec<LineResult>,
    /// Aggregated tax association writes across all lines
    #[serde(skip)]
    pub sync: TaxSyncOutcome,
    /// Whether an audit record was emitted (false for a no-op rerun)
    pub audited: bool,
}

/// The single entry point of the totals engine
pub struct RecalculateTotals {
    store: Arc<dyn DocumentStore>,
    audit: Arc<dyn AuditSink>,
    calculator: TotalsCalculator,
    tax_sync: LineTaxSyncService,
}

impl RecalculateTotals {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        currencies: Arc<dyn CurrencyCatalog>,
        tax_codes: Arc<dyn TaxCodeCatalog>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            audit,
            calculator: TotalsCalculator::new(currencies, tax_codes),
            tax_sync: LineTaxSyncService::new(),
        }
    }

    /// Recalculates a document's totals and persists them atomically
    ///
    /// Precondition failures (missing company, line currency mismatch,
    /// non-positive quantity) abort before any transaction opens. A
    /// failure after the transaction opens rolls everything back; a
    /// partial recalculation is never visible.
    ///
    /// The audit delta is emitted after commit and restricted to mutated
    /// fields; an audit sink failure is logged and never propagated.
    pub async fn execute(&self, document_id: DocumentId) -> Result<RecalculationSummary, TotalsError> {
        let document = self
            .store
            .load(document_id)
            .await?
            .ok_or(TotalsError::DocumentNotFound(document_id))?;

        let company = document
            .company_id
            .ok_or(TotalsError::MissingCompanyContext { document: document_id })?;
        validate_line_currencies(&document)?;
        validate_quantities(&document)?;

        let before = snapshot_record(&document);
        let inputs = build_line_inputs(&document);
        let outcome = self
            .calculator
            .calculate(company, document.currency, &inputs)
            .await?;

        let mut tx = self.store.begin().await?;
        let sync = match self.apply(tx.as_mut(), &document, &outcome).await {
            Ok(sync) => {
                tx.commit().await?;
                sync
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(
                        document = %document_id,
                        error = %rollback_error,
                        "rollback failed after recalculation error"
                    );
                }
                return Err(error);
            }
        };

        let after = snapshot_outcome(&document, &outcome);
        let audited = self.emit_audit(&document, before, after).await;

        info!(
            document = %document_id,
            kind = %document.kind,
            subtotal_minor = outcome.totals.subtotal_minor,
            tax_total_minor = outcome.totals.tax_total_minor,
            grand_total_minor = outcome.totals.grand_total_minor,
            tax_writes = sync.write_count(),
            "document totals recalculated"
        );

        Ok(RecalculationSummary {
            document: document_id,
            totals: outcome.totals,
            lines: outcome.lines,
            sync,
            audited,
        })
    }

    /// Issues every write of one recalculation through the open transaction
    async fn apply(
        &self,
        tx: &mut dyn DocumentTransaction,
        document: &DocumentRecord,
        outcome: &CalculationOutcome,
    ) -> Result<TaxSyncOutcome, TotalsError> {
        let currency = document.currency;
        let minor_unit = outcome.minor_unit;
        let as_decimal = |minor: i64| Money::from_minor(minor, currency, minor_unit).to_decimal();

        let mut sync = TaxSyncOutcome::default();
        for result in &outcome.lines {
            tx.update_line(&LineUpdate {
                line: result.key,
                unit_price: as_decimal(result.unit_price_minor),
                unit_price_minor: result.unit_price_minor,
                line_subtotal: as_decimal(result.line_subtotal_minor),
                line_subtotal_minor: result.line_subtotal_minor,
                line_total: as_decimal(result.line_total_minor),
                line_total_minor: result.line_total_minor,
            })
            .await?;
            sync.absorb(self.tax_sync.sync(tx, result.key, &result.taxes).await?);
        }

        tx.update_document_totals(&DocumentTotalsUpdate {
            document: document.id,
            subtotal: as_decimal(outcome.totals.subtotal_minor),
            subtotal_minor: outcome.totals.subtotal_minor,
            tax_total: as_decimal(outcome.totals.tax_total_minor),
            tax_total_minor: outcome.totals.tax_total_minor,
            grand_total: as_decimal(outcome.totals.grand_total_minor),
            grand_total_minor: outcome.totals.grand_total_minor,
        })
        .await?;

        Ok(sync)
    }

    /// Emits the before/after delta, returning whether a record went out
    async fn emit_audit(
        &self,
        document: &DocumentRecord,
        before: AuditFields,
        after: AuditFields,
    ) -> bool {
        let Some((before_changed, after_changed)) = changed_fields(before, after) else {
            return false;
        };
        match self
            .audit
            .record_update(
                document.kind.as_str(),
                &document.id.to_string(),
                &before_changed,
                &after_changed,
            )
            .await
        {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    document = %document.id,
                    error = %error,
                    "audit sink rejected recalculation delta"
                );
                false
            }
        }
    }
}

/// Every line currency, when present, must match the document currency
///
/// Currency codes normalize to uppercase at construction, so this
/// comparison is case-insensitive by definition.
fn validate_line_currencies(document: &DocumentRecord) -> Result<(), TotalsError> {
    for line in &document.lines {
        if let Some(found) = line.currency {
            if found != document.currency {
                return Err(CurrencyMismatch::LineCurrency {
                    line: line.id,
                    expected: document.currency,
                    found,
                }
                .into());
            }
        }
    }
    Ok(())
}

/// Every sourced quantity must be strictly positive
fn validate_quantities(document: &DocumentRecord) -> Result<(), TotalsError> {
    for line in &document.lines {
        if line.requested_quantity <= rust_decimal::Decimal::ZERO {
            return Err(TotalsError::InvalidQuantity {
                line: line.id,
                quantity: line.requested_quantity,
            });
        }
    }
    Ok(())
}

/// Builds fresh calculation inputs from the persisted lines
fn build_line_inputs(document: &DocumentRecord) -> Vec<LineInput> {
    document
        .lines
        .iter()
        .map(|line| {
            let tax_code_ids: BTreeSet<TaxCodeId> = line.tax_code_ids.iter().copied().collect();
            LineInput {
                key: line.id,
                quantity: line.requested_quantity,
                unit_price_minor: line.unit_price_minor,
                tax_code_ids: tax_code_ids.into_iter().collect(),
            }
        })
        .collect()
}

fn insert_minor(fields: &mut AuditFields, key: String, minor: i64) {
    fields.insert(key, Value::from(minor));
}

fn insert_decimal(fields: &mut AuditFields, key: String, decimal: rust_decimal::Decimal) {
    // Normalized so "100.50" and "100.5000" (a NUMERIC column's fixed
    // scale) never read as a change.
    fields.insert(key, Value::String(decimal.normalize().to_string()));
}

/// Snapshot of the monetary fields as currently persisted
fn snapshot_record(document: &DocumentRecord) -> AuditFields {
    let mut fields = AuditFields::new();
    insert_decimal(&mut fields, "subtotal".to_string(), document.subtotal);
    insert_minor(&mut fields, "subtotal_minor".to_string(), document.subtotal_minor);
    insert_decimal(&mut fields, "tax_total".to_string(), document.tax_total);
    insert_minor(&mut fields, "tax_total_minor".to_string(), document.tax_total_minor);
    insert_decimal(&mut fields, "grand_total".to_string(), document.grand_total);
    insert_minor(&mut fields, "grand_total_minor".to_string(), document.grand_total_minor);

    for line in &document.lines {
        let prefix = format!("line.{}", line.id.as_uuid());
        insert_decimal(&mut fields, format!("{prefix}.unit_price"), line.unit_price);
        insert_minor(&mut fields, format!("{prefix}.unit_price_minor"), line.unit_price_minor);
        insert_decimal(&mut fields, format!("{prefix}.subtotal"), line.line_subtotal);
        insert_minor(&mut fields, format!("{prefix}.subtotal_minor"), line.line_subtotal_minor);
        insert_decimal(&mut fields, format!("{prefix}.total"), line.line_total);
        insert_minor(&mut fields, format!("{prefix}.total_minor"), line.line_total_minor);
        for tax in &line.taxes {
            insert_decimal(
                &mut fields,
                format!("{prefix}.tax.{}.rate", tax.tax_code_id),
                tax.rate_applied,
            );
            insert_minor(
                &mut fields,
                format!("{prefix}.tax.{}.amount_minor", tax.tax_code_id),
                tax.amount_minor,
            );
        }
    }
    fields
}

/// Snapshot of the monetary fields as they will be persisted
fn snapshot_outcome(document: &DocumentRecord, outcome: &CalculationOutcome) -> AuditFields {
    let currency = document.currency;
    let minor_unit = outcome.minor_unit;
    let as_decimal = |minor: i64| Money::from_minor(minor, currency, minor_unit).to_decimal();

    let mut fields = AuditFields::new();
    insert_decimal(&mut fields, "subtotal".to_string(), as_decimal(outcome.totals.subtotal_minor));
    insert_minor(&mut fields, "subtotal_minor".to_string(), outcome.totals.subtotal_minor);
    insert_decimal(&mut fields, "tax_total".to_string(), as_decimal(outcome.totals.tax_total_minor));
    insert_minor(&mut fields, "tax_total_minor".to_string(), outcome.totals.tax_total_minor);
    insert_decimal(
        &mut fields,
        "grand_total".to_string(),
        as_decimal(outcome.totals.grand_total_minor),
    );
    insert_minor(&mut fields, "grand_total_minor".to_string(), outcome.totals.grand_total_minor);

    for result in &outcome.lines {
        let prefix = format!("line.{}", result.key.as_uuid());
        insert_decimal(&mut fields, format!("{prefix}.unit_price"), as_decimal(result.unit_price_minor));
        insert_minor(&mut fields, format!("{prefix}.unit_price_minor"), result.unit_price_minor);
        insert_decimal(&mut fields, format!("{prefix}.subtotal"), as_decimal(result.line_subtotal_minor));
        insert_minor(&mut fields, format!("{prefix}.subtotal_minor"), result.line_subtotal_minor);
        insert_decimal(&mut fields, format!("{prefix}.total"), as_decimal(result.line_total_minor));
        insert_minor(&mut fields, format!("{prefix}.total_minor"), result.line_total_minor);
        for tax in &result.taxes {
            insert_decimal(
                &mut fields,
                format!("{prefix}.tax.{}.rate", tax.tax_code_id),
                tax.rate_applied,
            );
            insert_minor(
                &mut fields,
                format!("{prefix}.tax.{}.amount_minor", tax.tax_code_id),
                tax.amount_minor,
            );
        }
    }
    fields
}

/// Restricts both snapshots to the fields that differ
///
/// Returns `None` when nothing changed, which lets the caller skip the
/// audit record for a no-op recalculation.
fn changed_fields(before: AuditFields, after: AuditFields) -> Option<(AuditFields, AuditFields)> {
    let keys: BTreeSet<String> = before.keys().chain(after.keys()).cloned().collect();

    let mut before_changed = AuditFields::new();
    let mut after_changed = AuditFields::new();
    for key in keys {
        let old = before.get(&key);
        let new = after.get(&key);
        if old != new {
            before_changed.insert(key.clone(), old.cloned().unwrap_or(Value::Null));
            after_changed.insert(key, new.cloned().unwrap_or(Value::Null));
        }
    }

    if before_changed.is_empty() {
        None
    } else {
        Some((before_changed, after_changed))
    }
}
