//! Line tax association reconciliation
//!
//! Makes a line's persisted tax associations match a freshly computed
//! breakdown with the minimum set of writes: update in place when the
//! amount changed, delete what disappeared, insert what is new, and touch
//! nothing that is already correct. A delete-all-then-reinsert would
//! discard per-association creation timestamps that downstream reporting
//! relies on, so it is never used.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use core_kernel::{LineId, TaxAssociationId, TaxCodeId};

use crate::document::{NewTaxAssociation, TaxAssociationRecord, TaxAssociationUpdate};
use crate::error::TotalsError;
use crate::line::TaxLine;
use crate::ports::DocumentTransaction;

/// The write set produced by reconciling one line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxSyncPlan {
    pub insert: Vec<NewTaxAssociation>,
    pub update: Vec<TaxAssociationUpdate>,
    pub remove: Vec<TaxAssociationId>,
    /// Associations already correct; no write issued for these
    pub unchanged: usize,
}

impl TaxSyncPlan {
    /// True when the plan issues no writes at all
    pub fn is_noop(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }
}

/// Counts of what a sync run actually did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaxSyncOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl TaxSyncOutcome {
    /// Total number of writes issued
    pub fn write_count(&self) -> usize {
        self.inserted + self.updated + self.removed
    }

    /// Folds another line's outcome into this one
    pub fn absorb(&mut self, other: TaxSyncOutcome) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.removed += other.removed;
        self.unchanged += other.unchanged;
    }
}

/// Computes the three-way diff between persisted associations and a
/// desired breakdown
///
/// Duplicate persisted rows for the same tax code keep the first row and
/// schedule the rest for removal.
pub fn plan(
    line: LineId,
    existing: &[TaxAssociationRecord],
    desired: &[TaxLine],
) -> TaxSyncPlan {
    let mut plan = TaxSyncPlan::default();

    let mut by_code: HashMap<TaxCodeId, &TaxAssociationRecord> = HashMap::new();
    for association in existing {
        if by_code.contains_key(&association.tax_code_id) {
            plan.remove.push(association.id);
        } else {
            by_code.insert(association.tax_code_id, association);
        }
    }

    let mut desired_codes: HashSet<TaxCodeId> = HashSet::with_capacity(desired.len());
    for tax in desired {
        desired_codes.insert(tax.tax_code_id);
        match by_code.get(&tax.tax_code_id) {
            Some(existing) => {
                if existing.amount_minor == tax.amount_minor
                    && existing.rate_applied == tax.rate_applied
                {
                    plan.unchanged += 1;
                } else {
                    plan.update.push(TaxAssociationUpdate {
                        id: existing.id,
                        rate_applied: tax.rate_applied,
                        amount_minor: tax.amount_minor,
                    });
                }
            }
            None => plan.insert.push(NewTaxAssociation {
                line_id: line,
                tax_code_id: tax.tax_code_id,
                rate_applied: tax.rate_applied,
                amount_minor: tax.amount_minor,
            }),
        }
    }

    for association in by_code.values() {
        if !desired_codes.contains(&association.tax_code_id) {
            plan.remove.push(association.id);
        }
    }
    // HashMap iteration order is arbitrary; keep removals reproducible.
    plan.remove.sort();

    plan
}

/// Reconciles persisted tax associations through an open transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct LineTaxSyncService;

impl LineTaxSyncService {
    pub fn new() -> Self {
        Self
    }

    /// Brings one line's associations in sync with `desired`
    ///
    /// Reads the line's current associations through the transaction,
    /// plans the minimal diff, and issues only the writes the plan calls
    /// for. Re-running with an unchanged breakdown issues zero writes.
    pub async fn sync(
        &self,
        tx: &mut dyn DocumentTransaction,
        line: LineId,
        desired: &[TaxLine],
    ) -> Result<TaxSyncOutcome, TotalsError> {
        let existing = tx.list_line_taxes(line).await?;
        let plan = plan(line, &existing, desired);

        for association in &plan.insert {
            tx.insert_line_tax(association).await?;
        }
        for update in &plan.update {
            tx.update_line_tax(update).await?;
        }
        for &id in &plan.remove {
            tx.delete_line_tax(id).await?;
        }

        let outcome = TaxSyncOutcome {
            inserted: plan.insert.len(),
            updated: plan.update.len(),
            removed: plan.remove.len(),
            unchanged: plan.unchanged,
        };
        debug!(
            line = %line,
            inserted = outcome.inserted,
            updated = outcome.updated,
            removed = outcome.removed,
            unchanged = outcome.unchanged,
            "line tax associations reconciled"
        );
        Ok(outcome)
    }
}
