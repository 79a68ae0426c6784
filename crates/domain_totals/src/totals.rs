//! Document-level aggregation
//!
//! Runs the line calculator over every line of a document and sums the
//! results. Aggregation is plain integer addition, so the outcome is
//! independent of summation order; lines are still processed in input
//! order to keep audit logs reproducible.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use core_kernel::{CompanyId, CurrencyCode, MoneyError};

use crate::error::{CurrencyMismatch, TotalsError};
use crate::line::{LineCalculator, LineInput, LineResult};
use crate::ports::{CurrencyCatalog, TaxCodeCatalog};

/// Aggregated monetary figures for one document
///
/// Invariants, exact to the minor unit:
/// `subtotal_minor` is the sum of every line subtotal, `tax_total_minor`
/// the sum of every tax amount, and `grand_total_minor` their sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub subtotal_minor: i64,
    pub tax_total_minor: i64,
    pub grand_total_minor: i64,
    pub minor_unit: u32,
}

impl DocumentTotals {
    /// Zeroed totals for an empty document
    pub fn zero(minor_unit: u32) -> Self {
        Self {
            subtotal_minor: 0,
            tax_total_minor: 0,
            grand_total_minor: 0,
            minor_unit,
        }
    }
}

/// The full result of a document calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationOutcome {
    pub minor_unit: u32,
    /// One result per input line, in input order
    pub lines: Vec<LineResult>,
    pub totals: DocumentTotals,
}

/// Applies the line calculator to every line and aggregates
pub struct TotalsCalculator {
    currencies: Arc<dyn CurrencyCatalog>,
    line_calculator: LineCalculator,
}

impl TotalsCalculator {
    pub fn new(currencies: Arc<dyn CurrencyCatalog>, tax_codes: Arc<dyn TaxCodeCatalog>) -> Self {
        Self {
            currencies,
            line_calculator: LineCalculator::new(tax_codes),
        }
    }

    /// Calculates per-line results and document totals
    ///
    /// The minor unit is resolved once for the document currency; a
    /// document never mixes minor units across lines. An empty line list
    /// yields zeroed totals rather than an error.
    ///
    /// # Errors
    ///
    /// - `CurrencyMismatch` when the currency catalog has no entry for
    ///   the document currency
    /// - any line-level error from [`LineCalculator::calculate`]
    pub async fn calculate(
        &self,
        company: CompanyId,
        currency: CurrencyCode,
        lines: &[LineInput],
    ) -> Result<CalculationOutcome, TotalsError> {
        let minor_unit = self
            .currencies
            .resolve_minor_unit(&currency)
            .await?
            .ok_or(CurrencyMismatch::UnknownCurrency(currency))?;

        let mut results = Vec::with_capacity(lines.len());
        let mut subtotal_minor: i64 = 0;
        let mut tax_total_minor: i64 = 0;

        for input in lines {
            let result = self.line_calculator.calculate(input).await?;
            subtotal_minor = subtotal_minor
                .checked_add(result.line_subtotal_minor)
                .ok_or(MoneyError::Overflow)
                .map_err(TotalsError::from)?;
            tax_total_minor = tax_total_minor
                .checked_add(result.tax_minor())
                .ok_or(MoneyError::Overflow)
                .map_err(TotalsError::from)?;
            results.push(result);
        }

        let grand_total_minor = subtotal_minor
            .checked_add(tax_total_minor)
            .ok_or(MoneyError::Overflow)
            .map_err(TotalsError::from)?;

        debug!(
            company = %company,
            currency = %currency,
            lines = lines.len(),
            subtotal_minor,
            tax_total_minor,
            grand_total_minor,
            "document totals calculated"
        );

        Ok(CalculationOutcome {
            minor_unit,
            lines: results,
            totals: DocumentTotals {
                subtotal_minor,
                tax_total_minor,
                grand_total_minor,
                minor_unit,
            },
        })
    }
}
