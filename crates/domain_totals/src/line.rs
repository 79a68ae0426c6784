//! Per-line monetary breakdown
//!
//! One line's subtotal, per-tax-code amounts, and line total, all in minor
//! units. Quantities may be fractional (2.5 kg of steel); amounts never are.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use core_kernel::{round_to_minor, LineId, MoneyError, TaxCodeId};

use crate::error::TotalsError;
use crate::ports::{ResolvedTaxCode, TaxCodeCatalog};

/// Computation input for one line
///
/// Built fresh from the persisted line and its quantity source on every
/// recalculation; never persisted itself. `tax_code_ids` is a set: the
/// caller deduplicates before constructing the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineInput {
    /// Caller-supplied key the result is reported under
    pub key: LineId,
    /// Requested quantity; must be strictly positive
    pub quantity: Decimal,
    pub unit_price_minor: i64,
    pub tax_code_ids: Vec<TaxCodeId>,
}

/// One tax code's contribution to a line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLine {
    pub tax_code_id: TaxCodeId,
    /// The rate in force when the amount was computed
    pub rate_applied: Decimal,
    pub amount_minor: i64,
}

/// Computation output for one line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineResult {
    pub key: LineId,
    pub unit_price_minor: i64,
    pub line_subtotal_minor: i64,
    /// Per-code breakdown, in catalog-declared order
    pub taxes: Vec<TaxLine>,
    pub line_total_minor: i64,
}

impl LineResult {
    /// Sum of all tax amounts on this line
    pub fn tax_minor(&self) -> i64 {
        self.taxes.iter().map(|t| t.amount_minor).sum()
    }
}

/// Computes one line's monetary breakdown
///
/// Taxes are computed on the line subtotal, each code rounded
/// independently (half away from zero). A compounding code instead uses
/// the subtotal plus all prior non-compounding tax amounts, where "prior"
/// follows the catalog-declared position. Two codes at 5% and 3% on a
/// 10000-minor line therefore yield exactly 500 and 300, never a combined
/// 8% computation.
pub struct LineCalculator {
    tax_codes: Arc<dyn TaxCodeCatalog>,
}

impl LineCalculator {
    pub fn new(tax_codes: Arc<dyn TaxCodeCatalog>) -> Self {
        Self { tax_codes }
    }

    /// Computes the subtotal, per-code tax amounts, and total for a line
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity` when the quantity is zero or negative
    /// - `UnknownTaxCode` when any referenced code has no catalog entry;
    ///   the whole line fails rather than skipping the code
    pub async fn calculate(&self, input: &LineInput) -> Result<LineResult, TotalsError> {
        if input.quantity <= Decimal::ZERO {
            return Err(TotalsError::InvalidQuantity {
                line: input.key,
                quantity: input.quantity,
            });
        }

        let raw_subtotal = input
            .quantity
            .checked_mul(Decimal::from(input.unit_price_minor))
            .ok_or(MoneyError::Overflow)
            .map_err(TotalsError::from)?;
        let line_subtotal_minor = round_to_minor(raw_subtotal).map_err(TotalsError::from)?;

        let resolved = self.resolve_tax_codes(input).await?;
        let taxes = apply_tax_codes(line_subtotal_minor, &resolved)?;

        let tax_minor: i64 = taxes.iter().map(|t| t.amount_minor).sum();
        let line_total_minor = line_subtotal_minor
            .checked_add(tax_minor)
            .ok_or(MoneyError::Overflow)
            .map_err(TotalsError::from)?;

        Ok(LineResult {
            key: input.key,
            unit_price_minor: input.unit_price_minor,
            line_subtotal_minor,
            taxes,
            line_total_minor,
        })
    }

    async fn resolve_tax_codes(
        &self,
        input: &LineInput,
    ) -> Result<Vec<ResolvedTaxCode>, TotalsError> {
        let mut resolved = Vec::with_capacity(input.tax_code_ids.len());
        for &id in &input.tax_code_ids {
            match self.tax_codes.resolve_rate(id).await? {
                Some(code) => resolved.push(code),
                None => {
                    return Err(TotalsError::UnknownTaxCode {
                        line: input.key,
                        tax_code: id,
                    })
                }
            }
        }
        // Catalog-declared order; id as a deterministic tie-break.
        resolved.sort_by_key(|code| (code.position, code.id));
        Ok(resolved)
    }
}

/// Applies resolved tax codes to a line subtotal, in catalog order
fn apply_tax_codes(
    line_subtotal_minor: i64,
    codes: &[ResolvedTaxCode],
) -> Result<Vec<TaxLine>, TotalsError> {
    let mut taxes = Vec::with_capacity(codes.len());
    let mut non_compounding_minor: i64 = 0;

    for code in codes {
        let base_minor = if code.compounding {
            line_subtotal_minor
                .checked_add(non_compounding_minor)
                .ok_or(MoneyError::Overflow)
                .map_err(TotalsError::from)?
        } else {
            line_subtotal_minor
        };
        let amount_minor = code.rate.apply_to_minor(base_minor).map_err(TotalsError::from)?;
        if !code.compounding {
            non_compounding_minor += amount_minor;
        }
        taxes.push(TaxLine {
            tax_code_id: code.id,
            rate_applied: code.rate.as_decimal(),
            amount_minor,
        });
    }

    Ok(taxes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Rate;
    use rust_decimal_macros::dec;

    fn code(id: i64, percent: Decimal, compounding: bool, position: i32) -> ResolvedTaxCode {
        ResolvedTaxCode {
            id: TaxCodeId::new(id),
            rate: Rate::from_percentage(percent),
            compounding,
            position,
        }
    }

    #[test]
    fn test_taxes_round_independently_on_the_subtotal() {
        let taxes = apply_tax_codes(
            10_000,
            &[code(1, dec!(5), false, 0), code(2, dec!(3), false, 1)],
        )
        .unwrap();

        assert_eq!(taxes[0].amount_minor, 500);
        assert_eq!(taxes[1].amount_minor, 300);
    }

    #[test]
    fn test_compounding_code_uses_prior_non_compounding_taxes() {
        // 10000 at 5% -> 500; compounding 10% applies to 10500 -> 1050.
        let taxes = apply_tax_codes(
            10_000,
            &[code(1, dec!(5), false, 0), code(2, dec!(10), true, 1)],
        )
        .unwrap();

        assert_eq!(taxes[0].amount_minor, 500);
        assert_eq!(taxes[1].amount_minor, 1050);
    }

    #[test]
    fn test_compounding_codes_do_not_stack_on_each_other() {
        // Both compounding codes see only the subtotal plus non-compounding
        // taxes (none here), not each other.
        let taxes = apply_tax_codes(
            10_000,
            &[code(1, dec!(10), true, 0), code(2, dec!(10), true, 1)],
        )
        .unwrap();

        assert_eq!(taxes[0].amount_minor, 1000);
        assert_eq!(taxes[1].amount_minor, 1000);
    }

    #[test]
    fn test_per_code_rounding_half_away_from_zero() {
        // 3150 * 8.25% = 259.875 -> 260
        let taxes = apply_tax_codes(3_150, &[code(7, dec!(8.25), false, 0)]).unwrap();
        assert_eq!(taxes[0].amount_minor, 260);
    }

    #[test]
    fn test_negative_subtotal_taxes_round_away_from_zero() {
        // Credit notes carry negative lines: -3150 * 8.25% = -259.875 -> -260.
        let taxes = apply_tax_codes(-3_150, &[code(7, dec!(8.25), false, 0)]).unwrap();
        assert_eq!(taxes[0].amount_minor, -260);
    }
}
