//! Totals engine errors
//!
//! Every failure here aborts the whole recalculation; nothing is retried
//! and nothing is downgraded to a default value. Treating an unknown tax
//! code as 0% would corrupt financial records, so it is an error instead.

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{CurrencyCode, DocumentId, LineId, MoneyError, TaxCodeId};

use crate::ports::{CatalogError, StoreError};

/// Errors produced by the totals engine
#[derive(Debug, Error)]
pub enum TotalsError {
    /// Document lacks a tenant/company association
    #[error("Document {document} has no company association")]
    MissingCompanyContext { document: DocumentId },

    /// A currency disagreement: between a line and its document, between
    /// two Money operands, or between a document and the currency catalog
    #[error("{0}")]
    CurrencyMismatch(#[from] CurrencyMismatch),

    /// A line's sourced quantity is zero or negative
    #[error("Invalid quantity {quantity} on line {line}: must be greater than zero")]
    InvalidQuantity { line: LineId, quantity: Decimal },

    /// A decimal amount failed to parse or an arithmetic step overflowed
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// A referenced tax code has no catalog entry
    #[error("Unknown tax code {tax_code} on line {line}")]
    UnknownTaxCode { line: LineId, tax_code: TaxCodeId },

    /// The requested document does not exist
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    /// A catalog collaborator failed
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A storage collaborator failed
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// The three ways a currency disagreement can surface
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CurrencyMismatch {
    #[error("Line {line} is priced in {found} but the document is {expected}")]
    LineCurrency {
        line: LineId,
        expected: CurrencyCode,
        found: CurrencyCode,
    },

    #[error("Cannot combine amounts in {left} and {right}")]
    Operands { left: String, right: String },

    #[error("Currency {0} is not present in the currency catalog")]
    UnknownCurrency(CurrencyCode),
}

impl From<MoneyError> for TotalsError {
    fn from(error: MoneyError) -> Self {
        match error {
            MoneyError::CurrencyMismatch(left, right) => {
                TotalsError::CurrencyMismatch(CurrencyMismatch::Operands { left, right })
            }
            MoneyError::InvalidAmount(message) => TotalsError::InvalidAmount(message),
            MoneyError::InvalidCurrency(code) => {
                TotalsError::InvalidAmount(format!("invalid currency code: {}", code))
            }
            MoneyError::Overflow => TotalsError::InvalidAmount("arithmetic overflow".to_string()),
        }
    }
}
