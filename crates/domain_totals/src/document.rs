//! Persisted document and line records
//!
//! These are the storage-layer snapshots the engine reads and the write
//! payloads it hands back. The engine only ever mutates the monetary and
//! tax fields represented here; all other document state belongs to the
//! surrounding application.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{CompanyId, CurrencyCode, DocumentId, LineId, RfqItemId, TaxAssociationId, TaxCodeId};

/// The commercial document kinds of the sourcing lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Rfq,
    Quote,
    PurchaseOrder,
    Invoice,
    CreditNote,
}

impl DocumentKind {
    /// Returns the storage/audit name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Rfq => "rfq",
            DocumentKind::Quote => "quote",
            DocumentKind::PurchaseOrder => "purchase_order",
            DocumentKind::Invoice => "invoice",
            DocumentKind::CreditNote => "credit_note",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rfq" => Ok(DocumentKind::Rfq),
            "quote" => Ok(DocumentKind::Quote),
            "purchase_order" => Ok(DocumentKind::PurchaseOrder),
            "invoice" => Ok(DocumentKind::Invoice),
            "credit_note" => Ok(DocumentKind::CreditNote),
            other => Err(format!("unknown document kind: {}", other)),
        }
    }
}

/// A persisted document with its lines, as loaded by the document store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    /// Human-readable document number
    pub number: String,
    pub kind: DocumentKind,
    /// Owning company; absent on orphaned documents, which cannot be
    /// recalculated
    pub company_id: Option<CompanyId>,
    /// The document's operating currency; all lines settle in it
    pub currency: CurrencyCode,
    pub subtotal: Decimal,
    pub subtotal_minor: i64,
    pub tax_total: Decimal,
    pub tax_total_minor: i64,
    pub grand_total: Decimal,
    pub grand_total_minor: i64,
    pub lines: Vec<LineRecord>,
}

/// A persisted document line joined with its quantity source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRecord {
    pub id: LineId,
    /// The RFQ item this line prices; the requested quantity lives there
    pub rfq_item_id: RfqItemId,
    /// Line-level currency override; when present it must match the
    /// document currency
    pub currency: Option<CurrencyCode>,
    pub unit_price: Decimal,
    pub unit_price_minor: i64,
    pub line_subtotal: Decimal,
    pub line_subtotal_minor: i64,
    pub line_total: Decimal,
    pub line_total_minor: i64,
    /// Quantity sourced from the related RFQ item
    pub requested_quantity: Decimal,
    /// Tax codes assigned to this line
    pub tax_code_ids: Vec<TaxCodeId>,
    /// Persisted tax associations computed by an earlier recalculation
    pub taxes: Vec<TaxAssociationRecord>,
}

/// A durable link between a line and a tax code, with the amount charged
/// at computation time
///
/// Created, updated, and deleted exclusively by the tax sync service.
/// `created_at` survives updates; downstream reporting depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxAssociationRecord {
    pub id: TaxAssociationId,
    pub line_id: LineId,
    pub tax_code_id: TaxCodeId,
    pub rate_applied: Decimal,
    pub amount_minor: i64,
    pub created_at: DateTime<Utc>,
}

/// Write payload for one line's recalculated monetary fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineUpdate {
    pub line: LineId,
    pub unit_price: Decimal,
    pub unit_price_minor: i64,
    pub line_subtotal: Decimal,
    pub line_subtotal_minor: i64,
    pub line_total: Decimal,
    pub line_total_minor: i64,
}

/// Write payload for a new tax association
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTaxAssociation {
    pub line_id: LineId,
    pub tax_code_id: TaxCodeId,
    pub rate_applied: Decimal,
    pub amount_minor: i64,
}

/// Write payload for an in-place tax association update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxAssociationUpdate {
    pub id: TaxAssociationId,
    pub rate_applied: Decimal,
    pub amount_minor: i64,
}

/// Write payload for the document-level totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTotalsUpdate {
    pub document: DocumentId,
    pub subtotal: Decimal,
    pub subtotal_minor: i64,
    pub tax_total: Decimal,
    pub tax_total_minor: i64,
    pub grand_total: Decimal,
    pub grand_total_minor: i64,
}
