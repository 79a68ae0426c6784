//! Test Data Builders
//!
//! Builder patterns for constructing test documents with sensible
//! defaults, so tests specify only the fields they care about.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{CompanyId, CurrencyCode, DocumentId, LineId, Money, RfqItemId, TaxCodeId};
use domain_totals::{DocumentKind, DocumentRecord, LineRecord};

use crate::fixtures::StringFixtures;

/// Builder for persisted document records
pub struct DocumentRecordBuilder {
    id: DocumentId,
    number: String,
    kind: DocumentKind,
    company_id: Option<CompanyId>,
    currency: CurrencyCode,
    minor_unit: u32,
    subtotal_minor: i64,
    tax_total_minor: i64,
    grand_total_minor: i64,
    lines: Vec<LineRecord>,
}

impl Default for DocumentRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRecordBuilder {
    /// A USD invoice with a company, zero totals, and no lines
    pub fn new() -> Self {
        Self {
            id: DocumentId::new(),
            number: StringFixtures::document_number(),
            kind: DocumentKind::Invoice,
            company_id: Some(CompanyId::new()),
            currency: CurrencyCode::new("USD").expect("valid code"),
            minor_unit: 2,
            subtotal_minor: 0,
            tax_total_minor: 0,
            grand_total_minor: 0,
            lines: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: DocumentId) -> Self {
        self.id = id;
        self
    }

    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_company(mut self, company: CompanyId) -> Self {
        self.company_id = Some(company);
        self
    }

    /// Drops the company association (for MissingCompanyContext tests)
    pub fn without_company(mut self) -> Self {
        self.company_id = None;
        self
    }

    /// Sets the document currency and the minor unit used to derive the
    /// decimal forms of pre-seeded totals
    pub fn with_currency(mut self, code: &str, minor_unit: u32) -> Self {
        self.currency = CurrencyCode::new(code).expect("valid test currency code");
        self.minor_unit = minor_unit;
        self
    }

    /// Pre-seeds persisted totals, as a previous recalculation would have
    pub fn with_totals_minor(mut self, subtotal: i64, tax_total: i64) -> Self {
        self.subtotal_minor = subtotal;
        self.tax_total_minor = tax_total;
        self.grand_total_minor = subtotal + tax_total;
        self
    }

    pub fn with_line(mut self, line: LineRecord) -> Self {
        self.lines.push(line);
        self
    }

    pub fn build(self) -> DocumentRecord {
        let as_decimal = |minor: i64| Money::from_minor(minor, self.currency, self.minor_unit).to_decimal();
        DocumentRecord {
            id: self.id,
            number: self.number,
            kind: self.kind,
            company_id: self.company_id,
            currency: self.currency,
            subtotal: as_decimal(self.subtotal_minor),
            subtotal_minor: self.subtotal_minor,
            tax_total: as_decimal(self.tax_total_minor),
            tax_total_minor: self.tax_total_minor,
            grand_total: as_decimal(self.grand_total_minor),
            grand_total_minor: self.grand_total_minor,
            lines: self.lines,
        }
    }
}

/// Builder for persisted line records
pub struct LineRecordBuilder {
    id: LineId,
    rfq_item_id: RfqItemId,
    currency: Option<CurrencyCode>,
    minor_unit: u32,
    unit_price_minor: i64,
    line_subtotal_minor: i64,
    line_total_minor: i64,
    requested_quantity: Decimal,
    tax_code_ids: Vec<TaxCodeId>,
}

impl Default for LineRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineRecordBuilder {
    /// One unit at 10.00 USD, no taxes, nothing computed yet
    pub fn new() -> Self {
        Self {
            id: LineId::new(),
            rfq_item_id: RfqItemId::new(),
            currency: None,
            minor_unit: 2,
            unit_price_minor: 1000,
            line_subtotal_minor: 0,
            line_total_minor: 0,
            requested_quantity: dec!(1),
            tax_code_ids: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: LineId) -> Self {
        self.id = id;
        self
    }

    /// Sets a line-level currency override
    pub fn with_currency(mut self, code: &str) -> Self {
        self.currency = Some(CurrencyCode::new(code).expect("valid test currency code"));
        self
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.requested_quantity = quantity;
        self
    }

    pub fn with_unit_price_minor(mut self, unit_price_minor: i64) -> Self {
        self.unit_price_minor = unit_price_minor;
        self
    }

    pub fn with_tax_codes(mut self, ids: &[i64]) -> Self {
        self.tax_code_ids = ids.iter().copied().map(TaxCodeId::new).collect();
        self
    }

    /// Pre-seeds computed line figures, as a previous recalculation would
    pub fn with_computed_minor(mut self, line_subtotal: i64, line_total: i64) -> Self {
        self.line_subtotal_minor = line_subtotal;
        self.line_total_minor = line_total;
        self
    }

    /// Sets the minor unit used to derive decimal forms (defaults to 2)
    pub fn with_minor_unit(mut self, minor_unit: u32) -> Self {
        self.minor_unit = minor_unit;
        self
    }

    pub fn build(self) -> LineRecord {
        let decimal_currency = self
            .currency
            .unwrap_or_else(|| CurrencyCode::new("USD").expect("valid code"));
        let as_decimal = |minor: i64| Money::from_minor(minor, decimal_currency, self.minor_unit).to_decimal();
        LineRecord {
            id: self.id,
            rfq_item_id: self.rfq_item_id,
            currency: self.currency,
            unit_price: as_decimal(self.unit_price_minor),
            unit_price_minor: self.unit_price_minor,
            line_subtotal: as_decimal(self.line_subtotal_minor),
            line_subtotal_minor: self.line_subtotal_minor,
            line_total: as_decimal(self.line_total_minor),
            line_total_minor: self.line_total_minor,
            requested_quantity: self.requested_quantity,
            tax_code_ids: self.tax_code_ids,
            taxes: Vec::new(),
        }
    }
}
