//! End-to-end tests for the totals engine against in-memory ports

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::{DocumentId, TaxCodeId};
use domain_totals::{
    CurrencyMismatch, DocumentKind, RecalculateTotals, TotalsError,
};
use test_utils::{
    init_test_tracing, DocumentRecordBuilder, FailPoint, FailingAuditSink,
    InMemoryCurrencyCatalog, InMemoryDocumentStore, InMemoryTaxCodeCatalog, LineRecordBuilder,
    RecordingAuditSink,
};

struct Harness {
    store: Arc<InMemoryDocumentStore>,
    audit: Arc<RecordingAuditSink>,
    action: RecalculateTotals,
}

fn harness(
    store: InMemoryDocumentStore,
    currencies: InMemoryCurrencyCatalog,
    tax_codes: InMemoryTaxCodeCatalog,
) -> Harness {
    init_test_tracing();
    let store = Arc::new(store);
    let audit = Arc::new(RecordingAuditSink::new());
    let action = RecalculateTotals::new(
        store.clone(),
        Arc::new(currencies),
        Arc::new(tax_codes),
        audit.clone(),
    );
    Harness { store, audit, action }
}

fn standard_catalogs() -> (InMemoryCurrencyCatalog, InMemoryTaxCodeCatalog) {
    (
        InMemoryCurrencyCatalog::standard(),
        InMemoryTaxCodeCatalog::new()
            .with_code(1, dec!(8.25))
            .with_code(2, dec!(5))
            .with_code(3, dec!(3)),
    )
}

// ============================================================================
// Core calculation scenarios
// ============================================================================

#[tokio::test]
async fn test_single_line_with_one_tax_code() {
    // qty 3 x 10.50 USD at 8.25%: 3150, tax 259.875 -> 260, total 3410.
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new()
        .with_quantity(dec!(3))
        .with_unit_price_minor(1050)
        .with_tax_codes(&[1])
        .build();
    let line_id = line.id;
    let document = DocumentRecordBuilder::new().with_line(line).build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    let summary = h.action.execute(document_id).await.unwrap();

    assert_eq!(summary.totals.subtotal_minor, 3150);
    assert_eq!(summary.totals.tax_total_minor, 260);
    assert_eq!(summary.totals.grand_total_minor, 3410);
    assert_eq!(summary.totals.minor_unit, 2);

    assert_eq!(summary.lines.len(), 1);
    assert_eq!(summary.lines[0].line_subtotal_minor, 3150);
    assert_eq!(summary.lines[0].taxes[0].amount_minor, 260);
    assert_eq!(summary.lines[0].line_total_minor, 3410);

    let persisted = h.store.document(document_id).unwrap();
    assert_eq!(persisted.subtotal_minor, 3150);
    assert_eq!(persisted.subtotal, dec!(31.50));
    assert_eq!(persisted.grand_total_minor, 3410);
    assert_eq!(persisted.grand_total, dec!(34.10));

    let persisted_line = &persisted.lines[0];
    assert_eq!(persisted_line.id, line_id);
    assert_eq!(persisted_line.unit_price, dec!(10.50));
    assert_eq!(persisted_line.line_subtotal_minor, 3150);
    assert_eq!(persisted_line.line_total_minor, 3410);
    assert_eq!(persisted_line.taxes.len(), 1);
    assert_eq!(persisted_line.taxes[0].tax_code_id, TaxCodeId::new(1));
    assert_eq!(persisted_line.taxes[0].amount_minor, 260);
    assert_eq!(persisted_line.taxes[0].rate_applied, dec!(0.0825));
}

#[tokio::test]
async fn test_empty_document_yields_zero_totals() {
    let (currencies, tax_codes) = standard_catalogs();
    let document = DocumentRecordBuilder::new().build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    let summary = h.action.execute(document_id).await.unwrap();

    assert_eq!(summary.totals.subtotal_minor, 0);
    assert_eq!(summary.totals.tax_total_minor, 0);
    assert_eq!(summary.totals.grand_total_minor, 0);
    assert_eq!(summary.totals.minor_unit, 2);
    assert!(summary.lines.is_empty());
}

#[tokio::test]
async fn test_two_tax_codes_round_independently() {
    // 5% and 3% on 100.00: 500 and 300, never a combined-rate figure.
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new()
        .with_quantity(dec!(1))
        .with_unit_price_minor(10_000)
        .with_tax_codes(&[2, 3])
        .build();
    let document = DocumentRecordBuilder::new().with_line(line).build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    let summary = h.action.execute(document_id).await.unwrap();

    let taxes = &summary.lines[0].taxes;
    assert_eq!(taxes.len(), 2);
    assert_eq!(taxes[0].amount_minor, 500);
    assert_eq!(taxes[1].amount_minor, 300);
    assert_eq!(summary.lines[0].line_total_minor, 10_800);
    assert_eq!(summary.totals.tax_total_minor, 800);
}

#[tokio::test]
async fn test_compounding_code_applies_after_non_compounding() {
    let currencies = InMemoryCurrencyCatalog::standard();
    let tax_codes = InMemoryTaxCodeCatalog::new()
        .with_code_entry(10, dec!(5), false, 0)
        .with_code_entry(11, dec!(10), true, 1);
    let line = LineRecordBuilder::new()
        .with_quantity(dec!(1))
        .with_unit_price_minor(10_000)
        .with_tax_codes(&[11, 10])
        .build();
    let document = DocumentRecordBuilder::new().with_line(line).build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    let summary = h.action.execute(document_id).await.unwrap();

    // Catalog position, not assignment order, decides: 5% on 10000 = 500,
    // then compounding 10% on 10500 = 1050.
    let taxes = &summary.lines[0].taxes;
    assert_eq!(taxes[0].tax_code_id, TaxCodeId::new(10));
    assert_eq!(taxes[0].amount_minor, 500);
    assert_eq!(taxes[1].tax_code_id, TaxCodeId::new(11));
    assert_eq!(taxes[1].amount_minor, 1050);
    assert_eq!(summary.totals.grand_total_minor, 11_550);
}

#[tokio::test]
async fn test_fractional_quantity_rounds_half_away_from_zero() {
    // 2.5 kg x 1.99 = 497.5 minor -> 498.
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new()
        .with_quantity(dec!(2.5))
        .with_unit_price_minor(199)
        .build();
    let document = DocumentRecordBuilder::new().with_line(line).build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    let summary = h.action.execute(document_id).await.unwrap();

    assert_eq!(summary.totals.subtotal_minor, 498);
}

#[tokio::test]
async fn test_zero_minor_unit_currency() {
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new()
        .with_minor_unit(0)
        .with_quantity(dec!(3))
        .with_unit_price_minor(1050)
        .with_tax_codes(&[1])
        .build();
    let document = DocumentRecordBuilder::new()
        .with_currency("JPY", 0)
        .with_line(line)
        .build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    let summary = h.action.execute(document_id).await.unwrap();

    assert_eq!(summary.totals.minor_unit, 0);
    assert_eq!(summary.totals.subtotal_minor, 3150);

    let persisted = h.store.document(document_id).unwrap();
    // Whole yen: the decimal form carries no fraction digits.
    assert_eq!(persisted.subtotal, dec!(3150));
}

#[tokio::test]
async fn test_multi_line_totals_are_exact_sums() {
    let (currencies, tax_codes) = standard_catalogs();
    let lines = vec![
        LineRecordBuilder::new()
            .with_quantity(dec!(3))
            .with_unit_price_minor(1050)
            .with_tax_codes(&[1])
            .build(),
        LineRecordBuilder::new()
            .with_quantity(dec!(7))
            .with_unit_price_minor(333)
            .with_tax_codes(&[2, 3])
            .build(),
        LineRecordBuilder::new()
            .with_quantity(dec!(0.75))
            .with_unit_price_minor(12_499)
            .build(),
    ];
    let mut builder = DocumentRecordBuilder::new();
    for line in lines {
        builder = builder.with_line(line);
    }
    let document = builder.build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    let summary = h.action.execute(document_id).await.unwrap();

    let line_subtotal_sum: i64 = summary.lines.iter().map(|l| l.line_subtotal_minor).sum();
    let tax_sum: i64 = summary.lines.iter().map(|l| l.tax_minor()).sum();
    assert_eq!(summary.totals.subtotal_minor, line_subtotal_sum);
    assert_eq!(summary.totals.tax_total_minor, tax_sum);
    assert_eq!(
        summary.totals.grand_total_minor,
        summary.totals.subtotal_minor + summary.totals.tax_total_minor
    );
}

// ============================================================================
// Preconditions and error paths
// ============================================================================

#[tokio::test]
async fn test_line_currency_mismatch_aborts_without_writes() {
    let (currencies, tax_codes) = standard_catalogs();
    // Lowercase on purpose: comparison is case-insensitive, and "eur"
    // still conflicts with a USD document.
    let line = LineRecordBuilder::new().with_currency("eur").build();
    let line_id = line.id;
    let document = DocumentRecordBuilder::new().with_line(line).build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    let error = h.action.execute(document_id).await.unwrap_err();

    match error {
        TotalsError::CurrencyMismatch(CurrencyMismatch::LineCurrency { line, expected, found }) => {
            assert_eq!(line, line_id);
            assert_eq!(expected.as_str(), "USD");
            assert_eq!(found.as_str(), "EUR");
        }
        other => panic!("expected line currency mismatch, got {other:?}"),
    }

    let stats = h.store.stats();
    assert_eq!(stats.line_updates, 0);
    assert_eq!(stats.tax_writes(), 0);
    assert_eq!(stats.totals_updates, 0);
    assert_eq!(stats.commits, 0);
    assert!(h.audit.records().is_empty());
}

#[tokio::test]
async fn test_matching_line_currency_in_different_case_is_accepted() {
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new().with_currency("usd").build();
    let document = DocumentRecordBuilder::new().with_line(line).build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    assert!(h.action.execute(document_id).await.is_ok());
}

#[tokio::test]
async fn test_unknown_tax_code_fails_and_leaves_totals_untouched() {
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new()
        .with_unit_price_minor(2000)
        .with_tax_codes(&[999])
        .build();
    let line_id = line.id;
    let document = DocumentRecordBuilder::new()
        .with_totals_minor(2000, 0)
        .with_line(line)
        .build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    let error = h.action.execute(document_id).await.unwrap_err();

    match error {
        TotalsError::UnknownTaxCode { line, tax_code } => {
            assert_eq!(line, line_id);
            assert_eq!(tax_code, TaxCodeId::new(999));
        }
        other => panic!("expected unknown tax code, got {other:?}"),
    }

    let persisted = h.store.document(document_id).unwrap();
    assert_eq!(persisted.subtotal_minor, 2000);
    assert_eq!(persisted.grand_total_minor, 2000);
    assert_eq!(h.store.stats().commits, 0);
}

#[tokio::test]
async fn test_missing_company_context() {
    let (currencies, tax_codes) = standard_catalogs();
    let document = DocumentRecordBuilder::new().without_company().build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    let error = h.action.execute(document_id).await.unwrap_err();

    assert!(matches!(
        error,
        TotalsError::MissingCompanyContext { document } if document == document_id
    ));
    assert_eq!(h.store.stats().commits, 0);
}

#[tokio::test]
async fn test_unresolvable_document_currency_is_a_mismatch() {
    let tax_codes = InMemoryTaxCodeCatalog::new();
    // Catalog knows USD only; the document settles in GBP.
    let currencies = InMemoryCurrencyCatalog::new().with_currency("USD", 2);
    let document = DocumentRecordBuilder::new().with_currency("GBP", 2).build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    let error = h.action.execute(document_id).await.unwrap_err();

    assert!(matches!(
        error,
        TotalsError::CurrencyMismatch(CurrencyMismatch::UnknownCurrency(code)) if code.as_str() == "GBP"
    ));
}

#[tokio::test]
async fn test_zero_quantity_identifies_the_line() {
    let (currencies, tax_codes) = standard_catalogs();
    let good = LineRecordBuilder::new().build();
    let bad = LineRecordBuilder::new().with_quantity(Decimal::ZERO).build();
    let bad_id = bad.id;
    let document = DocumentRecordBuilder::new()
        .with_line(good)
        .with_line(bad)
        .build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    let error = h.action.execute(document_id).await.unwrap_err();

    assert!(matches!(
        error,
        TotalsError::InvalidQuantity { line, .. } if line == bad_id
    ));
    assert_eq!(h.store.stats().commits, 0);
}

#[tokio::test]
async fn test_negative_quantity_is_rejected() {
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new().with_quantity(dec!(-2)).build();
    let document = DocumentRecordBuilder::new().with_line(line).build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    assert!(matches!(
        h.action.execute(document_id).await.unwrap_err(),
        TotalsError::InvalidQuantity { .. }
    ));
}

#[tokio::test]
async fn test_unknown_document() {
    let (currencies, tax_codes) = standard_catalogs();
    let h = harness(InMemoryDocumentStore::new(), currencies, tax_codes);

    let missing = DocumentId::new();
    assert!(matches!(
        h.action.execute(missing).await.unwrap_err(),
        TotalsError::DocumentNotFound(id) if id == missing
    ));
}

#[tokio::test]
async fn test_mid_transaction_failure_rolls_back_everything() {
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new()
        .with_quantity(dec!(2))
        .with_unit_price_minor(500)
        .with_tax_codes(&[2])
        .build();
    let document = DocumentRecordBuilder::new()
        .with_totals_minor(700, 0)
        .with_line(line)
        .build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    h.store.fail_on(FailPoint::UpdateDocumentTotals);

    let error = h.action.execute(document_id).await.unwrap_err();
    assert!(matches!(error, TotalsError::Store(_)));

    // The line update and tax insert that happened before the failure are
    // not visible: the transaction rolled back as a unit.
    let persisted = h.store.document(document_id).unwrap();
    assert_eq!(persisted.subtotal_minor, 700);
    assert!(persisted.lines[0].taxes.is_empty());

    let stats = h.store.stats();
    assert_eq!(stats.commits, 0);
    assert_eq!(stats.rollbacks, 1);
    assert!(h.audit.records().is_empty());
}

// ============================================================================
// Idempotence and sync minimality
// ============================================================================

#[tokio::test]
async fn test_recalculation_is_idempotent() {
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new()
        .with_quantity(dec!(3))
        .with_unit_price_minor(1050)
        .with_tax_codes(&[1])
        .build();
    let document = DocumentRecordBuilder::new().with_line(line).build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );

    let first = h.action.execute(document_id).await.unwrap();
    let after_first = h.store.document(document_id).unwrap();

    let second = h.action.execute(document_id).await.unwrap();
    let after_second = h.store.document(document_id).unwrap();

    assert_eq!(first.totals, second.totals);
    assert_eq!(after_first.subtotal, after_second.subtotal);
    assert_eq!(after_first.grand_total_minor, after_second.grand_total_minor);
}

#[tokio::test]
async fn test_unchanged_rerun_issues_no_tax_writes_and_no_audit() {
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new()
        .with_quantity(dec!(3))
        .with_unit_price_minor(1050)
        .with_tax_codes(&[1])
        .build();
    let document = DocumentRecordBuilder::new().with_line(line).build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );

    let first = h.action.execute(document_id).await.unwrap();
    assert!(first.audited);
    assert_eq!(first.sync.inserted, 1);
    assert_eq!(h.audit.records().len(), 1);

    h.store.reset_stats();
    let second = h.action.execute(document_id).await.unwrap();

    assert!(!second.audited);
    assert_eq!(second.sync.inserted, 0);
    assert_eq!(second.sync.updated, 0);
    assert_eq!(second.sync.removed, 0);
    assert_eq!(second.sync.unchanged, 1);
    assert_eq!(h.store.stats().tax_writes(), 0);
    assert_eq!(h.audit.records().len(), 1);
}

#[tokio::test]
async fn test_amount_change_updates_association_in_place() {
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new()
        .with_quantity(dec!(1))
        .with_unit_price_minor(10_000)
        .with_tax_codes(&[2])
        .build();
    let document = DocumentRecordBuilder::new().with_line(line).build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );

    h.action.execute(document_id).await.unwrap();
    let seeded = h.store.document(document_id).unwrap();
    let original = seeded.lines[0].taxes[0].clone();
    assert_eq!(original.amount_minor, 500);

    // Reprice the line; the association must update in place, keeping its
    // identity and creation timestamp.
    let mut repriced = seeded.clone();
    repriced.lines[0].unit_price_minor = 20_000;
    h.store.insert(repriced);

    let summary = h.action.execute(document_id).await.unwrap();
    assert_eq!(summary.sync.updated, 1);
    assert_eq!(summary.sync.inserted, 0);
    assert_eq!(summary.sync.removed, 0);

    let updated = h.store.document(document_id).unwrap().lines[0].taxes[0].clone();
    assert_eq!(updated.amount_minor, 1000);
    assert_eq!(updated.id, original.id);
    assert_eq!(updated.created_at, original.created_at);
}

#[tokio::test]
async fn test_unassigned_code_is_removed_and_new_code_inserted() {
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new()
        .with_quantity(dec!(1))
        .with_unit_price_minor(10_000)
        .with_tax_codes(&[2])
        .build();
    let document = DocumentRecordBuilder::new().with_line(line).build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    h.action.execute(document_id).await.unwrap();

    // Swap the assignment from code 2 to code 3.
    let mut reassigned = h.store.document(document_id).unwrap();
    reassigned.lines[0].tax_code_ids = vec![TaxCodeId::new(3)];
    h.store.insert(reassigned);

    let summary = h.action.execute(document_id).await.unwrap();
    assert_eq!(summary.sync.inserted, 1);
    assert_eq!(summary.sync.removed, 1);

    let taxes = &h.store.document(document_id).unwrap().lines[0].taxes;
    assert_eq!(taxes.len(), 1);
    assert_eq!(taxes[0].tax_code_id, TaxCodeId::new(3));
    assert_eq!(taxes[0].amount_minor, 300);
}

// ============================================================================
// Audit behavior
// ============================================================================

#[tokio::test]
async fn test_audit_delta_carries_only_changed_fields() {
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new()
        .with_quantity(dec!(3))
        .with_unit_price_minor(1050)
        .with_tax_codes(&[1])
        .build();
    let line_id = line.id;
    let document = DocumentRecordBuilder::new()
        .with_kind(DocumentKind::Invoice)
        .with_line(line)
        .build();
    let document_id = document.id;

    let h = harness(
        InMemoryDocumentStore::new().with_document(document),
        currencies,
        tax_codes,
    );
    h.action.execute(document_id).await.unwrap();

    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.entity, "invoice");
    assert_eq!(record.entity_id, document_id.to_string());

    assert_eq!(record.before["subtotal_minor"], serde_json::json!(0));
    assert_eq!(record.after["subtotal_minor"], serde_json::json!(3150));
    assert_eq!(record.after["grand_total_minor"], serde_json::json!(3410));

    let tax_key = format!("line.{}.tax.1.amount_minor", line_id.as_uuid());
    assert_eq!(record.before[&tax_key], serde_json::Value::Null);
    assert_eq!(record.after[&tax_key], serde_json::json!(260));

    // The unit price did not change, so it is not part of the delta.
    let price_key = format!("line.{}.unit_price_minor", line_id.as_uuid());
    assert!(!record.before.contains_key(&price_key));
    assert!(!record.after.contains_key(&price_key));
}

#[tokio::test]
async fn test_audit_failure_does_not_fail_the_recalculation() {
    let (currencies, tax_codes) = standard_catalogs();
    let line = LineRecordBuilder::new()
        .with_quantity(dec!(2))
        .with_unit_price_minor(750)
        .build();
    let document = DocumentRecordBuilder::new().with_line(line).build();
    let document_id = document.id;

    init_test_tracing();
    let store = Arc::new(InMemoryDocumentStore::new().with_document(document));
    let action = RecalculateTotals::new(
        store.clone(),
        Arc::new(currencies),
        Arc::new(tax_codes),
        Arc::new(FailingAuditSink),
    );

    let summary = action.execute(document_id).await.unwrap();
    assert!(!summary.audited);

    // The computation still landed.
    assert_eq!(store.document(document_id).unwrap().subtotal_minor, 1500);
}

// ============================================================================
// Properties
// ============================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    struct ArbLine {
        quantity_milli: u32,
        unit_price_minor: i64,
        with_five_percent: bool,
        with_825: bool,
    }

    fn arb_line() -> impl Strategy<Value = ArbLine> {
        (1u32..5_000_000, 1i64..1_000_000, any::<bool>(), any::<bool>()).prop_map(
            |(quantity_milli, unit_price_minor, with_five_percent, with_825)| ArbLine {
                quantity_milli,
                unit_price_minor,
                with_five_percent,
                with_825,
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn totals_always_sum_exactly(lines in proptest::collection::vec(arb_line(), 0..8)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                let (currencies, tax_codes) = standard_catalogs();
                let mut builder = DocumentRecordBuilder::new();
                for line in &lines {
                    let mut codes: Vec<i64> = Vec::new();
                    if line.with_five_percent {
                        codes.push(2);
                    }
                    if line.with_825 {
                        codes.push(1);
                    }
                    builder = builder.with_line(
                        LineRecordBuilder::new()
                            // Milli-quantities exercise fractional amounts.
                            .with_quantity(Decimal::new(line.quantity_milli as i64, 3))
                            .with_unit_price_minor(line.unit_price_minor)
                            .with_tax_codes(&codes)
                            .build(),
                    );
                }
                let document = builder.build();
                let document_id = document.id;

                let h = harness(
                    InMemoryDocumentStore::new().with_document(document),
                    currencies,
                    tax_codes,
                );
                let first = h.action.execute(document_id).await.unwrap();

                let line_sum: i64 = first.lines.iter().map(|l| l.line_subtotal_minor).sum();
                let tax_sum: i64 = first.lines.iter().map(|l| l.tax_minor()).sum();
                assert_eq!(first.totals.subtotal_minor, line_sum);
                assert_eq!(first.totals.tax_total_minor, tax_sum);
                assert_eq!(
                    first.totals.grand_total_minor,
                    first.totals.subtotal_minor + first.totals.tax_total_minor
                );

                // Idempotence: the second run converges with no tax churn.
                h.store.reset_stats();
                let second = h.action.execute(document_id).await.unwrap();
                assert_eq!(first.totals, second.totals);
                assert_eq!(h.store.stats().tax_writes(), 0);
                assert!(!second.audited);
            });
        }
    }
}
