//! Shared test utilities for the totals engine workspace
//!
//! Provides in-memory implementations of every engine port, builders for
//! document and line records, and common fixture values. Everything here
//! is hermetic: no database, no network.

pub mod builders;
pub mod fixtures;
pub mod memory;

pub use builders::{DocumentRecordBuilder, LineRecordBuilder};
pub use fixtures::{IdFixtures, MoneyFixtures, StringFixtures};
pub use memory::{
    CapturedAudit, FailPoint, FailingAuditSink, InMemoryCurrencyCatalog, InMemoryDocumentStore,
    InMemoryTaxCodeCatalog, RecordingAuditSink, WriteStats,
};

use once_cell::sync::Lazy;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

/// Initializes tracing once for the whole test binary
///
/// Safe to call from every test; only the first call installs the
/// subscriber. Controlled through `RUST_LOG` as usual.
pub fn init_test_tracing() {
    Lazy::force(&TRACING);
}
