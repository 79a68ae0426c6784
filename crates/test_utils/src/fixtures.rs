//! Common fixture values for tests

use fake::faker::company::en::CompanyName;
use fake::Fake;

use core_kernel::{CompanyId, CurrencyCode, Money};

/// Currency and money fixtures
pub struct MoneyFixtures;

impl MoneyFixtures {
    pub fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").expect("valid code")
    }

    pub fn eur() -> CurrencyCode {
        CurrencyCode::new("EUR").expect("valid code")
    }

    pub fn jpy() -> CurrencyCode {
        CurrencyCode::new("JPY").expect("valid code")
    }

    pub fn bhd() -> CurrencyCode {
        CurrencyCode::new("BHD").expect("valid code")
    }

    pub fn usd_amount(minor: i64) -> Money {
        Money::from_minor(minor, Self::usd(), 2)
    }
}

/// Generated string fixtures
pub struct StringFixtures;

impl StringFixtures {
    /// A plausible document number, e.g. "PO-2024-48213"
    pub fn document_number() -> String {
        let serial: u32 = (10_000..100_000).fake();
        format!("PO-2024-{}", serial)
    }

    /// A plausible buyer company name
    pub fn company_name() -> String {
        CompanyName().fake()
    }
}

/// Identifier fixtures
pub struct IdFixtures;

impl IdFixtures {
    pub fn company_id() -> CompanyId {
        CompanyId::new()
    }
}
