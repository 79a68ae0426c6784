//! Core Kernel - Foundational types for the sourcing marketplace
//!
//! This crate provides the fundamental building blocks used across all
//! domain modules:
//! - Money as exact minor-unit integers with lossless decimal conversion
//! - Currency codes and percentage rates
//! - Common identifiers and value objects

pub mod identifiers;
pub mod money;

pub use identifiers::{
    AuditEventId, CompanyId, DocumentId, LineId, RfqItemId, TaxAssociationId, TaxCodeId,
};
pub use money::{round_to_minor, CurrencyCode, Money, MoneyError, Rate, MAX_MINOR_UNIT};
