//! Strongly-typed identifiers for domain entities
//!
//! Using newtype wrappers around UUIDs provides type safety and prevents
//! accidental mixing of different identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates a new time-ordered identifier (v7)
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Strip prefix if present
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Commercial document identifiers (RFQ, quote, purchase order, invoice, credit note)
define_id!(DocumentId, "DOC");
define_id!(LineId, "LIN");
define_id!(RfqItemId, "RFI");

// Tenant identifiers
define_id!(CompanyId, "CMP");

// Tax and audit identifiers
define_id!(TaxAssociationId, "LTX");
define_id!(AuditEventId, "AUD");

/// Identifier of a tax code in the external tax catalog
///
/// Tax codes are catalog-keyed integers, not UUIDs: the catalog is a
/// reference table maintained outside this system.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaxCodeId(i64);

impl TaxCodeId {
    /// Wraps a raw catalog key
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw catalog key
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TaxCodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TaxCodeId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<TaxCodeId> for i64 {
    fn from(id: TaxCodeId) -> i64 {
        id.0
    }
}
