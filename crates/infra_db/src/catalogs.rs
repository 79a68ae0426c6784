//! PostgreSQL-backed currency and tax code catalogs
//!
//! The currency catalog keeps a bounded in-process cache because minor
//! units are read on every recalculation and essentially never change.
//! The cache is owned by the catalog instance and invalidated explicitly;
//! there is no hidden process-global state.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use core_kernel::{CurrencyCode, Rate, TaxCodeId, MAX_MINOR_UNIT};
use domain_totals::ports::{CatalogError, CurrencyCatalog, ResolvedTaxCode, TaxCodeCatalog};

use crate::error::DatabaseError;

fn lookup_err(error: sqlx::Error) -> CatalogError {
    DatabaseError::from(error).into()
}

/// Default bound on cached currency entries
const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Currency catalog backed by the `currencies` table
pub struct PgCurrencyCatalog {
    pool: PgPool,
    cache: Mutex<HashMap<CurrencyCode, u32>>,
    capacity: usize,
}

impl PgCurrencyCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self::with_capacity(pool, DEFAULT_CACHE_CAPACITY)
    }

    /// Creates a catalog with an explicit cache bound
    pub fn with_capacity(pool: PgPool, capacity: usize) -> Self {
        Self {
            pool,
            cache: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Drops every cached entry
    ///
    /// Call after currency reference data changes; the next lookup per
    /// code goes back to the database.
    pub fn invalidate(&self) {
        self.cache.lock().expect("currency cache mutex").clear();
        debug!("currency catalog cache invalidated");
    }
}

#[async_trait]
impl CurrencyCatalog for PgCurrencyCatalog {
    async fn resolve_minor_unit(
        &self,
        currency: &CurrencyCode,
    ) -> Result<Option<u32>, CatalogError> {
        if let Some(cached) = self
            .cache
            .lock()
            .expect("currency cache mutex")
            .get(currency)
            .copied()
        {
            return Ok(Some(cached));
        }

        let row = sqlx::query("SELECT minor_unit FROM currencies WHERE code = $1")
            .bind(currency.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(lookup_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: i16 = row.try_get("minor_unit").map_err(lookup_err)?;
        let minor_unit = u32::try_from(raw)
            .ok()
            .filter(|unit| *unit <= MAX_MINOR_UNIT)
            .ok_or_else(|| CatalogError::InvalidEntry {
                entity: "currency",
                id: currency.to_string(),
                message: format!("minor unit {} is out of range", raw),
            })?;

        let mut cache = self.cache.lock().expect("currency cache mutex");
        if cache.len() < self.capacity {
            cache.insert(*currency, minor_unit);
        }
        Ok(Some(minor_unit))
    }
}

/// Tax code catalog backed by the `tax_codes` table
pub struct PgTaxCodeCatalog {
    pool: PgPool,
}

impl PgTaxCodeCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaxCodeCatalog for PgTaxCodeCatalog {
    async fn resolve_rate(&self, id: TaxCodeId) -> Result<Option<ResolvedTaxCode>, CatalogError> {
        let row = sqlx::query("SELECT rate, compounding, position FROM tax_codes WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(lookup_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let rate: Decimal = row.try_get("rate").map_err(lookup_err)?;
        let compounding: bool = row.try_get("compounding").map_err(lookup_err)?;
        let position: i32 = row.try_get("position").map_err(lookup_err)?;

        Ok(Some(ResolvedTaxCode {
            id,
            rate: Rate::new(rate),
            compounding,
            position,
        }))
    }
}
