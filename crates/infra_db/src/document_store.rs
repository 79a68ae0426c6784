//! PostgreSQL document store
//!
//! Loads commercial documents with their lines, the requested quantity
//! joined from the originating RFQ item, and the persisted tax
//! associations. Writes go through [`PgDocumentTransaction`], one SQLx
//! transaction per recalculation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::Postgres;
use sqlx::{PgPool, Row, Transaction};
use uuid::Uuid;

use core_kernel::{
    CompanyId, CurrencyCode, DocumentId, LineId, RfqItemId, TaxAssociationId, TaxCodeId,
};
use domain_totals::ports::{DocumentStore, DocumentTransaction, StoreError};
use domain_totals::{
    DocumentKind, DocumentRecord, DocumentTotalsUpdate, LineRecord, LineUpdate, NewTaxAssociation,
    TaxAssociationRecord, TaxAssociationUpdate,
};

use crate::error::DatabaseError;

fn store_err(error: sqlx::Error) -> StoreError {
    DatabaseError::from(error).into()
}

/// Document store backed by the `documents` family of tables
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_lines(&self, document: DocumentId) -> Result<Vec<LineRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                l.id, l.rfq_item_id, l.currency,
                l.unit_price, l.unit_price_minor,
                l.line_subtotal, l.line_subtotal_minor,
                l.line_total, l.line_total_minor,
                l.tax_code_ids,
                r.quantity AS requested_quantity
            FROM document_lines l
            JOIN rfq_items r ON r.id = l.rfq_item_id
            WHERE l.document_id = $1
            ORDER BY l.position, l.id
            "#,
        )
        .bind(*document.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let id = LineId::from_uuid(row.try_get("id").map_err(store_err)?);
            let currency: Option<String> = row.try_get("currency").map_err(store_err)?;
            let currency = currency
                .map(|code| CurrencyCode::new(&code))
                .transpose()
                .map_err(|e| StoreError::Query(e.to_string()))?;
            let tax_code_ids: Vec<i64> = row.try_get("tax_code_ids").map_err(store_err)?;

            lines.push(LineRecord {
                id,
                rfq_item_id: RfqItemId::from_uuid(row.try_get("rfq_item_id").map_err(store_err)?),
                currency,
                unit_price: row.try_get("unit_price").map_err(store_err)?,
                unit_price_minor: row.try_get("unit_price_minor").map_err(store_err)?,
                line_subtotal: row.try_get("line_subtotal").map_err(store_err)?,
                line_subtotal_minor: row.try_get("line_subtotal_minor").map_err(store_err)?,
                line_total: row.try_get("line_total").map_err(store_err)?,
                line_total_minor: row.try_get("line_total_minor").map_err(store_err)?,
                requested_quantity: row.try_get("requested_quantity").map_err(store_err)?,
                tax_code_ids: tax_code_ids.into_iter().map(TaxCodeId::new).collect(),
                taxes: self.load_line_taxes(id).await?,
            });
        }
        Ok(lines)
    }

    async fn load_line_taxes(
        &self,
        line: LineId,
    ) -> Result<Vec<TaxAssociationRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, line_id, tax_code_id, rate_applied, amount_minor, created_at
            FROM line_tax_associations
            WHERE line_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(*line.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(TaxAssociationRecord {
                    id: TaxAssociationId::from_uuid(row.try_get("id").map_err(store_err)?),
                    line_id: LineId::from_uuid(row.try_get("line_id").map_err(store_err)?),
                    tax_code_id: TaxCodeId::new(row.try_get("tax_code_id").map_err(store_err)?),
                    rate_applied: row.try_get("rate_applied").map_err(store_err)?,
                    amount_minor: row.try_get("amount_minor").map_err(store_err)?,
                    created_at: row.try_get("created_at").map_err(store_err)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn load(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                number, kind, company_id, currency,
                subtotal, subtotal_minor,
                tax_total, tax_total_minor,
                grand_total, grand_total_minor
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind: String = row.try_get("kind").map_err(store_err)?;
        let kind: DocumentKind = kind.parse().map_err(StoreError::Query)?;
        let currency: String = row.try_get("currency").map_err(store_err)?;
        let currency =
            CurrencyCode::new(&currency).map_err(|e| StoreError::Query(e.to_string()))?;
        let company_id: Option<Uuid> = row.try_get("company_id").map_err(store_err)?;

        Ok(Some(DocumentRecord {
            id,
            number: row.try_get("number").map_err(store_err)?,
            kind,
            company_id: company_id.map(CompanyId::from_uuid),
            currency,
            subtotal: row.try_get("subtotal").map_err(store_err)?,
            subtotal_minor: row.try_get("subtotal_minor").map_err(store_err)?,
            tax_total: row.try_get("tax_total").map_err(store_err)?,
            tax_total_minor: row.try_get("tax_total_minor").map_err(store_err)?,
            grand_total: row.try_get("grand_total").map_err(store_err)?,
            grand_total_minor: row.try_get("grand_total_minor").map_err(store_err)?,
            lines: self.load_lines(id).await?,
        }))
    }

    async fn begin(&self) -> Result<Box<dyn DocumentTransaction>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(Box::new(PgDocumentTransaction { tx }))
    }
}

/// One open SQLx transaction carrying a recalculation's writes
pub struct PgDocumentTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl DocumentTransaction for PgDocumentTransaction {
    async fn update_line(&mut self, update: &LineUpdate) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE document_lines
            SET unit_price = $2, unit_price_minor = $3,
                line_subtotal = $4, line_subtotal_minor = $5,
                line_total = $6, line_total_minor = $7,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(*update.line.as_uuid())
        .bind(update.unit_price)
        .bind(update.unit_price_minor)
        .bind(update.line_subtotal)
        .bind(update.line_subtotal_minor)
        .bind(update.line_total)
        .bind(update.line_total_minor)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("line {}", update.line)));
        }
        Ok(())
    }

    async fn list_line_taxes(
        &mut self,
        line: LineId,
    ) -> Result<Vec<TaxAssociationRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, line_id, tax_code_id, rate_applied, amount_minor, created_at
            FROM line_tax_associations
            WHERE line_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(*line.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(store_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(TaxAssociationRecord {
                    id: TaxAssociationId::from_uuid(row.try_get("id").map_err(store_err)?),
                    line_id: LineId::from_uuid(row.try_get("line_id").map_err(store_err)?),
                    tax_code_id: TaxCodeId::new(row.try_get("tax_code_id").map_err(store_err)?),
                    rate_applied: row.try_get::<Decimal, _>("rate_applied").map_err(store_err)?,
                    amount_minor: row.try_get("amount_minor").map_err(store_err)?,
                    created_at: row.try_get("created_at").map_err(store_err)?,
                })
            })
            .collect()
    }

    async fn insert_line_tax(&mut self, association: &NewTaxAssociation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO line_tax_associations
                (id, line_id, tax_code_id, rate_applied, amount_minor, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, now(), now())
            "#,
        )
        .bind(*TaxAssociationId::new_v7().as_uuid())
        .bind(*association.line_id.as_uuid())
        .bind(association.tax_code_id.value())
        .bind(association.rate_applied)
        .bind(association.amount_minor)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn update_line_tax(&mut self, update: &TaxAssociationUpdate) -> Result<(), StoreError> {
        // created_at survives; only the computed figures move.
        let result = sqlx::query(
            r#"
            UPDATE line_tax_associations
            SET rate_applied = $2, amount_minor = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(*update.id.as_uuid())
        .bind(update.rate_applied)
        .bind(update.amount_minor)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("tax association {}", update.id)));
        }
        Ok(())
    }

    async fn delete_line_tax(&mut self, id: TaxAssociationId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM line_tax_associations WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn update_document_totals(
        &mut self,
        update: &DocumentTotalsUpdate,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET subtotal = $2, subtotal_minor = $3,
                tax_total = $4, tax_total_minor = $5,
                grand_total = $6, grand_total_minor = $7,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(*update.document.as_uuid())
        .bind(update.subtotal)
        .bind(update.subtotal_minor)
        .bind(update.tax_total)
        .bind(update.tax_total_minor)
        .bind(update.grand_total)
        .bind(update.grand_total_minor)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("document {}", update.document)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }
}
