//! PostgreSQL audit sink
//!
//! Persists recalculation deltas as JSONB rows. The engine treats audit
//! recording as fire-and-forget; failures surface here as `AuditError`
//! and are logged by the caller, never propagated as computation errors.

use async_trait::async_trait;
use sqlx::PgPool;

use core_kernel::AuditEventId;
use domain_totals::ports::{AuditError, AuditFields, AuditSink};

/// Audit sink backed by the `audit_events` table
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record_update(
        &self,
        entity: &str,
        entity_id: &str,
        before: &AuditFields,
        after: &AuditFields,
    ) -> Result<(), AuditError> {
        let before_json =
            serde_json::to_string(before).map_err(|e| AuditError::Sink(e.to_string()))?;
        let after_json =
            serde_json::to_string(after).map_err(|e| AuditError::Sink(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO audit_events (id, entity, entity_id, before, after, recorded_at)
            VALUES ($1, $2, $3, $4::jsonb, $5::jsonb, now())
            "#,
        )
        .bind(*AuditEventId::new_v7().as_uuid())
        .bind(entity)
        .bind(entity_id)
        .bind(before_json)
        .bind(after_json)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Sink(e.to_string()))?;
        Ok(())
    }
}
