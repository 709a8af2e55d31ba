//! Inventory ledger: dated batches and their available quantities
//!
//! Reads that feed a commit take the caller's connection so they run inside
//! the caller's transaction. `reserve` is the only decrement.

use chrono::{DateTime, NaiveDate, Utc};
use shared::{Batch, NewBatch, StockLevel};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Ledger service for batch queries and stock movements
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

/// Row for batch queries
#[derive(Debug, FromRow)]
struct BatchRow {
    id: Uuid,
    product_id: Uuid,
    quantity_available: i32,
    expiration_date: Option<NaiveDate>,
    delivery_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Batch {
            id: row.id,
            product_id: row.product_id,
            quantity_available: row.quantity_available,
            expiration_date: row.expiration_date,
            delivery_id: row.delivery_id,
            created_at: row.created_at,
        }
    }
}

/// Row for stock level query
#[derive(Debug, FromRow)]
struct StockLevelRow {
    product_id: Uuid,
    product_name: String,
    quantity_available: i64,
    batch_count: i64,
}

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Batches of a product in FEFO order
    pub async fn list_batches(&self, product_id: Uuid) -> AppResult<Vec<Batch>> {
        let product_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                .bind(product_id)
                .fetch_one(&self.db)
                .await?;

        if !product_exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let mut conn = self.db.acquire().await?;
        Self::candidate_batches(&mut conn, &[product_id]).await
    }

    /// Total available stock per product, zero for products without batches
    pub async fn stock_levels(&self) -> AppResult<Vec<StockLevel>> {
        let rows = sqlx::query_as::<_, StockLevelRow>(
            r#"
            SELECT p.id AS product_id, p.name AS product_name,
                   COALESCE(SUM(b.quantity_available), 0)::BIGINT AS quantity_available,
                   COUNT(b.id) FILTER (WHERE b.quantity_available > 0) AS batch_count
            FROM products p
            LEFT JOIN batches b ON b.product_id = p.id
            GROUP BY p.id, p.name
            ORDER BY p.name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| StockLevel {
                product_id: r.product_id,
                product_name: r.product_name,
                quantity_available: r.quantity_available,
                batch_count: r.batch_count,
            })
            .collect())
    }

    /// Candidate batches for a set of products, in ledger order. No locks.
    pub async fn candidate_batches(
        conn: &mut PgConnection,
        product_ids: &[Uuid],
    ) -> AppResult<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT id, product_id, quantity_available, expiration_date, delivery_id, created_at
            FROM batches
            WHERE product_id = ANY($1)
            ORDER BY expiration_date ASC NULLS LAST, id ASC
            "#,
        )
        .bind(product_ids)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(Batch::from).collect())
    }

    /// Batches by id, without locking
    pub async fn batches_by_id(conn: &mut PgConnection, batch_ids: &[Uuid]) -> AppResult<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT id, product_id, quantity_available, expiration_date, delivery_id, created_at
            FROM batches
            WHERE id = ANY($1)
            "#,
        )
        .bind(batch_ids)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(Batch::from).collect())
    }

    /// Lock batches for the rest of the transaction, in ascending id order
    pub async fn lock_batches(conn: &mut PgConnection, batch_ids: &[Uuid]) -> AppResult<Vec<Batch>> {
        if batch_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT id, product_id, quantity_available, expiration_date, delivery_id, created_at
            FROM batches
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(batch_ids)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(Batch::from).collect())
    }

    /// Decrement a batch. Must run inside a commit transaction after the
    /// batch was locked and checked.
    pub async fn reserve(conn: &mut PgConnection, batch_id: Uuid, quantity: i32) -> AppResult<i32> {
        let remaining = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE batches
            SET quantity_available = quantity_available - $2
            WHERE id = $1 AND quantity_available >= $2
            RETURNING quantity_available
            "#,
        )
        .bind(batch_id)
        .bind(quantity)
        .fetch_optional(&mut *conn)
        .await?;

        match remaining {
            Some(remaining) => {
                tracing::info!(%batch_id, quantity, remaining, "Batch reserved");
                Ok(remaining)
            }
            None => {
                let available = sqlx::query_scalar::<_, i32>(
                    "SELECT quantity_available FROM batches WHERE id = $1",
                )
                .bind(batch_id)
                .fetch_optional(&mut *conn)
                .await?
                .unwrap_or(0);

                Err(AppError::InsufficientStock {
                    batch_id,
                    requested: i64::from(quantity),
                    available: i64::from(available),
                })
            }
        }
    }

    /// Add a new batch, e.g. when a delivery is unloaded
    pub async fn create_batch(conn: &mut PgConnection, batch: &NewBatch) -> AppResult<Batch> {
        let row = sqlx::query_as::<_, BatchRow>(
            r#"
            INSERT INTO batches (product_id, quantity_available, expiration_date, delivery_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, product_id, quantity_available, expiration_date, delivery_id, created_at
            "#,
        )
        .bind(batch.product_id)
        .bind(batch.quantity_available)
        .bind(batch.expiration_date)
        .bind(batch.delivery_id)
        .fetch_one(&mut *conn)
        .await?;

        tracing::info!(
            batch_id = %row.id,
            product_id = %batch.product_id,
            quantity = batch.quantity_available,
            "Batch created"
        );
        Ok(row.into())
    }
}
