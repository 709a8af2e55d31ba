//! Supplier deliveries ("ordered products") awaiting arrival

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use shared::{validation, DeliveryStatus, SupplierDelivery};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::decode_status;
use crate::error::{AppError, AppResult};

/// Delivery service
#[derive(Clone)]
pub struct DeliveryService {
    db: PgPool,
}

/// Input for ordering a product from a supplier
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeliveryInput {
    #[serde(alias = "productID")]
    pub product_id: Uuid,
    pub quantity: i32,
    pub expiration_date: Option<NaiveDate>,
}

#[derive(Debug, FromRow)]
struct DeliveryRow {
    id: Uuid,
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    expiration_date: Option<NaiveDate>,
    status: String,
    batch_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DeliveryRow> for SupplierDelivery {
    type Error = AppError;

    fn try_from(row: DeliveryRow) -> AppResult<Self> {
        Ok(SupplierDelivery {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            expiration_date: row.expiration_date,
            status: decode_status(&row.status, DeliveryStatus::from_str, "delivery status")?,
            batch_id: row.batch_id,
            created_at: row.created_at,
        })
    }
}

const DELIVERY_SELECT: &str = r#"
    SELECT d.id, d.product_id, p.name AS product_name, d.quantity, d.expiration_date,
           d.status, d.batch_id, d.created_at
    FROM supplier_deliveries d
    JOIN products p ON p.id = d.product_id
"#;

impl DeliveryService {
    /// Create a new DeliveryService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a new supplier order. Starts `pending`.
    pub async fn create(&self, input: CreateDeliveryInput) -> AppResult<SupplierDelivery> {
        validation::validate_positive_quantity(input.quantity).map_err(|message| {
            AppError::Validation {
                field: "quantity".to_string(),
                message: message.to_string(),
            }
        })?;

        let product_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                .bind(input.product_id)
                .fetch_one(&self.db)
                .await?;

        if !product_exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO supplier_deliveries (product_id, quantity, expiration_date, status)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(input.product_id)
        .bind(input.quantity)
        .bind(input.expiration_date)
        .bind(DeliveryStatus::Pending.as_str())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(delivery_id = %id, product_id = %input.product_id, quantity = input.quantity, "Supplier delivery ordered");
        self.get(id).await
    }

    /// Deliveries still expected, oldest first
    pub async fn list_pending(&self) -> AppResult<Vec<SupplierDelivery>> {
        let sql = format!("{} WHERE d.status = $1 ORDER BY d.created_at, d.id", DELIVERY_SELECT);
        let rows = sqlx::query_as::<_, DeliveryRow>(&sql)
            .bind(DeliveryStatus::Pending.as_str())
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(SupplierDelivery::try_from).collect()
    }

    /// Get a delivery by id
    pub async fn get(&self, delivery_id: Uuid) -> AppResult<SupplierDelivery> {
        let mut conn = self.db.acquire().await?;
        Self::fetch(&mut conn, delivery_id, false).await
    }

    /// Cancel a pending delivery
    pub async fn cancel(&self, delivery_id: Uuid) -> AppResult<SupplierDelivery> {
        let mut tx = self.db.begin().await?;

        let delivery = Self::fetch(&mut tx, delivery_id, true).await?;
        let status = delivery.status.transition(DeliveryStatus::Cancelled)?;
        Self::set_status(&mut tx, delivery_id, status).await?;

        tx.commit().await?;

        tracing::info!(%delivery_id, "Supplier delivery cancelled");
        Ok(SupplierDelivery { status, ..delivery })
    }

    /// Load a delivery, optionally locking it for the rest of the transaction
    pub(crate) async fn fetch(
        conn: &mut PgConnection,
        delivery_id: Uuid,
        for_update: bool,
    ) -> AppResult<SupplierDelivery> {
        let sql = if for_update {
            format!("{} WHERE d.id = $1 FOR UPDATE OF d", DELIVERY_SELECT)
        } else {
            format!("{} WHERE d.id = $1", DELIVERY_SELECT)
        };

        let row = sqlx::query_as::<_, DeliveryRow>(&sql)
            .bind(delivery_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Supplier delivery".to_string()))?;

        row.try_into()
    }

    pub(crate) async fn set_status(
        conn: &mut PgConnection,
        delivery_id: Uuid,
        status: DeliveryStatus,
    ) -> AppResult<()> {
        sqlx::query("UPDATE supplier_deliveries SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(delivery_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Record the batch created when the delivery was unloaded
    pub(crate) async fn set_batch(
        conn: &mut PgConnection,
        delivery_id: Uuid,
        batch_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query("UPDATE supplier_deliveries SET batch_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(batch_id)
            .bind(delivery_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
