use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use pedido_core::domain::customer::CustomerId;
use pedido_core::domain::order::{LineItem, Order, OrderId, OrderStatus};
use pedido_core::store::{OrderStore, StatusUpdate, StoreError};

use super::customer::parse_timestamp;
use super::{db_error, decode_error};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_lines(&self, order_id: &OrderId) -> Result<Vec<LineItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT name, quantity, CAST(unit_price AS TEXT) AS unit_price, special_instructions \
             FROM order_line WHERE order_id = ? ORDER BY position",
        )
        .bind(&order_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(line_from_row).collect()
    }
}

#[async_trait]
impl OrderStore for SqlOrderRepository {
    async fn insert(&self, order: Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(
            "INSERT INTO customer_order (id, customer_id, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&order.id.0)
        .bind(&order.customer_id.0)
        .bind(order.status.as_str())
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_line \
                 (order_id, position, name, quantity, unit_price, special_instructions) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&order.id.0)
            .bind(position as i64)
            .bind(&item.name)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.map(|price| price.to_string()))
            .bind(item.special_instructions.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            "SELECT id, customer_id, status, created_at, updated_at \
             FROM customer_order WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = order_from_row(row)?;
        order.items = self.load_lines(&order.id).await?;
        Ok(Some(order))
    }

    async fn list_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, customer_id, status, created_at, updated_at \
             FROM customer_order WHERE customer_id = ? ORDER BY created_at",
        )
        .bind(&customer_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let mut order = order_from_row(row)?;
            order.items = self.load_lines(&order.id).await?;
            orders.push(order);
        }
        Ok(orders)
    }

    async fn update_status(
        &self,
        id: &OrderId,
        expected: OrderStatus,
        new: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<StatusUpdate, StoreError> {
        let result = sqlx::query(
            "UPDATE customer_order SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(new.as_str())
        .bind(updated_at.to_rfc3339())
        .bind(&id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 1 {
            Ok(StatusUpdate::Applied)
        } else {
            Ok(StatusUpdate::NoMatch)
        }
    }
}

fn order_from_row(row: SqliteRow) -> Result<Order, StoreError> {
    let status_raw: String = row.try_get("status").map_err(db_error)?;
    let status = OrderStatus::parse(&status_raw)
        .ok_or_else(|| decode_error(format!("unknown order status `{status_raw}`")))?;
    let created_at_raw: String = row.try_get("created_at").map_err(db_error)?;
    let updated_at_raw: String = row.try_get("updated_at").map_err(db_error)?;

    Ok(Order {
        id: OrderId(row.try_get("id").map_err(db_error)?),
        customer_id: CustomerId(row.try_get("customer_id").map_err(db_error)?),
        items: Vec::new(),
        status,
        created_at: parse_timestamp(&created_at_raw)?,
        updated_at: parse_timestamp(&updated_at_raw)?,
    })
}

fn line_from_row(row: SqliteRow) -> Result<LineItem, StoreError> {
    let quantity: i64 = row.try_get("quantity").map_err(db_error)?;
    let quantity = u32::try_from(quantity)
        .map_err(|_| decode_error(format!("line quantity {quantity} out of range")))?;
    let unit_price_raw: Option<String> = row.try_get("unit_price").map_err(db_error)?;
    let unit_price = unit_price_raw
        .map(|raw| {
            raw.parse::<Decimal>()
                .map_err(|error| decode_error(format!("invalid unit price `{raw}`: {error}")))
        })
        .transpose()?;

    Ok(LineItem {
        name: row.try_get("name").map_err(db_error)?,
        quantity,
        unit_price,
        special_instructions: row.try_get("special_instructions").map_err(db_error)?,
    })
}
