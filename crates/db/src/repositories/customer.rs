use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use pedido_core::domain::customer::{Customer, CustomerId};
use pedido_core::store::{CustomerStore, StoreError};

use super::{db_error, decode_error};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerStore for SqlCustomerRepository {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(
            "SELECT id, identity, display_name, created_at FROM customer WHERE identity = ?",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(customer_from_row).transpose()
    }

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(
            "SELECT id, identity, display_name, created_at FROM customer WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(customer_from_row).transpose()
    }

    async fn insert(&self, customer: Customer) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO customer (id, identity, display_name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&customer.id.0)
        .bind(&customer.identity)
        .bind(customer.display_name.as_deref())
        .bind(customer.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}

fn customer_from_row(row: SqliteRow) -> Result<Customer, StoreError> {
    let created_at_raw: String = row.try_get("created_at").map_err(db_error)?;
    Ok(Customer {
        id: CustomerId(row.try_get("id").map_err(db_error)?),
        identity: row.try_get("identity").map_err(db_error)?,
        display_name: row.try_get("display_name").map_err(db_error)?,
        created_at: parse_timestamp(&created_at_raw)?,
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| decode_error(format!("invalid timestamp `{raw}`: {error}")))
}
