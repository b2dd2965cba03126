use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use pedido_core::domain::conversation::{ConversationTurn, Intent, TurnId};
use pedido_core::domain::customer::CustomerId;
use pedido_core::store::{ConversationStore, StoreError};

use super::customer::parse_timestamp;
use super::{db_error, decode_error};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for SqlConversationRepository {
    async fn append_turn(&self, turn: ConversationTurn) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO conversation_turn \
             (id, customer_id, inbound_text, intent, confidence, reply_text, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&turn.id.0)
        .bind(&turn.customer_id.0)
        .bind(&turn.inbound_text)
        .bind(turn.intent.as_str())
        .bind(turn.confidence)
        .bind(&turn.reply_text)
        .bind(turn.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn recent_turns(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, customer_id, inbound_text, intent, confidence, reply_text, created_at \
             FROM conversation_turn WHERE customer_id = ? \
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(&customer_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut turns: Vec<ConversationTurn> =
            rows.into_iter().map(turn_from_row).collect::<Result<_, _>>()?;
        // Oldest first for prompt assembly.
        turns.reverse();
        Ok(turns)
    }
}

fn turn_from_row(row: SqliteRow) -> Result<ConversationTurn, StoreError> {
    let intent_raw: String = row.try_get("intent").map_err(db_error)?;
    let intent = Intent::parse(&intent_raw)
        .ok_or_else(|| decode_error(format!("unknown intent `{intent_raw}`")))?;
    let created_at_raw: String = row.try_get("created_at").map_err(db_error)?;

    Ok(ConversationTurn {
        id: TurnId(row.try_get("id").map_err(db_error)?),
        customer_id: CustomerId(row.try_get("customer_id").map_err(db_error)?),
        inbound_text: row.try_get("inbound_text").map_err(db_error)?,
        intent,
        confidence: row.try_get("confidence").map_err(db_error)?,
        reply_text: row.try_get("reply_text").map_err(db_error)?,
        created_at: parse_timestamp(&created_at_raw)?,
    })
}
