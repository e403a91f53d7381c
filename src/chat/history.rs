/// Conversation turn storage
use crate::{
    db::models::{Role, Turn},
    error::ParlorResult,
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

const TURN_COLUMNS: &str = "id, account_id, chat_id, role, content, created_at, updated_at";

/// Row ids of a persisted user/assistant pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnPair {
    pub user_turn_id: i64,
    pub assistant_turn_id: i64,
}

/// Turn store backed by the account database
pub struct TurnStore {
    db: SqlitePool,
}

impl TurnStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Most recent `limit` turns of an account, oldest first
    pub async fn recent(&self, account_id: i64, limit: usize) -> ParlorResult<Vec<Turn>> {
        let turns = sqlx::query_as::<_, Turn>(&format!(
            "SELECT {cols} FROM (
                 SELECT {cols} FROM turn WHERE account_id = ?1 ORDER BY id DESC LIMIT ?2
             ) ORDER BY id ASC",
            cols = TURN_COLUMNS
        ))
        .bind(account_id)
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;

        Ok(turns)
    }

    /// Append a user turn and its reply in one transaction.
    ///
    /// On any failure the transaction is rolled back and neither side is stored.
    pub async fn append_pair(
        &self,
        account_id: i64,
        chat_id: Option<&str>,
        user_content: &str,
        assistant_content: &str,
    ) -> ParlorResult<TurnPair> {
        let mut tx = self.db.begin().await?;

        let inserted = async {
            let user_turn_id =
                insert_turn(&mut tx, account_id, chat_id, Role::User, user_content).await?;
            let assistant_turn_id =
                insert_turn(&mut tx, account_id, chat_id, Role::Assistant, assistant_content)
                    .await?;
            Ok::<_, sqlx::Error>(TurnPair {
                user_turn_id,
                assistant_turn_id,
            })
        }
        .await;

        match inserted {
            Ok(pair) => {
                tx.commit().await?;
                Ok(pair)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "turn rollback failed");
                }
                Err(e.into())
            }
        }
    }

    /// Assign a conversation id to every turn of the account that has none.
    ///
    /// Turns that already carry a conversation id are never rewritten.
    pub async fn backfill_chat_id(&self, account_id: i64, chat_id: &str) -> ParlorResult<u64> {
        let result = sqlx::query(
            "UPDATE turn SET chat_id = ?1, updated_at = ?2 WHERE account_id = ?3 AND chat_id IS NULL",
        )
        .bind(chat_id)
        .bind(Utc::now())
        .bind(account_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

async fn insert_turn(
    conn: &mut SqliteConnection,
    account_id: i64,
    chat_id: Option<&str>,
    role: Role,
    content: &str,
) -> Result<i64, sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO turn (account_id, chat_id, role, content, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
    )
    .bind(account_id)
    .bind(chat_id)
    .bind(role)
    .bind(content)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}
