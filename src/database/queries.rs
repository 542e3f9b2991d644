use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::FromRow;

use crate::database::models::*;

pub struct Queries;

impl Queries {
    pub async fn get_execution(
        conn: &mut SqliteConnection,
        execution_id: &str,
    ) -> Result<Option<Execution>, sqlx::Error> {
        sqlx::query_as::<_, Execution>(
            r#"
            SELECT id, command, workflow, agent, model, status, start_time, end_time,
                   container_digest, input_hash, output_hash, exit_code, created_at
            FROM executions
            WHERE id = ?
            "#,
        )
        .bind(execution_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn execution_exists(
        conn: &mut SqliteConnection,
        execution_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM executions WHERE id = ?")
            .bind(execution_id)
            .fetch_optional(conn)
            .await?;
        Ok(row.is_some())
    }

    /// Child rows of one kind for one execution, in insertion order.
    pub async fn get_children<T>(
        conn: &mut SqliteConnection,
        kind: ChildKind,
        execution_id: &str,
    ) -> Result<Vec<Stored<T>>, sqlx::Error>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let sql = format!(
            "SELECT * FROM {} WHERE execution_id = ? ORDER BY id",
            kind.table()
        );
        sqlx::query_as::<_, Stored<T>>(&sql)
            .bind(execution_id)
            .fetch_all(conn)
            .await
    }
}
