//! `prompts` table access.

use crate::db::Database;
use async_trait::async_trait;
use simap_core::error::StoreError;
use simap_core::prompt::{PromptRepository, StoredPrompt};
use sqlx::Row;
use tracing::info;

const SELECT_ACTIVE: &str = "
    SELECT id_prompt, nombre, contenido, version,
           CASE WHEN activo THEN 1 ELSE 0 END AS activo,
           CAST(fecha_creacion AS CHAR) AS fecha_creacion
    FROM prompts WHERE activo = $1
    ORDER BY id_prompt DESC LIMIT 1
";

#[async_trait]
impl PromptRepository for Database {
    async fn active_prompt(&self) -> Result<Option<StoredPrompt>, StoreError> {
        let row = sqlx::query(&self.sql(SELECT_ACTIVE))
            .bind(true)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to load active prompt: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let decode = |e: sqlx::Error| StoreError::Query(format!("Failed to decode prompt: {e}"));
        Ok(Some(StoredPrompt {
            id: row.try_get("id_prompt").map_err(decode)?,
            name: row.try_get("nombre").map_err(decode)?,
            content: row.try_get("contenido").map_err(decode)?,
            version: row.try_get("version").map_err(decode)?,
            active: row.try_get::<i64, _>("activo").map_err(decode)? != 0,
            created_at: row.try_get("fecha_creacion").map_err(decode)?,
        }))
    }

    async fn activate_prompt(&self, name: &str, content: &str, version: &str) -> Result<i64, StoreError> {
        let tx_err = |e: sqlx::Error| StoreError::Query(format!("Failed to activate prompt: {e}"));

        let mut tx = self.pool.begin().await.map_err(tx_err)?;

        sqlx::query(&self.sql("UPDATE prompts SET activo = $1 WHERE activo = $2"))
            .bind(false)
            .bind(true)
            .execute(&mut *tx)
            .await
            .map_err(tx_err)?;

        let result = sqlx::query(&self.sql(
            "INSERT INTO prompts (nombre, contenido, version, activo, fecha_creacion) \
             VALUES ($1, $2, $3, $4, $5)",
        ))
        .bind(name.to_string())
        .bind(content.to_string())
        .bind(version.to_string())
        .bind(true)
        .bind(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string())
        .execute(&mut *tx)
        .await
        .map_err(tx_err)?;

        let id = result
            .last_insert_id()
            .ok_or_else(|| StoreError::Query("Driver returned no prompt id".into()))?;

        tx.commit().await.map_err(tx_err)?;

        info!(id, name, version, chars = content.chars().count(), "Prompt activated");
        Ok(id)
    }
}
