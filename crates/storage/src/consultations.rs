//! `consultas` table access.

use crate::db::Database;
use async_trait::async_trait;
use simap_core::consultation::{Consultation, ConsultationStore, NewConsultation, Usefulness};
use simap_core::error::StoreError;
use sqlx::Row;
use sqlx::any::AnyRow;
use tracing::{debug, warn};

const INSERT: &str = "
    INSERT INTO consultas (
        timestamp, id_usuario, ugel_origen, pregunta_usuario, respuesta_asistente,
        respuesta_es_vacia, respuesta_util, id_prompt_usado, tokens_input, tokens_output,
        tiempo_respuesta_ms, error_detectado, tipo_error, mensaje_error, modelo_llm_usado
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
";

// Flags and timestamps come back as integers and text on both drivers.
const SELECT_ONE: &str = "
    SELECT id_consulta, CAST(timestamp AS CHAR) AS timestamp, id_usuario, ugel_origen,
           pregunta_usuario, respuesta_asistente,
           CASE WHEN respuesta_es_vacia THEN 1 ELSE 0 END AS respuesta_es_vacia,
           respuesta_util, id_prompt_usado, tokens_input, tokens_output, tiempo_respuesta_ms,
           CASE WHEN error_detectado THEN 1 ELSE 0 END AS error_detectado,
           tipo_error, mensaje_error, modelo_llm_usado, comentario
    FROM consultas WHERE id_consulta = $1
";

fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

impl Database {
    async fn insert_as(&self, record: &NewConsultation, user_id: i64) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(&self.sql(INSERT))
            .bind(now_timestamp())
            .bind(user_id)
            .bind(record.unit.clone())
            .bind(record.question.clone())
            .bind(record.answer.clone())
            .bind(record.answer_is_empty)
            .bind(Usefulness::Unset.as_str())
            .bind(record.prompt_id.clone())
            .bind(record.input_tokens)
            .bind(record.output_tokens)
            .bind(record.processing_time_ms)
            .bind(record.error_detected)
            .bind(record.error_type.clone())
            .bind(record.error_message.clone())
            .bind(record.model.clone())
            .execute(&self.pool)
            .await?;

        result
            .last_insert_id()
            .ok_or_else(|| sqlx::Error::Protocol("driver returned no insert id".into()))
    }

    async fn require_row(&self, id: i64) -> Result<(), StoreError> {
        let found = sqlx::query(&self.sql("SELECT id_consulta FROM consultas WHERE id_consulta = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to look up consultation {id}: {e}")))?;
        match found {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id)),
        }
    }
}

fn row_to_consultation(row: &AnyRow) -> Result<Consultation, sqlx::Error> {
    let usefulness: String = row.try_get("respuesta_util")?;
    Ok(Consultation {
        id: row.try_get("id_consulta")?,
        timestamp: row.try_get("timestamp")?,
        record: NewConsultation {
            user_id: row.try_get("id_usuario")?,
            unit: row.try_get::<Option<String>, _>("ugel_origen")?.unwrap_or_default(),
            question: row.try_get("pregunta_usuario")?,
            answer: row.try_get("respuesta_asistente")?,
            answer_is_empty: row.try_get::<i64, _>("respuesta_es_vacia")? != 0,
            prompt_id: row.try_get::<Option<String>, _>("id_prompt_usado")?.unwrap_or_default(),
            input_tokens: row.try_get("tokens_input")?,
            output_tokens: row.try_get("tokens_output")?,
            processing_time_ms: row.try_get("tiempo_respuesta_ms")?,
            error_detected: row.try_get::<i64, _>("error_detectado")? != 0,
            error_type: row.try_get("tipo_error")?,
            error_message: row.try_get("mensaje_error")?,
            model: row.try_get::<Option<String>, _>("modelo_llm_usado")?.unwrap_or_default(),
        },
        usefulness: Usefulness::from_column(&usefulness),
        comment: row.try_get("comentario")?,
    })
}

#[async_trait]
impl ConsultationStore for Database {
    async fn insert(&self, record: &NewConsultation) -> Result<i64, StoreError> {
        let id = match self.insert_as(record, record.user_id).await {
            Ok(id) => id,
            Err(e) if is_foreign_key_violation(&e) && record.user_id != self.fallback_user_id => {
                warn!(
                    user_id = record.user_id,
                    fallback_user_id = self.fallback_user_id,
                    "Unknown user rejected by constraint, recording default user"
                );
                self.insert_as(record, self.fallback_user_id)
                    .await
                    .map_err(|e| StoreError::Query(format!("Failed to insert consultation: {e}")))?
            }
            Err(e) => return Err(StoreError::Query(format!("Failed to insert consultation: {e}"))),
        };

        debug!(id, driver = %self.driver, "Consultation stored");
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Option<Consultation>, StoreError> {
        let row = sqlx::query(&self.sql(SELECT_ONE))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to load consultation {id}: {e}")))?;

        row.as_ref()
            .map(row_to_consultation)
            .transpose()
            .map_err(|e| StoreError::Query(format!("Failed to decode consultation {id}: {e}")))
    }

    async fn set_usefulness(&self, id: i64, value: Usefulness) -> Result<(), StoreError> {
        // MySQL reports zero affected rows when the value is unchanged.
        self.require_row(id).await?;
        sqlx::query(&self.sql("UPDATE consultas SET respuesta_util = $1 WHERE id_consulta = $2"))
            .bind(value.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to update usefulness of {id}: {e}")))?;
        debug!(id, usefulness = value.as_str(), "Usefulness updated");
        Ok(())
    }

    async fn set_comment(&self, id: i64, comment: &str) -> Result<(), StoreError> {
        self.require_row(id).await?;
        sqlx::query(&self.sql("UPDATE consultas SET comentario = $1 WHERE id_consulta = $2"))
            .bind(comment.to_string())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to update comment of {id}: {e}")))?;
        debug!(id, chars = comment.chars().count(), "Comment updated");
        Ok(())
    }
}
