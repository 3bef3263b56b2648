//! Table definitions, identical across drivers modulo column types.
//!
//! `consultas.id_usuario` carries no foreign key.

use crate::db::{Database, Driver};
use simap_core::error::StoreError;
use tracing::info;

const MYSQL_CONSULTAS: &str = "
    CREATE TABLE IF NOT EXISTS consultas (
        id_consulta BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        timestamp DATETIME NOT NULL,
        id_usuario INT NOT NULL,
        ugel_origen VARCHAR(100),
        pregunta_usuario TEXT NOT NULL,
        respuesta_asistente MEDIUMTEXT NOT NULL,
        respuesta_es_vacia BOOLEAN NOT NULL DEFAULT FALSE,
        respuesta_util VARCHAR(8) NOT NULL DEFAULT 'unset',
        id_prompt_usado VARCHAR(64),
        tokens_input INT NOT NULL DEFAULT 0,
        tokens_output INT NOT NULL DEFAULT 0,
        tiempo_respuesta_ms INT NOT NULL DEFAULT 0,
        error_detectado BOOLEAN NOT NULL DEFAULT FALSE,
        tipo_error VARCHAR(100),
        mensaje_error TEXT,
        modelo_llm_usado VARCHAR(100),
        comentario VARCHAR(255)
    ) DEFAULT CHARSET = utf8mb4
";

const MYSQL_PROMPTS: &str = "
    CREATE TABLE IF NOT EXISTS prompts (
        id_prompt BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        nombre VARCHAR(100) NOT NULL,
        contenido MEDIUMTEXT NOT NULL,
        version VARCHAR(50) NOT NULL,
        activo BOOLEAN NOT NULL DEFAULT FALSE,
        fecha_creacion DATETIME NOT NULL
    ) DEFAULT CHARSET = utf8mb4
";

const SQLITE_CONSULTAS: &str = "
    CREATE TABLE IF NOT EXISTS consultas (
        id_consulta INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        id_usuario INTEGER NOT NULL,
        ugel_origen TEXT,
        pregunta_usuario TEXT NOT NULL,
        respuesta_asistente TEXT NOT NULL,
        respuesta_es_vacia INTEGER NOT NULL DEFAULT 0,
        respuesta_util TEXT NOT NULL DEFAULT 'unset',
        id_prompt_usado TEXT,
        tokens_input INTEGER NOT NULL DEFAULT 0,
        tokens_output INTEGER NOT NULL DEFAULT 0,
        tiempo_respuesta_ms INTEGER NOT NULL DEFAULT 0,
        error_detectado INTEGER NOT NULL DEFAULT 0,
        tipo_error TEXT,
        mensaje_error TEXT,
        modelo_llm_usado TEXT,
        comentario TEXT
    )
";

const SQLITE_PROMPTS: &str = "
    CREATE TABLE IF NOT EXISTS prompts (
        id_prompt INTEGER PRIMARY KEY AUTOINCREMENT,
        nombre TEXT NOT NULL,
        contenido TEXT NOT NULL,
        version TEXT NOT NULL,
        activo INTEGER NOT NULL DEFAULT 0,
        fecha_creacion TEXT NOT NULL
    )
";

fn statements(driver: Driver) -> [&'static str; 2] {
    match driver {
        Driver::MySql => [MYSQL_CONSULTAS, MYSQL_PROMPTS],
        Driver::Sqlite => [SQLITE_CONSULTAS, SQLITE_PROMPTS],
    }
}

impl Database {
    /// Create the `consultas` and `prompts` tables if missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for ddl in statements(self.driver) {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Migration(format!("{} schema: {e}", self.driver)))?;
        }
        info!(driver = %self.driver, "Schema ready");
        Ok(())
    }

    /// Whether both tables are present.
    pub async fn schema_present(&self) -> Result<bool, StoreError> {
        let sql = match self.driver {
            Driver::MySql => {
                "SELECT COUNT(*) AS n FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name IN ('consultas', 'prompts')"
            }
            Driver::Sqlite => {
                "SELECT COUNT(*) AS n FROM sqlite_master \
                 WHERE type = 'table' AND name IN ('consultas', 'prompts')"
            }
        };
        let n: i64 = sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to inspect schema: {e}")))?;
        Ok(n == 2)
    }
}
