//! Consolidated field repository.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use super::{parse_datetime, Result};
use crate::models::{ConsolidatedField, DocumentState};

/// SQLite-backed repository for the authoritative per-field values.
pub struct ConsolidatedRepository {
    db_path: PathBuf,
}

impl ConsolidatedRepository {
    /// Create a new consolidated repository, initializing the schema.
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            -- One authoritative value per (document, field)
            CREATE TABLE IF NOT EXISTS extraccion_campos_consolidada (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                documento_id INTEGER NOT NULL,
                metodo TEXT NOT NULL,
                campo TEXT NOT NULL,
                valor TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(documento_id, campo)
            );
        "#,
        )?;
        Ok(())
    }

    /// Commit the winning value for one (document, field). A single atomic
    /// upsert: re-running consolidation updates in place, it never
    /// duplicates the key.
    pub fn upsert(&self, documento_id: i64, metodo: &str, campo: &str, valor: &str) -> Result<()> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO extraccion_campos_consolidada
                (documento_id, metodo, campo, valor, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(documento_id, campo) DO UPDATE SET
                valor = excluded.valor,
                metodo = excluded.metodo,
                updated_at = excluded.updated_at
            "#,
            params![documento_id, metodo, campo, valor, now],
        )?;
        Ok(())
    }

    /// All consolidated rows for one document.
    pub fn for_document(&self, documento_id: i64) -> Result<Vec<ConsolidatedField>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT documento_id, metodo, campo, valor, created_at, updated_at
            FROM extraccion_campos_consolidada
            WHERE documento_id = ?
            ORDER BY campo ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![documento_id], row_to_consolidated)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// (document, field) pairs eligible for consolidation: candidates of
    /// evaluated documents, optionally filtered to one document and/or one
    /// field.
    pub fn pairs_to_consolidate(
        &self,
        forzar_id: Option<i64>,
        solo_campo: Option<&str>,
    ) -> Result<Vec<(i64, String)>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT ec.documento_id, ec.campo
            FROM extracciones_campos ec
            JOIN documentos d ON ec.documento_id = d.id
            WHERE d.estado = ?1
              AND d.deleted_at IS NULL
              AND ec.deleted_at IS NULL
              AND (?2 IS NULL OR ec.documento_id = ?2)
              AND (?3 IS NULL OR ec.campo = ?3)
            GROUP BY ec.documento_id, ec.campo
            ORDER BY ec.documento_id ASC, ec.campo ASC
            "#,
        )?;
        let rows = stmt
            .query_map(
                params![DocumentState::Evaluated.code(), forzar_id, solo_campo],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_consolidated(row: &Row<'_>) -> rusqlite::Result<ConsolidatedField> {
    Ok(ConsolidatedField {
        documento_id: row.get("documento_id")?,
        metodo: row.get("metodo")?,
        campo: row.get("campo")?,
        valor: row.get("valor")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
    })
}
