//! Extraction repository: full-text rows and field candidate rows.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use super::{parse_datetime, parse_datetime_opt, Result};
use crate::models::{DocumentState, ExtractedField, ExtractionText};

/// A raw field candidate about to be inserted.
#[derive(Debug, Clone)]
pub struct NewExtractedField {
    pub documento_id: i64,
    pub metodo: String,
    pub campo: String,
    pub valor: String,
    pub archivo_origen: String,
    pub generacion: i64,
}

/// SQLite-backed repository for extraction rows.
pub struct ExtractionRepository {
    db_path: PathBuf,
}

impl ExtractionRepository {
    /// Create a new extraction repository, initializing the schema.
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
            -- One engine's full-text output per document
            CREATE TABLE IF NOT EXISTS extracciones_texto_total (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                documento_id INTEGER NOT NULL,
                metodo TEXT NOT NULL,
                texto_extraccion TEXT NOT NULL,
                entropia REAL NOT NULL DEFAULT 0,
                estado INTEGER NOT NULL DEFAULT 2,
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(documento_id, metodo)
            );

            -- One candidate value per (document, engine, field, generation)
            CREATE TABLE IF NOT EXISTS extracciones_campos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                documento_id INTEGER NOT NULL,
                metodo TEXT NOT NULL,
                campo TEXT NOT NULL,
                valor TEXT NOT NULL DEFAULT '',
                score REAL,
                archivo_origen TEXT NOT NULL DEFAULT '',
                generacion INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_texto_documento
                ON extracciones_texto_total(documento_id, estado);
            CREATE INDEX IF NOT EXISTS idx_campos_documento_campo
                ON extracciones_campos(documento_id, campo) WHERE deleted_at IS NULL;
            CREATE INDEX IF NOT EXISTS idx_campos_sin_score
                ON extracciones_campos(documento_id) WHERE score IS NULL AND deleted_at IS NULL;
        "#,
        )?;
        Ok(())
    }

    /// Store one engine's full-text output, overwriting any previous run.
    pub fn upsert_text(
        &self,
        documento_id: i64,
        metodo: &str,
        texto: &str,
        entropia: f64,
    ) -> Result<()> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO extracciones_texto_total
                (documento_id, metodo, texto_extraccion, entropia, estado, deleted_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6)
            ON CONFLICT(documento_id, metodo) DO UPDATE SET
                texto_extraccion = excluded.texto_extraccion,
                entropia = excluded.entropia,
                estado = excluded.estado,
                deleted_at = NULL,
                updated_at = excluded.updated_at
            "#,
            params![
                documento_id,
                metodo,
                texto,
                entropia,
                DocumentState::TextExtracted.code(),
                now
            ],
        )?;
        Ok(())
    }

    /// Live full-text rows for one document.
    pub fn texts_for_document(&self, documento_id: i64) -> Result<Vec<ExtractionText>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM extracciones_texto_total
            WHERE documento_id = ? AND deleted_at IS NULL
            ORDER BY metodo ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![documento_id], row_to_extraction_text)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Mark full-text rows as parsed (their candidates were inserted).
    pub fn mark_texts_parsed(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        let mut stmt = conn.prepare(
            "UPDATE extracciones_texto_total SET estado = ?, updated_at = ? WHERE id = ?",
        )?;
        for id in ids {
            stmt.execute(params![DocumentState::FieldsExtracted.code(), now, id])?;
        }
        Ok(())
    }

    /// Insert one raw candidate, unscored.
    pub fn insert_field(&self, field: &NewExtractedField) -> Result<i64> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO extracciones_campos
                (documento_id, metodo, campo, valor, score, archivo_origen, generacion, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?7)
            "#,
            params![
                field.documento_id,
                field.metodo,
                field.campo,
                field.valor,
                field.archivo_origen,
                field.generacion,
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Candidate rows still waiting for a score (`score IS NULL OR 0`),
    /// optionally restricted to one document.
    pub fn unscored_fields(&self, documento_id: Option<i64>) -> Result<Vec<ExtractedField>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM extracciones_campos
            WHERE (score IS NULL OR score = 0)
              AND deleted_at IS NULL
              AND (?1 IS NULL OR documento_id = ?1)
            ORDER BY documento_id ASC, campo ASC, metodo ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![documento_id], row_to_extracted_field)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Documents that still own unscored candidate rows.
    pub fn documents_with_unscored(&self) -> Result<Vec<i64>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT documento_id FROM extracciones_campos
            WHERE score IS NULL AND deleted_at IS NULL
            ORDER BY documento_id ASC
            "#,
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Whether any live candidate of a document has never been scored.
    pub fn has_unscored(&self, documento_id: i64) -> Result<bool> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM extracciones_campos WHERE documento_id = ? AND score IS NULL AND deleted_at IS NULL",
            params![documento_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Distinct field names present for one document.
    pub fn campos_for_document(&self, documento_id: i64) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT campo FROM extracciones_campos
            WHERE documento_id = ? AND deleted_at IS NULL
            ORDER BY campo ASC
            "#,
        )?;
        let campos = stmt
            .query_map(params![documento_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(campos)
    }

    /// All live candidates for one (document, field), every engine.
    pub fn candidates(&self, documento_id: i64, campo: &str) -> Result<Vec<ExtractedField>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM extracciones_campos
            WHERE documento_id = ? AND campo = ? AND deleted_at IS NULL
            ORDER BY id ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![documento_id, campo], row_to_extracted_field)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Set the confidence score of one candidate row.
    pub fn set_score(&self, id: i64, score: f64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE extracciones_campos SET score = ?, updated_at = ? WHERE id = ?",
            params![score, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Set the score of every live row matching (document, field, engine).
    /// The consensus evaluator writes through this key.
    pub fn set_consensus_score(
        &self,
        documento_id: i64,
        campo: &str,
        metodo: &str,
        score: f64,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            UPDATE extracciones_campos SET score = ?, updated_at = ?
            WHERE documento_id = ? AND campo = ? AND metodo = ? AND deleted_at IS NULL
            "#,
            params![score, Utc::now().to_rfc3339(), documento_id, campo, metodo],
        )?;
        Ok(())
    }
}

fn row_to_extraction_text(row: &Row<'_>) -> rusqlite::Result<ExtractionText> {
    Ok(ExtractionText {
        id: row.get("id")?,
        documento_id: row.get("documento_id")?,
        metodo: row.get("metodo")?,
        texto_extraccion: row.get("texto_extraccion")?,
        entropia: row.get("entropia")?,
        estado: row.get("estado")?,
        deleted_at: parse_datetime_opt(row.get("deleted_at")?),
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
    })
}

pub(crate) fn row_to_extracted_field(row: &Row<'_>) -> rusqlite::Result<ExtractedField> {
    Ok(ExtractedField {
        id: row.get("id")?,
        documento_id: row.get("documento_id")?,
        metodo: row.get("metodo")?,
        campo: row.get("campo")?,
        valor: row.get("valor")?,
        score: row.get("score")?,
        archivo_origen: row.get("archivo_origen")?,
        generacion: row.get("generacion")?,
        deleted_at: parse_datetime_opt(row.get("deleted_at")?),
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
    })
}
