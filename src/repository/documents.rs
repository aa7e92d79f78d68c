//! Document repository: registration, lifecycle state, forced reprocessing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_datetime, parse_datetime_opt, RepositoryError, Result};
use crate::models::{Document, DocumentKind, DocumentState};

/// Metadata for a page being registered.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub nombre_archivo: String,
    pub archivo_padre: String,
    pub hash_archivo: String,
    pub tamano_bytes: i64,
    pub numero_paginas: i64,
    pub tipo_documento: DocumentKind,
    pub resolucion_ppi: f64,
    pub calidad_estimativa: i64,
}

/// Per-state document counts for status reporting.
#[derive(Debug, Clone, Default)]
pub struct StateCounts {
    pub by_state: BTreeMap<i64, u64>,
}

impl StateCounts {
    pub fn total(&self) -> u64 {
        self.by_state.values().sum()
    }
}

/// SQLite-backed repository for documents.
pub struct DocumentRepository {
    db_path: PathBuf,
}

impl DocumentRepository {
    /// Create a new document repository, initializing the schema.
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
            -- One row per registered invoice page
            CREATE TABLE IF NOT EXISTS documentos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nombre_archivo TEXT NOT NULL,
                archivo_padre TEXT NOT NULL,
                hash_archivo TEXT NOT NULL,
                tamano_bytes INTEGER NOT NULL,
                numero_paginas INTEGER NOT NULL DEFAULT 1,
                tipo_documento TEXT NOT NULL DEFAULT 'escaneado',
                resolucion_ppi REAL NOT NULL DEFAULT 0,
                calidad_estimativa INTEGER NOT NULL DEFAULT 0,
                estado INTEGER NOT NULL DEFAULT 1,
                generacion INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(hash_archivo, nombre_archivo)
            );

            CREATE INDEX IF NOT EXISTS idx_documentos_estado
                ON documentos(estado) WHERE deleted_at IS NULL;
        "#,
        )?;
        Ok(())
    }

    /// Register a page. Returns `None` when an identical page (same hash
    /// and file name) is already registered.
    pub fn register(&self, doc: &NewDocument) -> Result<Option<i64>> {
        let conn = self.connect()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM documentos WHERE hash_archivo = ? AND nombre_archivo = ?",
                params![doc.hash_archivo, doc.nombre_archivo],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            tracing::warn!(
                "duplicate page detected (hash + name): {} (document {})",
                doc.nombre_archivo,
                id
            );
            return Ok(None);
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO documentos
                (nombre_archivo, archivo_padre, hash_archivo, tamano_bytes,
                 numero_paginas, tipo_documento, resolucion_ppi,
                 calidad_estimativa, estado, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                doc.nombre_archivo,
                doc.archivo_padre,
                doc.hash_archivo,
                doc.tamano_bytes,
                doc.numero_paginas,
                doc.tipo_documento.as_str(),
                doc.resolucion_ppi,
                doc.calidad_estimativa,
                DocumentState::Registered.code(),
                now,
                now,
            ],
        )?;
        Ok(Some(conn.last_insert_rowid()))
    }

    /// Fetch one document by id (tombstoned rows included).
    pub fn get(&self, id: i64) -> Result<Option<Document>> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT * FROM documentos WHERE id = ?",
            params![id],
            row_to_document,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Live documents currently in `state`, oldest first.
    pub fn get_in_state(&self, state: DocumentState, limit: Option<u32>) -> Result<Vec<Document>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM documentos
            WHERE estado = ?1 AND deleted_at IS NULL
            ORDER BY created_at ASC, id ASC
            LIMIT ?2
            "#,
        )?;
        let limit = limit.map(i64::from).unwrap_or(-1);
        let docs = stmt
            .query_map(params![state.code(), limit], row_to_document)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    /// Atomically advance a document's state.
    ///
    /// Returns `true` only when the compare-and-swap won, i.e. the row was
    /// still in `from`. A `false` return means another worker got there
    /// first (or the document left the expected state); callers must skip
    /// the document, not fail the batch.
    pub fn try_advance(&self, id: i64, from: DocumentState, to: DocumentState) -> Result<bool> {
        if !from.can_transition_to(to) {
            tracing::warn!(
                "illegal transition requested for document {}: {} -> {}",
                id,
                from.as_str(),
                to.as_str()
            );
            return Ok(false);
        }
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE documentos SET estado = ?, updated_at = ? WHERE id = ? AND estado = ? AND deleted_at IS NULL",
            params![to.code(), Utc::now().to_rfc3339(), id, from.code()],
        )?;
        Ok(changed == 1)
    }

    /// Move a document into the terminal error state, from whatever live
    /// state it is in.
    pub fn mark_error(&self, id: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE documentos SET estado = ?, updated_at = ? WHERE id = ? AND estado <> ? AND deleted_at IS NULL",
            params![
                DocumentState::Error.code(),
                Utc::now().to_rfc3339(),
                id,
                DocumentState::Error.code()
            ],
        )?;
        Ok(())
    }

    /// Tombstone a document. Rows are never physically deleted.
    pub fn soft_delete(&self, id: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE documentos SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
            params![Utc::now().to_rfc3339(), Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Operator-forced reprocessing: the only sanctioned path that moves a
    /// document backwards.
    ///
    /// In one IMMEDIATE transaction the document's generation is bumped,
    /// every live candidate row is tombstoned (full-text rows too when
    /// restarting from text extraction), and the state is reset to
    /// `back_to`. The generation bump makes concurrent forced runs on the
    /// same id safe: each run supersedes a distinct generation, and stale
    /// inserts remain attributable to the generation that produced them.
    ///
    /// Returns the new generation.
    pub fn force_reprocess(&self, id: i64, back_to: DocumentState) -> Result<i64> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let (estado, generacion): (i64, i64) = tx
            .query_row(
                "SELECT estado, generacion FROM documentos WHERE id = ? AND deleted_at IS NULL",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or(RepositoryError::DocumentNotFound(id))?;

        let nueva_generacion = generacion + 1;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "UPDATE extracciones_campos SET deleted_at = ?, updated_at = ? WHERE documento_id = ? AND deleted_at IS NULL",
            params![now, now, id],
        )?;
        if back_to == DocumentState::Registered {
            tx.execute(
                "UPDATE extracciones_texto_total SET deleted_at = ?, updated_at = ? WHERE documento_id = ? AND deleted_at IS NULL",
                params![now, now, id],
            )?;
        }
        tx.execute(
            "UPDATE documentos SET estado = ?, generacion = ?, updated_at = ? WHERE id = ?",
            params![back_to.code(), nueva_generacion, now, id],
        )?;
        tx.commit()?;

        tracing::info!(
            "document {} reset from state {} to {} (generation {})",
            id,
            estado,
            back_to.code(),
            nueva_generacion
        );
        Ok(nueva_generacion)
    }

    /// Live document counts grouped by state.
    pub fn counts_by_state(&self) -> Result<StateCounts> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT estado, COUNT(*) FROM documentos WHERE deleted_at IS NULL GROUP BY estado",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut counts = StateCounts::default();
        for row in rows {
            let (estado, count) = row?;
            counts.by_state.insert(estado, count);
        }
        Ok(counts)
    }
}

pub(crate) fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let estado_code: i64 = row.get("estado")?;
    let tipo: String = row.get("tipo_documento")?;
    Ok(Document {
        id: row.get("id")?,
        nombre_archivo: row.get("nombre_archivo")?,
        archivo_padre: row.get("archivo_padre")?,
        hash_archivo: row.get("hash_archivo")?,
        tamano_bytes: row.get("tamano_bytes")?,
        numero_paginas: row.get("numero_paginas")?,
        tipo_documento: DocumentKind::from_str(&tipo).unwrap_or(DocumentKind::Scanned),
        resolucion_ppi: row.get("resolucion_ppi")?,
        calidad_estimativa: row.get("calidad_estimativa")?,
        estado: DocumentState::from_code(estado_code).unwrap_or(DocumentState::Error),
        generacion: row.get("generacion")?,
        deleted_at: parse_datetime_opt(row.get("deleted_at")?),
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ExtractionRepository;

    fn temp_repo() -> (tempfile::TempDir, DocumentRepository) {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("consenso.db");
        // Extraction tables must exist for force_reprocess.
        ExtractionRepository::new(&db).unwrap();
        let repo = DocumentRepository::new(&db).unwrap();
        (dir, repo)
    }

    fn sample_doc(name: &str) -> NewDocument {
        NewDocument {
            nombre_archivo: name.to_string(),
            archivo_padre: name.to_string(),
            hash_archivo: Document::compute_hash(name.as_bytes()),
            tamano_bytes: 1024,
            numero_paginas: 1,
            tipo_documento: DocumentKind::Scanned,
            resolucion_ppi: 300.0,
            calidad_estimativa: 90,
        }
    }

    #[test]
    fn test_register_and_get() {
        let (_dir, repo) = temp_repo();
        let id = repo.register(&sample_doc("f001.pdf")).unwrap().unwrap();
        let doc = repo.get(id).unwrap().unwrap();
        assert_eq!(doc.nombre_archivo, "f001.pdf");
        assert_eq!(doc.estado, DocumentState::Registered);
        assert_eq!(doc.generacion, 0);
    }

    #[test]
    fn test_register_duplicate_is_skipped() {
        let (_dir, repo) = temp_repo();
        assert!(repo.register(&sample_doc("f001.pdf")).unwrap().is_some());
        assert!(repo.register(&sample_doc("f001.pdf")).unwrap().is_none());
    }

    #[test]
    fn test_try_advance_cas() {
        let (_dir, repo) = temp_repo();
        let id = repo.register(&sample_doc("f001.pdf")).unwrap().unwrap();

        assert!(repo
            .try_advance(id, DocumentState::Registered, DocumentState::TextExtracted)
            .unwrap());
        // Second claimer loses the race: the row is no longer in the
        // expected pre-state.
        assert!(!repo
            .try_advance(id, DocumentState::Registered, DocumentState::TextExtracted)
            .unwrap());
        assert_eq!(
            repo.get(id).unwrap().unwrap().estado,
            DocumentState::TextExtracted
        );
    }

    #[test]
    fn test_try_advance_rejects_jumps() {
        let (_dir, repo) = temp_repo();
        let id = repo.register(&sample_doc("f001.pdf")).unwrap().unwrap();
        assert!(!repo
            .try_advance(id, DocumentState::Registered, DocumentState::Evaluated)
            .unwrap());
        assert_eq!(
            repo.get(id).unwrap().unwrap().estado,
            DocumentState::Registered
        );
    }

    #[test]
    fn test_state_never_regresses_without_forced_reprocess() {
        let (_dir, repo) = temp_repo();
        let id = repo.register(&sample_doc("f001.pdf")).unwrap().unwrap();
        for (from, to) in [
            (DocumentState::Registered, DocumentState::TextExtracted),
            (DocumentState::TextExtracted, DocumentState::FieldsExtracted),
            (DocumentState::FieldsExtracted, DocumentState::Evaluated),
            (DocumentState::Evaluated, DocumentState::Consolidated),
        ] {
            assert!(repo.try_advance(id, from, to).unwrap());
        }

        // No backwards CAS is possible.
        assert!(!repo
            .try_advance(id, DocumentState::Consolidated, DocumentState::FieldsExtracted)
            .unwrap());
        assert_eq!(
            repo.get(id).unwrap().unwrap().estado,
            DocumentState::Consolidated
        );

        // The sanctioned path does move it back, bumping the generation.
        let generacion = repo
            .force_reprocess(id, DocumentState::TextExtracted)
            .unwrap();
        assert_eq!(generacion, 1);
        let doc = repo.get(id).unwrap().unwrap();
        assert_eq!(doc.estado, DocumentState::TextExtracted);
        assert_eq!(doc.generacion, 1);
    }

    #[test]
    fn test_mark_error() {
        let (_dir, repo) = temp_repo();
        let id = repo.register(&sample_doc("f001.pdf")).unwrap().unwrap();
        repo.mark_error(id).unwrap();
        assert_eq!(repo.get(id).unwrap().unwrap().estado, DocumentState::Error);
    }

    #[test]
    fn test_counts_by_state() {
        let (_dir, repo) = temp_repo();
        repo.register(&sample_doc("a.pdf")).unwrap();
        repo.register(&sample_doc("b.pdf")).unwrap();
        let counts = repo.counts_by_state().unwrap();
        assert_eq!(counts.total(), 2);
        assert_eq!(
            counts.by_state.get(&DocumentState::Registered.code()),
            Some(&2)
        );
    }
}
