//! Field parsing stage: engine texts become raw candidate rows.

use std::path::{Path, PathBuf};

use crate::extractor::FieldExtractor;
use crate::models::{Document, DocumentState};
use crate::repository::{DocumentRepository, ExtractionRepository, NewExtractedField};

use super::{move_to_errores, StageSummary};

/// Field parsing stage service.
pub struct FieldService<'a> {
    doc_repo: &'a DocumentRepository,
    ext_repo: &'a ExtractionRepository,
    extractor: &'a dyn FieldExtractor,
    entrada_dir: PathBuf,
    errores_dir: PathBuf,
}

impl<'a> FieldService<'a> {
    pub fn new(
        doc_repo: &'a DocumentRepository,
        ext_repo: &'a ExtractionRepository,
        extractor: &'a dyn FieldExtractor,
        entrada_dir: &Path,
        errores_dir: &Path,
    ) -> Self {
        Self {
            doc_repo,
            ext_repo,
            extractor,
            entrada_dir: entrada_dir.to_path_buf(),
            errores_dir: errores_dir.to_path_buf(),
        }
    }

    /// Parse one document, or every document in state 2.
    ///
    /// `forzar` re-parses a document whatever state it reached: its live
    /// candidates are superseded (generation bump) and its state reset to
    /// text_extracted before the normal path runs.
    pub fn run(&self, id: Option<i64>, forzar: bool) -> anyhow::Result<StageSummary> {
        if forzar {
            let id = id.ok_or_else(|| anyhow::anyhow!("--forzar-id requires a document id"))?;
            self.doc_repo
                .force_reprocess(id, DocumentState::TextExtracted)?;
        }

        let docs = match id {
            Some(id) => {
                let doc = self
                    .doc_repo
                    .get(id)?
                    .ok_or_else(|| anyhow::anyhow!("document {} not found", id))?;
                vec![doc]
            }
            None => self
                .doc_repo
                .get_in_state(DocumentState::TextExtracted, None)?,
        };

        let mut summary = StageSummary::default();
        for doc in docs {
            if doc.estado != DocumentState::TextExtracted {
                tracing::info!(
                    "document {} is in state {}, expected {}; skipping",
                    doc.id,
                    doc.estado.as_str(),
                    DocumentState::TextExtracted.as_str()
                );
                summary.one_skipped();
                continue;
            }

            match self.parse_document(&doc) {
                Ok(true) => summary.one_ok(),
                Ok(false) => summary.one_skipped(),
                Err(e) => {
                    summary.one_error();
                    tracing::error!("field parsing failed for document {}: {:#}", doc.id, e);
                    self.fail_document(&doc, &format!("{e:#}"));
                }
            }
        }
        Ok(summary)
    }

    fn parse_document(&self, doc: &Document) -> anyhow::Result<bool> {
        let texts = self.ext_repo.texts_for_document(doc.id)?;
        anyhow::ensure!(!texts.is_empty(), "no extracted texts for document");

        // Re-read the generation inside this run: a concurrent forced
        // reprocess bumps it, and new rows must carry the generation that
        // produced them.
        let generacion = self
            .doc_repo
            .get(doc.id)?
            .map(|d| d.generacion)
            .unwrap_or(doc.generacion);

        let mut parsed_text_ids = Vec::new();
        for text in &texts {
            let campos = self.extractor.extract(&text.texto_extraccion)?;
            for (campo, valor) in campos {
                self.ext_repo.insert_field(&NewExtractedField {
                    documento_id: doc.id,
                    metodo: text.metodo.clone(),
                    campo,
                    valor,
                    archivo_origen: format!("BD_doc_{}_metodo_{}", doc.id, text.metodo),
                    generacion,
                })?;
            }
            parsed_text_ids.push(text.id);
        }
        self.ext_repo.mark_texts_parsed(&parsed_text_ids)?;

        Ok(self.doc_repo.try_advance(
            doc.id,
            DocumentState::TextExtracted,
            DocumentState::FieldsExtracted,
        )?)
    }

    fn fail_document(&self, doc: &Document, mensaje: &str) {
        if let Err(e) = self.doc_repo.mark_error(doc.id) {
            tracing::error!("could not mark document {} as failed: {}", doc.id, e);
        }
        let artifact = self.entrada_dir.join(&doc.nombre_archivo);
        if artifact.exists() {
            if let Err(e) = move_to_errores(&self.errores_dir, &artifact, mensaje) {
                tracing::error!("could not relocate artifact for document {}: {}", doc.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentKind;
    use crate::repository::NewDocument;

    struct MapExtractor;
    impl FieldExtractor for MapExtractor {
        fn extract(&self, texto: &str) -> anyhow::Result<Vec<(String, String)>> {
            // First token is the brand, second the year.
            let mut tokens = texto.split_whitespace();
            Ok(vec![
                (
                    "marca".to_string(),
                    tokens.next().unwrap_or_default().to_string(),
                ),
                (
                    "anio".to_string(),
                    tokens.next().unwrap_or_default().to_string(),
                ),
            ])
        }
    }

    fn setup() -> (tempfile::TempDir, DocumentRepository, ExtractionRepository) {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("consenso.db");
        let doc_repo = DocumentRepository::new(&db).unwrap();
        let ext_repo = ExtractionRepository::new(&db).unwrap();
        (dir, doc_repo, ext_repo)
    }

    fn service<'a>(
        dir: &tempfile::TempDir,
        doc_repo: &'a DocumentRepository,
        ext_repo: &'a ExtractionRepository,
        extractor: &'a dyn FieldExtractor,
    ) -> FieldService<'a> {
        FieldService::new(
            doc_repo,
            ext_repo,
            extractor,
            &dir.path().join("entrada"),
            &dir.path().join("errores"),
        )
    }

    fn register_extracted(doc_repo: &DocumentRepository, ext_repo: &ExtractionRepository) -> i64 {
        let id = doc_repo
            .register(&NewDocument {
                nombre_archivo: "f001.pdf".to_string(),
                archivo_padre: "f001.pdf".to_string(),
                hash_archivo: "h".to_string(),
                tamano_bytes: 10,
                numero_paginas: 1,
                tipo_documento: DocumentKind::Scanned,
                resolucion_ppi: 0.0,
                calidad_estimativa: 40,
            })
            .unwrap()
            .unwrap();
        ext_repo.upsert_text(id, "paddleocr", "TOYOTA 2021", 3.0).unwrap();
        ext_repo.upsert_text(id, "doctr", "T0YOTA 2021", 3.0).unwrap();
        doc_repo
            .try_advance(id, DocumentState::Registered, DocumentState::TextExtracted)
            .unwrap();
        id
    }

    #[test]
    fn test_candidates_per_engine() {
        let (_dir, doc_repo, ext_repo) = setup();
        let id = register_extracted(&doc_repo, &ext_repo);

        let service = service(&_dir, &doc_repo, &ext_repo, &MapExtractor);
        let summary = service.run(None, false).unwrap();
        assert_eq!(summary.ok, 1);

        let marcas = ext_repo.candidates(id, "marca").unwrap();
        assert_eq!(marcas.len(), 2);
        assert!(marcas.iter().any(|c| c.metodo == "paddleocr" && c.valor == "TOYOTA"));
        assert!(marcas.iter().any(|c| c.metodo == "doctr" && c.valor == "T0YOTA"));
        assert!(marcas.iter().all(|c| c.score.is_none()));

        assert_eq!(
            doc_repo.get(id).unwrap().unwrap().estado,
            DocumentState::FieldsExtracted
        );
        let texts = ext_repo.texts_for_document(id).unwrap();
        assert!(texts
            .iter()
            .all(|t| t.estado == DocumentState::FieldsExtracted.code()));
    }

    #[test]
    fn test_forced_reparse_supersedes_candidates() {
        let (_dir, doc_repo, ext_repo) = setup();
        let id = register_extracted(&doc_repo, &ext_repo);

        let service = service(&_dir, &doc_repo, &ext_repo, &MapExtractor);
        service.run(None, false).unwrap();

        let summary = service.run(Some(id), true).unwrap();
        assert_eq!(summary.ok, 1);

        // Old generation tombstoned, new generation live.
        let marcas = ext_repo.candidates(id, "marca").unwrap();
        assert_eq!(marcas.len(), 2);
        assert!(marcas.iter().all(|c| c.generacion == 1));
        assert_eq!(
            doc_repo.get(id).unwrap().unwrap().estado,
            DocumentState::FieldsExtracted
        );
    }

    #[test]
    fn test_wrong_state_skipped() {
        let (_dir, doc_repo, ext_repo) = setup();
        let id = register_extracted(&doc_repo, &ext_repo);
        let service = service(&_dir, &doc_repo, &ext_repo, &MapExtractor);
        service.run(None, false).unwrap();

        // Already parsed: second run has nothing to claim.
        let summary = service.run(Some(id), false).unwrap();
        assert_eq!(summary.omitidos, 1);
        assert_eq!(ext_repo.candidates(id, "marca").unwrap().len(), 2);
    }
}
