//! Text extraction stage: every engine runs over every registered page.

use std::path::{Path, PathBuf};

use crate::models::{shannon_entropy, Document, DocumentState};
use crate::ocr::TextEngine;
use crate::repository::{DocumentRepository, ExtractionRepository};

use super::{move_to_errores, StageSummary};

/// Text extraction stage service.
pub struct TextService<'a> {
    doc_repo: &'a DocumentRepository,
    ext_repo: &'a ExtractionRepository,
    engines: &'a [Box<dyn TextEngine>],
    entrada_dir: PathBuf,
    errores_dir: PathBuf,
}

impl<'a> TextService<'a> {
    pub fn new(
        doc_repo: &'a DocumentRepository,
        ext_repo: &'a ExtractionRepository,
        engines: &'a [Box<dyn TextEngine>],
        entrada_dir: &Path,
        errores_dir: &Path,
    ) -> Self {
        Self {
            doc_repo,
            ext_repo,
            engines,
            entrada_dir: entrada_dir.to_path_buf(),
            errores_dir: errores_dir.to_path_buf(),
        }
    }

    /// Process one document, or every document waiting in state 1.
    pub fn run(&self, id: Option<i64>) -> anyhow::Result<StageSummary> {
        anyhow::ensure!(!self.engines.is_empty(), "no text engines configured");

        let docs = match id {
            Some(id) => {
                let doc = self
                    .doc_repo
                    .get(id)?
                    .ok_or_else(|| anyhow::anyhow!("document {} not found", id))?;
                vec![doc]
            }
            None => self.doc_repo.get_in_state(DocumentState::Registered, None)?,
        };

        let mut summary = StageSummary::default();
        for doc in docs {
            // Stages only act on documents in their required input state;
            // anything else is skipped, never mutated.
            if doc.estado != DocumentState::Registered {
                tracing::info!(
                    "document {} is in state {}, expected {}; skipping",
                    doc.id,
                    doc.estado.as_str(),
                    DocumentState::Registered.as_str()
                );
                summary.one_skipped();
                continue;
            }

            match self.extract_document(&doc) {
                Ok(true) => summary.one_ok(),
                Ok(false) => summary.one_skipped(),
                Err(e) => {
                    summary.one_error();
                    tracing::error!("text extraction failed for document {}: {:#}", doc.id, e);
                    self.fail_document(&doc, &format!("{e:#}"));
                }
            }
        }
        Ok(summary)
    }

    /// Run every engine over one document. Returns `Ok(false)` when the
    /// final state claim was lost to a concurrent worker.
    ///
    /// The per-engine upserts are idempotent, so losing the claim after
    /// writing them is harmless: the winner wrote the same rows.
    fn extract_document(&self, doc: &Document) -> anyhow::Result<bool> {
        let artifact = self.entrada_dir.join(&doc.nombre_archivo);
        anyhow::ensure!(
            artifact.exists(),
            "artifact missing: {}",
            artifact.display()
        );

        let mut produced = 0usize;
        for engine in self.engines {
            let metodo = engine.metodo();
            match engine.extract_text(&artifact) {
                Ok(texto) => {
                    let entropia = shannon_entropy(&texto);
                    self.ext_repo
                        .upsert_text(doc.id, metodo, &texto, entropia)?;
                    tracing::debug!(
                        "document {} engine {}: {} chars, entropy {:.3}",
                        doc.id,
                        metodo,
                        texto.len(),
                        entropia
                    );
                    produced += 1;
                }
                Err(e) => {
                    tracing::warn!("engine {} failed on document {}: {}", metodo, doc.id, e);
                }
            }
        }
        anyhow::ensure!(produced > 0, "every engine failed");

        Ok(self
            .doc_repo
            .try_advance(doc.id, DocumentState::Registered, DocumentState::TextExtracted)?)
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
