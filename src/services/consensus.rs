//! Consensus stage: cross-engine agreement scores per (document, field).

use crate::consensus::{evaluate, Candidate};
use crate::models::DocumentState;
use crate::repository::{DocumentRepository, ExtractionRepository};

use super::StageSummary;

/// Consensus evaluation stage service.
///
/// Alternative (or complement) to the field scorer: instead of validating
/// each value in isolation it scores the whole candidate set of a field by
/// agreement between engines.
pub struct ConsensusService<'a> {
    doc_repo: &'a DocumentRepository,
    ext_repo: &'a ExtractionRepository,
}

impl<'a> ConsensusService<'a> {
    pub fn new(doc_repo: &'a DocumentRepository, ext_repo: &'a ExtractionRepository) -> Self {
        Self { doc_repo, ext_repo }
    }

    /// Evaluate one document, or every document that still owns unscored
    /// candidates. The summary counts documents.
    pub fn run(&self, documento_id: Option<i64>, debug: bool) -> anyhow::Result<StageSummary> {
        let pendientes = match documento_id {
            Some(id) => vec![id],
            None => self.ext_repo.documents_with_unscored()?,
        };

        let mut summary = StageSummary::default();
        if pendientes.is_empty() {
            tracing::info!("no documents pending consensus evaluation");
            return Ok(summary);
        }

        for doc_id in pendientes {
            match self.evaluate_document(doc_id, debug) {
                Ok(()) => summary.one_ok(),
                Err(e) => {
                    summary.one_error();
                    tracing::error!("consensus evaluation failed for document {}: {:#}", doc_id, e);
                }
            }
        }
        Ok(summary)
    }

    fn evaluate_document(&self, doc_id: i64, debug: bool) -> anyhow::Result<()> {
        for campo in self.ext_repo.campos_for_document(doc_id)? {
            let rows = self.ext_repo.candidates(doc_id, &campo)?;
            if rows.is_empty() {
                continue;
            }

            let candidates: Vec<Candidate<'_>> = rows
                .iter()
                .map(|r| Candidate {
                    metodo: &r.metodo,
                    valor: &r.valor,
                })
                .collect();

            let Some(scores) = evaluate(&candidates) else {
                if debug {
                    println!("[SKIP] field '{campo}' empty across every engine");
                }
                continue;
            };

            for (row, score) in rows.iter().zip(scores.iter()) {
                if debug {
                    println!(
                        "doc {doc_id} | {campo:<16} | {:<14} | {:<40} | {score}",
                        row.metodo,
                        row.valor_trimmed().chars().take(40).collect::<String>()
                    );
                }
                self.ext_repo
                    .set_consensus_score(doc_id, &campo, &row.metodo, *score)?;
            }
        }

        // Once nothing is left unscored the document counts as evaluated,
        // whichever scorer got it there.
        if !self.ext_repo.has_unscored(doc_id)? {
            let advanced = self.doc_repo.try_advance(
                doc_id,
                DocumentState::FieldsExtracted,
                DocumentState::Evaluated,
            )?;
            if advanced {
                tracing::info!("document {} advanced to evaluated", doc_id);
            }
        }
        tracing::info!("consensus evaluation complete for document {}", doc_id);
        Ok(())
    }
}
