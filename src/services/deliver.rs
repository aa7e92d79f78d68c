//! Delivery stage: consolidated rows leave the pipeline.

use crate::delivery::DeliveryTarget;
use crate::models::DocumentState;
use crate::repository::{ConsolidatedRepository, DocumentRepository};

use super::StageSummary;

/// Delivery stage service.
pub struct DeliverService<'a> {
    doc_repo: &'a DocumentRepository,
    cons_repo: &'a ConsolidatedRepository,
    target: &'a dyn DeliveryTarget,
}

impl<'a> DeliverService<'a> {
    pub fn new(
        doc_repo: &'a DocumentRepository,
        cons_repo: &'a ConsolidatedRepository,
        target: &'a dyn DeliveryTarget,
    ) -> Self {
        Self {
            doc_repo,
            cons_repo,
            target,
        }
    }

    /// Deliver one consolidated document, or all of them.
    pub fn run(&self, id: Option<i64>) -> anyhow::Result<StageSummary> {
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
                .get_in_state(DocumentState::Consolidated, None)?,
        };

        let mut summary = StageSummary::default();
        for doc in docs {
            if doc.estado != DocumentState::Consolidated {
                tracing::info!(
                    "document {} is in state {}, expected {}; skipping",
                    doc.id,
                    doc.estado.as_str(),
                    DocumentState::Consolidated.as_str()
                );
                summary.one_skipped();
                continue;
            }

            let campos = match self.cons_repo.for_document(doc.id) {
                Ok(campos) => campos,
                Err(e) => {
                    summary.one_error();
                    tracing::error!("could not load consolidated rows for {}: {}", doc.id, e);
                    continue;
                }
            };

            match self.target.deliver(&doc, &campos) {
                Ok(()) => {
                    if self.doc_repo.try_advance(
                        doc.id,
                        DocumentState::Consolidated,
                        DocumentState::Delivered,
                    )? {
                        summary.one_ok();
                    } else {
                        summary.one_skipped();
                    }
                }
                Err(e) => {
                    // Delivery failures are retryable; the document stays
                    // consolidated.
                    summary.one_error();
                    tracing::error!("delivery failed for document {}: {:#}", doc.id, e);
                }
            }
        }
        Ok(summary)
    }
}
