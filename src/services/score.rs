//! Scoring stage: every unscored candidate gets a confidence.

use std::collections::BTreeSet;

use crate::models::DocumentState;
use crate::repository::{DocumentRepository, ExtractionRepository};
use crate::scoring::FieldScorer;

use super::StageSummary;

/// Scoring stage service.
pub struct ScoreService<'a> {
    doc_repo: &'a DocumentRepository,
    ext_repo: &'a ExtractionRepository,
    scorer: &'a FieldScorer,
}

impl<'a> ScoreService<'a> {
    pub fn new(
        doc_repo: &'a DocumentRepository,
        ext_repo: &'a ExtractionRepository,
        scorer: &'a FieldScorer,
    ) -> Self {
        Self {
            doc_repo,
            ext_repo,
            scorer,
        }
    }

    /// Score candidates with `score IS NULL OR score = 0`, for one
    /// document or for all. Documents whose rows were touched advance to
    /// evaluated. The summary counts candidate rows.
    pub fn run(&self, documento_id: Option<i64>) -> anyhow::Result<StageSummary> {
        let rows = self.ext_repo.unscored_fields(documento_id)?;
        let mut summary = StageSummary::default();
        let mut touched: BTreeSet<i64> = BTreeSet::new();

        for row in &rows {
            // The scorer is total; a malformed value lands in the lowest
            // bucket instead of failing the row.
            let score = self
                .scorer
                .score_candidate(&row.campo, &row.valor, &row.metodo);
            match self.ext_repo.set_score(row.id, score) {
                Ok(()) => {
                    summary.one_ok();
                    touched.insert(row.documento_id);
                }
                Err(e) => {
                    summary.one_error();
                    tracing::error!("could not store score for row {}: {}", row.id, e);
                }
            }
        }
        tracing::info!("{} candidate scores updated", summary.ok);

        for doc_id in touched {
            self.advance_to_evaluated(doc_id)?;
        }
        Ok(summary)
    }

    fn advance_to_evaluated(&self, doc_id: i64) -> anyhow::Result<()> {
        let advanced = self.doc_repo.try_advance(
            doc_id,
            DocumentState::FieldsExtracted,
            DocumentState::Evaluated,
        )?;
        if advanced {
            tracing::info!("document {} advanced to evaluated", doc_id);
        } else {
            tracing::info!(
                "document {} not in fields_extracted, evaluation state untouched",
                doc_id
            );
        }
        Ok(())
    }
}
