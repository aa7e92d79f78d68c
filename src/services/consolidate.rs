//! Consolidation stage: one authoritative value per (document, field).

use std::collections::BTreeSet;

use crate::models::{DocumentState, ExtractedField};
use crate::repository::{ConsolidatedRepository, DocumentRepository, ExtractionRepository};

use super::StageSummary;

/// Pick the winning candidate: highest confidence first, ties broken by
/// the engine-priority order (position in `priority`; engines not listed
/// rank last). Unscored and empty candidates never win.
pub fn select_winner<'a>(
    candidates: &'a [ExtractedField],
    priority: &[String],
) -> Option<&'a ExtractedField> {
    let rank = |metodo: &str| {
        priority
            .iter()
            .position(|m| m == metodo)
            .unwrap_or(priority.len())
    };

    candidates
        .iter()
        .filter(|c| !c.is_empty() && c.score.is_some())
        .min_by(|a, b| {
            let (sa, sb) = (a.score.unwrap_or(0.0), b.score.unwrap_or(0.0));
            // Highest score first, then best (lowest) priority rank.
            sb.partial_cmp(&sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| rank(&a.metodo).cmp(&rank(&b.metodo)))
        })
}

/// Consolidation stage service.
pub struct ConsolidateService<'a> {
    doc_repo: &'a DocumentRepository,
    ext_repo: &'a ExtractionRepository,
    cons_repo: &'a ConsolidatedRepository,
    priority: &'a [String],
}

impl<'a> ConsolidateService<'a> {
    pub fn new(
        doc_repo: &'a DocumentRepository,
        ext_repo: &'a ExtractionRepository,
        cons_repo: &'a ConsolidatedRepository,
        priority: &'a [String],
    ) -> Self {
        Self {
            doc_repo,
            ext_repo,
            cons_repo,
            priority,
        }
    }

    /// Consolidate every eligible (document, field) pair; scope narrows to
    /// one document (`forzar_id`) and/or one field (`solo_campo`). The
    /// summary counts pairs; re-running over unchanged candidates rewrites
    /// identical rows.
    pub fn run(
        &self,
        forzar_id: Option<i64>,
        solo_campo: Option<&str>,
    ) -> anyhow::Result<StageSummary> {
        let pairs = self.cons_repo.pairs_to_consolidate(forzar_id, solo_campo)?;
        let mut summary = StageSummary::default();
        let mut touched: BTreeSet<i64> = BTreeSet::new();

        for (doc_id, campo) in &pairs {
            match self.consolidate_pair(*doc_id, campo) {
                Ok(true) => {
                    summary.one_ok();
                    touched.insert(*doc_id);
                }
                Ok(false) => summary.one_skipped(),
                Err(e) => {
                    summary.one_error();
                    tracing::error!(
                        "consolidation failed for document {} field '{}': {:#}",
                        doc_id,
                        campo,
                        e
                    );
                }
            }
        }
        tracing::info!("consolidation complete for {} pairs", pairs.len());

        // Consolidating only one field leaves the document mid-stage on
        // purpose; the full pass is what completes it.
        if solo_campo.is_none() {
            for doc_id in touched {
                let advanced = self.doc_repo.try_advance(
                    doc_id,
                    DocumentState::Evaluated,
                    DocumentState::Consolidated,
                )?;
                if advanced {
                    tracing::info!("document {} advanced to consolidated", doc_id);
                }
            }
        }
        Ok(summary)
    }

    fn consolidate_pair(&self, doc_id: i64, campo: &str) -> anyhow::Result<bool> {
        let candidates = self.ext_repo.candidates(doc_id, campo)?;
        let Some(winner) = select_winner(&candidates, self.priority) else {
            return Ok(false);
        };
        self.cons_repo
            .upsert(doc_id, &winner.metodo, campo, winner.valor_trimmed())?;
        tracing::info!(
            "consolidated field '{}' of document {} via '{}' (score {:?})",
            campo,
            doc_id,
            winner.metodo,
            winner.score
        );
        Ok(true)
    }
}
