//! Extraction and consolidation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OCR engine's full-text output for one document.
///
/// Unique per (documento_id, metodo); re-running an engine overwrites the
/// previous row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionText {
    pub id: i64,
    pub documento_id: i64,
    /// Engine identifier, e.g. "paddleocr".
    pub metodo: String,
    pub texto_extraccion: String,
    /// Shannon entropy of the text, a cheap OCR-quality proxy.
    pub entropia: f64,
    /// Mirrors the owning document's stage for this row: 2 when stored,
    /// 3 once its field candidates were parsed out.
    pub estado: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One candidate value for one field, produced by one engine's text.
///
/// Many rows share (documento_id, campo); the scorer and the consensus
/// evaluator fill in `score`, the consolidator reduces them to a single
/// [`ConsolidatedField`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    pub id: i64,
    pub documento_id: i64,
    pub metodo: String,
    pub campo: String,
    /// Raw extracted value; may be empty.
    pub valor: String,
    /// Confidence in [0, 1]; NULL until evaluated.
    pub score: Option<f64>,
    pub archivo_origen: String,
    /// Generation this candidate belongs to; superseded generations are
    /// tombstoned, never physically deleted.
    pub generacion: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtractedField {
    /// Trimmed value, the unit of comparison everywhere downstream.
    pub fn valor_trimmed(&self) -> &str {
        self.valor.trim()
    }

    pub fn is_empty(&self) -> bool {
        self.valor_trimmed().is_empty()
    }
}

/// The single authoritative value for one (document, field).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedField {
    pub documento_id: i64,
    /// Engine whose candidate won.
    pub metodo: String,
    pub campo: String,
    pub valor: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Shannon entropy over the character distribution of `text`.
///
/// Garbage OCR output tends toward either extreme (near-zero for blank or
/// repeated glyphs, high for noise), so the value is stored alongside each
/// extraction as a quality signal.
pub fn shannon_entropy(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let mut counts: std::collections::HashMap<char, usize> = std::collections::HashMap::new();
    let mut total = 0usize;
    for c in text.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }
    let total = total as f64;
    -counts
        .values()
        .map(|&f| {
            let p = f as f64 / total;
            p * p.log2()
        })
        .sum::<f64>()
}
