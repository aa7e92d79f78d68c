//! Document model and lifecycle states.
//!
//! A Document is one logical invoice page. Multi-page source PDFs are
//! split at registration time, one Document per page, with `archivo_padre`
//! pointing back at the original file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Terminal error state code.
pub const ESTADO_ERROR: i64 = 500;

/// Lifecycle state of a document.
///
/// States advance monotonically through the pipeline; the only exception
/// is the terminal `Error` branch and the operator-forced reprocess path,
/// which resets state together with a generation bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    /// Registered, waiting for text extraction.
    Registered,
    /// All configured engines produced full-text output.
    TextExtracted,
    /// Raw field candidates inserted.
    FieldsExtracted,
    /// Every candidate carries a confidence score.
    Evaluated,
    /// One authoritative value per field committed.
    Consolidated,
    /// Consolidated rows handed to the delivery target.
    Delivered,
    /// Unrecoverable per-document failure.
    Error,
}

impl DocumentState {
    /// Integer code persisted in the `estado` column.
    pub fn code(&self) -> i64 {
        match self {
            Self::Registered => 1,
            Self::TextExtracted => 2,
            Self::FieldsExtracted => 3,
            Self::Evaluated => 4,
            Self::Consolidated => 5,
            Self::Delivered => 6,
            Self::Error => ESTADO_ERROR,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Registered),
            2 => Some(Self::TextExtracted),
            3 => Some(Self::FieldsExtracted),
            4 => Some(Self::Evaluated),
            5 => Some(Self::Consolidated),
            6 => Some(Self::Delivered),
            ESTADO_ERROR => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::TextExtracted => "text_extracted",
            Self::FieldsExtracted => "fields_extracted",
            Self::Evaluated => "evaluated",
            Self::Consolidated => "consolidated",
            Self::Delivered => "delivered",
            Self::Error => "error",
        }
    }

    /// The state a successful stage run moves a document into, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Registered => Some(Self::TextExtracted),
            Self::TextExtracted => Some(Self::FieldsExtracted),
            Self::FieldsExtracted => Some(Self::Evaluated),
            Self::Evaluated => Some(Self::Consolidated),
            Self::Consolidated => Some(Self::Delivered),
            Self::Delivered | Self::Error => None,
        }
    }

    /// Whether a transition from `self` to `to` is legal outside of the
    /// forced-reprocess path. Forward jumps are not allowed; each stage
    /// advances exactly one step, or fails into `Error`.
    pub fn can_transition_to(&self, to: DocumentState) -> bool {
        if to == Self::Error {
            return *self != Self::Error;
        }
        self.next() == Some(to)
    }
}

/// Whether a registered page was scanned or carries a native text layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Scanned,
    Native,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scanned => "escaneado",
            Self::Native => "nativo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "escaneado" => Some(Self::Scanned),
            "nativo" => Some(Self::Native),
            _ => None,
        }
    }
}

/// One registered invoice page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Database row id. Stable, never reused.
    pub id: i64,
    /// File name of this page's artifact.
    pub nombre_archivo: String,
    /// Source file this page was split from (equals `nombre_archivo` for
    /// single-page sources).
    pub archivo_padre: String,
    /// SHA-256 of the page artifact.
    pub hash_archivo: String,
    pub tamano_bytes: i64,
    pub numero_paginas: i64,
    pub tipo_documento: DocumentKind,
    /// Average page image resolution reported by the inspector.
    pub resolucion_ppi: f64,
    /// Quality band derived from resolution (90/70/50/40).
    pub calidad_estimativa: i64,
    pub estado: DocumentState,
    /// Supersede counter, bumped by forced reprocessing.
    pub generacion: i64,
    /// Tombstone; documents are never physically deleted.
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Compute the SHA-256 content hash used for duplicate detection.
    pub fn compute_hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }

    /// Quality band for an average page resolution in ppi.
    pub fn quality_band(resolucion_ppi: f64) -> i64 {
        if resolucion_ppi >= 300.0 {
            90
        } else if resolucion_ppi >= 200.0 {
            70
        } else if resolucion_ppi > 0.0 {
            50
        } else {
            40
        }
    }
}
