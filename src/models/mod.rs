//! Data models for the consensus pipeline.

mod document;
mod extraction;

pub use document::{Document, DocumentKind, DocumentState, ESTADO_ERROR};
pub use extraction::{shannon_entropy, ConsolidatedField, ExtractedField, ExtractionText};
