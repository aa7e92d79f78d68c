//! Multi-engine OCR field consensus and consolidation pipeline.
//!
//! Scanned vehicle invoices pass through a fixed lifecycle: registration,
//! text extraction by several independent OCR engines, field parsing,
//! confidence scoring (per-field validators and/or cross-engine
//! consensus), consolidation into one authoritative value per field, and
//! delivery. The SQLite store is the single source of truth; every stage
//! is idempotent and claims documents through conditional state updates,
//! so batches can be re-run and interrupted without corrupting progress.

pub mod cli;
pub mod config;
pub mod consensus;
pub mod delivery;
pub mod extractor;
pub mod models;
pub mod ocr;
pub mod repository;
pub mod scoring;
pub mod services;
