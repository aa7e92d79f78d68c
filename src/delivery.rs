//! Delivery collaborator.
//!
//! Downstream transport (SFTP upload, ERP ingestion, ...) is outside this
//! system. A delivery target consumes the consolidated rows of one
//! document; the built-in implementation exports them as a JSON file per
//! document.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;

use crate::models::{ConsolidatedField, Document};

/// Consumes the consolidated rows of one document.
pub trait DeliveryTarget: Send + Sync {
    fn deliver(&self, doc: &Document, campos: &[ConsolidatedField]) -> anyhow::Result<()>;
}

#[derive(Serialize)]
struct ExportRecord<'a> {
    documento_id: i64,
    nombre_archivo: &'a str,
    archivo_padre: &'a str,
    campos: Vec<ExportField<'a>>,
}

#[derive(Serialize)]
struct ExportField<'a> {
    campo: &'a str,
    valor: &'a str,
    metodo: &'a str,
}

/// Writes one `documento_<id>.json` per delivered document.
pub struct JsonExporter {
    salida_dir: PathBuf,
}

impl JsonExporter {
    pub fn new(salida_dir: PathBuf) -> Self {
        Self { salida_dir }
    }
}

impl DeliveryTarget for JsonExporter {
    fn deliver(&self, doc: &Document, campos: &[ConsolidatedField]) -> anyhow::Result<()> {
        fs::create_dir_all(&self.salida_dir)?;
        let record = ExportRecord {
            documento_id: doc.id,
            nombre_archivo: &doc.nombre_archivo,
            archivo_padre: &doc.archivo_padre,
            campos: campos
                .iter()
                .map(|c| ExportField {
                    campo: &c.campo,
                    valor: &c.valor,
                    metodo: &c.metodo,
                })
                .collect(),
        };
        let path = self.salida_dir.join(format!("documento_{}.json", doc.id));
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write export {}", path.display()))?;
        Ok(())
    }
}
