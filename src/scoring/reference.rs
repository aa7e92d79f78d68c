//! Reference lists for enum-constrained fields.
//!
//! Brands can be replaced from a dictionary CSV; the remaining lists are
//! short and ship built in.

use std::path::Path;

use anyhow::Context;

const MARCAS: &[&str] = &[
    "TOYOTA", "HYUNDAI", "FORD", "CHEVROLET", "NISSAN", "MITSUBISHI", "JEEP", "KIA", "PEUGEOT",
    "RENAULT", "FIAT", "VOLKSWAGEN", "BMW", "MERCEDES", "HONDA", "MAZDA", "SSANGYONG", "CITROEN",
    "JAC", "DFSK", "SUBARU", "CHERY", "SUZUKI", "BYD", "VOLVO", "FOTON", "MAXUS", "GEELY",
    "CHANGAN", "JETOUR", "FAW", "IVECO", "SCANIA", "DAEWOO", "MAN", "ISUZU", "RAM",
];

const TIPOS_DOCUMENTO: &[&str] = &[
    "FACTURA ELECTRONICA",
    "NOTA DE CREDITO ELECTRONICA",
    "NOTA DE CREDITO",
    "ORDEN DE COMPRA",
    "HOMOLOGADO",
    "CEDULA DE IDENTIDAD",
    "CONTRATO",
    "ROL UNICO TRIBUTARIO",
];

const COLORES: &[&str] = &[
    "ROJO", "AZUL", "VERDE", "GRIS", "NEGRO", "BLANCO", "AMARILLO", "BEIGE", "CAFE", "PLATEADO",
];

const UNIDADES: &[&str] = &["KG", "CV", "KW"];

/// Reference vocabularies consulted by the enum-constrained validators.
#[derive(Debug, Clone)]
pub struct ReferenceLists {
    marcas: Vec<String>,
    tipos_documento: Vec<String>,
    colores: Vec<String>,
    unidades: Vec<String>,
}

impl Default for ReferenceLists {
    fn default() -> Self {
        Self {
            marcas: MARCAS.iter().map(|s| s.to_string()).collect(),
            tipos_documento: TIPOS_DOCUMENTO.iter().map(|s| s.to_string()).collect(),
            colores: COLORES.iter().map(|s| s.to_string()).collect(),
            unidades: UNIDADES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ReferenceLists {
    /// Load the brand list from a dictionary CSV with a `marca` column,
    /// keeping the built-in defaults for everything else.
    pub fn with_marcas_csv(path: &Path) -> anyhow::Result<Self> {
        let mut lists = Self::default();
        lists.marcas = load_marcas(path)
            .with_context(|| format!("failed to load brand dictionary {}", path.display()))?;
        Ok(lists)
    }

    pub fn marcas(&self) -> &[String] {
        &self.marcas
    }

    pub fn tipos_documento(&self) -> &[String] {
        &self.tipos_documento
    }

    pub fn colores(&self) -> &[String] {
        &self.colores
    }

    pub fn unidades(&self) -> &[String] {
        &self.unidades
    }
}

fn load_marcas(path: &Path) -> anyhow::Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let marca_idx = headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case("marca"))
        .context("dictionary has no 'marca' column")?;

    let mut marcas = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(marca) = record.get(marca_idx) {
            let marca = marca.trim().to_uppercase();
            if !marca.is_empty() {
                marcas.push(marca);
            }
        }
    }
    anyhow::ensure!(!marcas.is_empty(), "dictionary contains no brands");
    Ok(marcas)
}

/// Score a value against a reference list: 1.0 on exact membership, 0.6 on
/// a fuzzy match at or above `cutoff`, 0.1 otherwise. Matching is done on
/// the trimmed, uppercased value.
pub fn score_membership(valor: &str, list: &[String], cutoff: f64) -> f64 {
    let valor = valor.trim().to_uppercase();
    if list.iter().any(|m| *m == valor) {
        return 1.0;
    }
    let best = list
        .iter()
        .map(|m| strsim::normalized_levenshtein(&valor, m))
        .fold(0.0f64, f64::max);
    if best >= cutoff {
        0.6
    } else {
        0.1
    }
}
