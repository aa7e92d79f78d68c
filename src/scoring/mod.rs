//! Per-field confidence scoring.
//!
//! `score(campo, valor)` is a total function into [0, 1]: it never fails
//! and maps every blank input to 0.0. Dispatch goes through a closed
//! [`FieldKind`] registry; names without a registered kind fall through to
//! the generic heuristic explicitly.

mod reference;
pub mod rut;
pub mod vin;

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;

pub use reference::{score_membership, ReferenceLists};

/// Validation strategy for a field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Tax id with modulo-11 check digit.
    Rut,
    /// Four-digit model year.
    Anio,
    /// Document emission date.
    Fecha,
    /// 17-character chassis number.
    Vin,
    /// Brand, against the dictionary list.
    Marca,
    /// Color, against the built-in list.
    Color,
    /// Document type, against the built-in list.
    TipoDoc,
    /// Unit of measure (KG/CV/KW).
    Unidad,
    /// Chilean license plate shape.
    Patente,
    /// Vehicle type, penalizing generic words.
    TipoVehiculo,
    /// All-digit value of at least `min_len` characters.
    Numerico { min_len: usize },
    /// Alphabetic value of at least `min_len` characters.
    Alfabetico { min_len: usize },
    /// Fallback heuristic for unregistered names.
    Generico,
}

/// Resolve a field name to its registered kind. Unregistered names map to
/// [`FieldKind::Generico`] on purpose: every field always scores.
pub fn kind_for(campo: &str) -> FieldKind {
    match campo {
        "rut_proveedor" | "rut_comprador" => FieldKind::Rut,
        "anio" => FieldKind::Anio,
        "fecha_documento" => FieldKind::Fecha,
        "vin" | "n_chasis" => FieldKind::Vin,
        "marca" => FieldKind::Marca,
        "color" => FieldKind::Color,
        "tipo_doc" => FieldKind::TipoDoc,
        "unidad_pbv" | "unidad_carga" | "unidad_potencia" => FieldKind::Unidad,
        "placa_patente" => FieldKind::Patente,
        "tipo_vehiculo" => FieldKind::TipoVehiculo,
        "carga" => FieldKind::Numerico { min_len: 2 },
        "numero_documento" | "monto_total" | "monto_neto" | "monto_iva" | "asientos"
        | "puertas" | "potencia_motor" | "ejes" | "cilindrada" | "cit" | "serie" | "pbv"
        | "n_motor" => FieldKind::Numerico { min_len: 1 },
        "transmision" | "combustible" | "traccion" | "tipo_carroceria" => {
            FieldKind::Alfabetico { min_len: 2 }
        }
        _ => FieldKind::Generico,
    }
}

/// Fuzzy-match cutoff for most reference lists.
const FUZZY_CUTOFF: f64 = 0.8;
/// Document types tolerate slightly noisier OCR.
const FUZZY_CUTOFF_TIPO_DOC: f64 = 0.75;

fn patente_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{2,4}\d{2,4}$").unwrap())
}

/// Field scorer: reference lists plus the primary-engine prior.
#[derive(Debug, Clone)]
pub struct FieldScorer {
    lists: ReferenceLists,
    /// Engine whose `tipo_doc` readings get the additive prior.
    primary_engine: String,
    /// Magnitude of that prior.
    primary_engine_bonus: f64,
}

impl FieldScorer {
    pub fn new(lists: ReferenceLists, primary_engine: &str, primary_engine_bonus: f64) -> Self {
        Self {
            lists,
            primary_engine: primary_engine.to_string(),
            primary_engine_bonus,
        }
    }

    /// Score a raw value for a field. Total: never fails, blank -> 0.0.
    pub fn score(&self, campo: &str, valor: &str) -> f64 {
        let valor = valor.trim();
        if valor.is_empty() {
            return 0.0;
        }

        match kind_for(campo) {
            FieldKind::Rut => rut::score_rut(valor),
            FieldKind::Anio => score_anio(valor),
            FieldKind::Fecha => score_fecha(valor),
            FieldKind::Vin => vin::score_vin(valor),
            FieldKind::Marca => score_membership(valor, self.lists.marcas(), FUZZY_CUTOFF),
            FieldKind::Color => score_membership(valor, self.lists.colores(), FUZZY_CUTOFF),
            FieldKind::TipoDoc => {
                score_membership(valor, self.lists.tipos_documento(), FUZZY_CUTOFF_TIPO_DOC)
            }
            FieldKind::Unidad => score_membership(valor, self.lists.unidades(), FUZZY_CUTOFF),
            FieldKind::Patente => score_patente(valor),
            FieldKind::TipoVehiculo => score_tipo_vehiculo(valor),
            FieldKind::Numerico { min_len } => score_numerico(valor, min_len),
            FieldKind::Alfabetico { min_len } => score_alfabetico(valor, min_len),
            FieldKind::Generico => score_generico(valor),
        }
    }

    /// Score a candidate produced by a specific engine.
    ///
    /// `tipo_doc` readings from the primary engine carry an additive
    /// prior, capped at 1.0.
    pub fn score_candidate(&self, campo: &str, valor: &str, metodo: &str) -> f64 {
        let mut score = self.score(campo, valor);
        if campo == "tipo_doc" && metodo == self.primary_engine {
            score = (score + self.primary_engine_bonus).min(1.0);
        }
        score
    }
}

fn score_anio(valor: &str) -> f64 {
    let Ok(anio) = valor.parse::<i32>() else {
        return 0.0;
    };
    if (1900..=Utc::now().year() + 1).contains(&anio) {
        1.0
    } else {
        0.1
    }
}

fn score_fecha(valor: &str) -> f64 {
    for fmt in ["%d/%m/%Y", "%Y-%m-%d"] {
        if let Ok(fecha) = NaiveDate::parse_from_str(valor, fmt) {
            return if (2000..=Utc::now().year()).contains(&fecha.year()) {
                1.0
            } else {
                0.3
            };
        }
    }
    0.0
}

fn score_patente(valor: &str) -> f64 {
    if patente_shape().is_match(&valor.to_uppercase()) {
        1.0
    } else {
        0.3
    }
}

fn score_tipo_vehiculo(valor: &str) -> f64 {
    let valor = valor.to_uppercase();
    if ["AUTO", "VEHICULO"].iter().any(|p| valor.contains(p)) {
        return 0.2;
    }
    if valor.len() >= 3 && valor.chars().all(|c| c.is_alphabetic()) {
        1.0
    } else {
        0.1
    }
}

fn score_numerico(valor: &str, min_len: usize) -> f64 {
    if valor.len() >= min_len && valor.chars().all(|c| c.is_ascii_digit()) {
        1.0
    } else {
        0.1
    }
}

fn score_alfabetico(valor: &str, min_len: usize) -> f64 {
    if valor.len() >= min_len && valor.chars().all(|c| c.is_alphabetic()) {
        1.0
    } else {
        0.1
    }
}

fn score_generico(valor: &str) -> f64 {
    if valor.len() >= 3 {
        0.6
    } else {
        0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> FieldScorer {
        FieldScorer::new(ReferenceLists::default(), "paddleocr", 0.20)
    }

    #[test]
    fn test_blank_scores_zero_for_every_kind() {
        let s = scorer();
        for campo in [
            "rut_proveedor",
            "anio",
            "fecha_documento",
            "vin",
            "marca",
            "color",
            "tipo_doc",
            "unidad_pbv",
            "placa_patente",
            "tipo_vehiculo",
            "monto_total",
            "transmision",
            "campo_inventado",
        ] {
            assert_eq!(s.score(campo, ""), 0.0, "campo {campo}");
            assert_eq!(s.score(campo, "   "), 0.0, "campo {campo}");
        }
    }

    #[test]
    fn test_rut_wellformed_but_invalid_check_digit() {
        // Well-shaped RUT whose check digit does not verify: base 0.1 +
        // digit count 0.2 + shape 0.3, no modulo-11 bonus.
        assert!((scorer().score("rut_proveedor", "12345678-5") - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_anio() {
        let s = scorer();
        assert_eq!(s.score("anio", "2019"), 1.0);
        assert_eq!(s.score("anio", "1899"), 0.1);
        assert_eq!(s.score("anio", "9999"), 0.1);
        assert_eq!(s.score("anio", "dos mil"), 0.0);
    }

    #[test]
    fn test_fecha() {
        let s = scorer();
        assert_eq!(s.score("fecha_documento", "15/03/2021"), 1.0);
        assert_eq!(s.score("fecha_documento", "2021-03-15"), 1.0);
        assert_eq!(s.score("fecha_documento", "15/03/1997"), 0.3);
        assert_eq!(s.score("fecha_documento", "35/03/2021"), 0.0);
    }

    #[test]
    fn test_enum_fields() {
        let s = scorer();
        assert_eq!(s.score("marca", "TOYOTA"), 1.0);
        assert_eq!(s.score("marca", "T0YOTA"), 0.6);
        assert_eq!(s.score("marca", "XYZQW"), 0.1);
        assert_eq!(s.score("color", "ROJO"), 1.0);
        assert_eq!(s.score("tipo_doc", "FACTURA ELECTRONICA"), 1.0);
        assert_eq!(s.score("unidad_carga", "KG"), 1.0);
    }

    #[test]
    fn test_patente() {
        let s = scorer();
        assert_eq!(s.score("placa_patente", "AB1234"), 1.0);
        assert_eq!(s.score("placa_patente", "bbbb99"), 1.0);
        assert_eq!(s.score("placa_patente", "A-1234"), 0.3);
    }

    #[test]
    fn test_tipo_vehiculo_generic_words() {
        let s = scorer();
        assert_eq!(s.score("tipo_vehiculo", "CAMIONETA"), 1.0);
        assert_eq!(s.score("tipo_vehiculo", "AUTOMOVIL"), 0.2);
        assert_eq!(s.score("tipo_vehiculo", "VEHICULO MOTORIZADO"), 0.2);
    }

    #[test]
    fn test_numeric_fields() {
        let s = scorer();
        assert_eq!(s.score("monto_total", "1990000"), 1.0);
        assert_eq!(s.score("monto_total", "1.990.000"), 0.1);
        assert_eq!(s.score("carga", "7"), 0.1);
        assert_eq!(s.score("carga", "750"), 1.0);
        assert_eq!(s.score("asientos", "5"), 1.0);
    }

    #[test]
    fn test_unregistered_field_uses_generic() {
        let s = scorer();
        assert_eq!(kind_for("observaciones"), FieldKind::Generico);
        assert_eq!(s.score("observaciones", "ab"), 0.1);
        assert_eq!(s.score("observaciones", "texto libre"), 0.6);
    }

    #[test]
    fn test_primary_engine_bonus_only_for_tipo_doc() {
        let s = scorer();
        let base = s.score("tipo_doc", "FACTURA ELEKTRONICA");
        assert!((s.score_candidate("tipo_doc", "FACTURA ELEKTRONICA", "paddleocr")
            - (base + 0.20))
            .abs()
            < 1e-9);
        assert_eq!(
            s.score_candidate("tipo_doc", "FACTURA ELEKTRONICA", "doctr"),
            base
        );
        // Other fields never get the prior, whatever the engine.
        assert_eq!(s.score_candidate("marca", "TOYOTA", "paddleocr"), 1.0);
    }

    #[test]
    fn test_bonus_is_capped() {
        let s = scorer();
        assert_eq!(
            s.score_candidate("tipo_doc", "FACTURA ELECTRONICA", "paddleocr"),
            1.0
        );
    }
}
