//! Pipeline stage services.
//!
//! One service per stage, each operating over the shared store with
//! per-item failure isolation: a failing document is logged, relocated
//! when it has an artifact, and skipped; it never aborts the batch.

mod consensus;
mod consolidate;
mod deliver;
mod fields;
mod register;
mod score;
mod text;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub use consensus::ConsensusService;
pub use consolidate::{select_winner, ConsolidateService};
pub use deliver::DeliverService;
pub use fields::FieldService;
pub use register::{BasicInspector, DocumentInspector, PageArtifact, RegisterService};
pub use score::ScoreService;
pub use text::TextService;

/// Per-run counters every stage reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub procesados: u64,
    pub ok: u64,
    pub errores: u64,
    /// Items read but left untouched (wrong state, lost claim, duplicate).
    pub omitidos: u64,
}

impl StageSummary {
    pub fn one_ok(&mut self) {
        self.procesados += 1;
        self.ok += 1;
    }

    pub fn one_error(&mut self) {
        self.procesados += 1;
        self.errores += 1;
    }

    pub fn one_skipped(&mut self) {
        self.procesados += 1;
        self.omitidos += 1;
    }
}

impl std::fmt::Display for StageSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed | {} ok | {} skipped | {} errors",
            self.procesados, self.ok, self.omitidos, self.errores
        )
    }
}

/// Relocate a failed artifact into the error directory, writing a sidecar
/// `.log` note with the diagnostic next to it. Returns the new location.
pub fn move_to_errores(
    errores_dir: &Path,
    artifact: &Path,
    mensaje: &str,
) -> std::io::Result<PathBuf> {
    fs::create_dir_all(errores_dir)?;
    let file_name = artifact
        .file_name()
        .ok_or_else(|| std::io::Error::other("artifact has no file name"))?;
    let destino = errores_dir.join(file_name);

    // rename fails across filesystems; fall back to copy + remove.
    if fs::rename(artifact, &destino).is_err() {
        fs::copy(artifact, &destino)?;
        fs::remove_file(artifact)?;
    }
    tracing::warn!("artifact moved to error area: {}", destino.display());

    if !mensaje.is_empty() {
        let log_path = destino.with_extension("log");
        let mut f = fs::File::create(&log_path)?;
        writeln!(f, "Error al procesar: {}", file_name.to_string_lossy())?;
        writeln!(f, "{}", mensaje.trim())?;
    }

    Ok(destino)
}
