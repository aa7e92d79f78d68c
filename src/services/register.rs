//! Registration stage: intake files become Document rows.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{Document, DocumentKind};
use crate::repository::{DocumentRepository, NewDocument};

use super::{move_to_errores, StageSummary};

/// One page produced by inspecting a source file.
#[derive(Debug, Clone)]
pub struct PageArtifact {
    /// Path of the page artifact on disk (the source itself when no split
    /// happened).
    pub path: PathBuf,
    /// Source file this page came from.
    pub archivo_padre: String,
    pub numero_paginas: i64,
    pub tipo_documento: DocumentKind,
    pub resolucion_ppi: f64,
}

/// Splits and measures a source file. PDF parsing lives outside this
/// system; the inspector is the boundary through which page counts, page
/// splits, document kind and resolution arrive.
pub trait DocumentInspector: Send + Sync {
    fn inspect(&self, path: &Path) -> anyhow::Result<Vec<PageArtifact>>;
}

/// Inspector for pre-split, single-page artifacts: no splitting, scanned
/// kind, unknown resolution.
pub struct BasicInspector;

impl DocumentInspector for BasicInspector {
    fn inspect(&self, path: &Path) -> anyhow::Result<Vec<PageArtifact>> {
        let archivo_padre = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        anyhow::ensure!(!archivo_padre.is_empty(), "source file has no name");
        Ok(vec![PageArtifact {
            path: path.to_path_buf(),
            archivo_padre,
            numero_paginas: 1,
            tipo_documento: DocumentKind::Scanned,
            resolucion_ppi: 0.0,
        }])
    }
}

/// Registration stage service.
pub struct RegisterService<'a> {
    repo: &'a DocumentRepository,
    inspector: &'a dyn DocumentInspector,
    entrada_dir: PathBuf,
    errores_dir: PathBuf,
    padres_dir: PathBuf,
}

impl<'a> RegisterService<'a> {
    pub fn new(
        repo: &'a DocumentRepository,
        inspector: &'a dyn DocumentInspector,
        entrada_dir: &Path,
        errores_dir: &Path,
        padres_dir: &Path,
    ) -> Self {
        Self {
            repo,
            inspector,
            entrada_dir: entrada_dir.to_path_buf(),
            errores_dir: errores_dir.to_path_buf(),
            padres_dir: padres_dir.to_path_buf(),
        }
    }

    /// Register every PDF in the intake directory.
    pub fn run(&self) -> anyhow::Result<StageSummary> {
        anyhow::ensure!(
            self.entrada_dir.exists(),
            "intake directory does not exist: {}",
            self.entrada_dir.display()
        );

        let mut archivos: Vec<PathBuf> = fs::read_dir(&self.entrada_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            })
            .collect();
        archivos.sort();

        let mut summary = StageSummary::default();
        if archivos.is_empty() {
            tracing::info!("no PDF files to register");
            return Ok(summary);
        }

        for archivo in archivos {
            match self.register_file(&archivo) {
                Ok(inserted) => {
                    if inserted > 0 {
                        summary.one_ok();
                    } else {
                        summary.one_skipped();
                    }
                }
                Err(e) => {
                    summary.one_error();
                    tracing::error!("error registering {}: {:#}", archivo.display(), e);
                    if let Err(move_err) =
                        move_to_errores(&self.errores_dir, &archivo, &format!("{e:#}"))
                    {
                        tracing::error!("could not relocate failed artifact: {}", move_err);
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Register one source file. Returns how many page documents were
    /// inserted (0 when every page was a known duplicate).
    fn register_file(&self, archivo: &Path) -> anyhow::Result<u64> {
        let pages = self.inspector.inspect(archivo)?;
        anyhow::ensure!(!pages.is_empty(), "inspector produced no pages");
        let split = pages.len() > 1 || pages[0].path != archivo;

        let mut inserted = 0u64;
        for page in &pages {
            let contenido = fs::read(&page.path)?;
            let nombre_archivo = page
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let doc = NewDocument {
                nombre_archivo,
                archivo_padre: page.archivo_padre.clone(),
                hash_archivo: Document::compute_hash(&contenido),
                tamano_bytes: contenido.len() as i64,
                numero_paginas: page.numero_paginas,
                tipo_documento: page.tipo_documento,
                resolucion_ppi: page.resolucion_ppi,
                calidad_estimativa: Document::quality_band(page.resolucion_ppi),
            };

            if let Some(id) = self.repo.register(&doc)? {
                inserted += 1;
                tracing::info!("document registered: id={} file={}", id, doc.nombre_archivo);
            }
        }

        // After a split the multi-page source is parked; its pages carry on
        // through the pipeline.
        if split {
            fs::create_dir_all(&self.padres_dir)?;
            let destino = self.padres_dir.join(
                archivo
                    .file_name()
                    .ok_or_else(|| anyhow::anyhow!("source file has no name"))?,
            );
            fs::rename(archivo, &destino)?;
            tracing::info!("parent file parked: {}", destino.display());
        }

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentState;
    use crate::repository::ExtractionRepository;

    fn setup() -> (tempfile::TempDir, DocumentRepository) {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("consenso.db");
        ExtractionRepository::new(&db).unwrap();
        let repo = DocumentRepository::new(&db).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_register_intake_directory() {
        let (dir, repo) = setup();
        let entrada = dir.path().join("entrada");
        fs::create_dir_all(&entrada).unwrap();
        fs::write(entrada.join("f001.pdf"), b"uno").unwrap();
        fs::write(entrada.join("f002.pdf"), b"dos").unwrap();
        fs::write(entrada.join("notas.txt"), b"ignored").unwrap();

        let service = RegisterService::new(
            &repo,
            &BasicInspector,
            &entrada,
            &dir.path().join("errores"),
            &dir.path().join("padres"),
        );
        let summary = service.run().unwrap();
        assert_eq!(summary.ok, 2);
        assert_eq!(summary.errores, 0);

        let docs = repo.get_in_state(DocumentState::Registered, None).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].numero_paginas, 1);
    }

    #[test]
    fn test_rerun_skips_duplicates() {
        let (dir, repo) = setup();
        let entrada = dir.path().join("entrada");
        fs::create_dir_all(&entrada).unwrap();
        fs::write(entrada.join("f001.pdf"), b"uno").unwrap();

        let service = RegisterService::new(
            &repo,
            &BasicInspector,
            &entrada,
            &dir.path().join("errores"),
            &dir.path().join("padres"),
        );
        assert_eq!(service.run().unwrap().ok, 1);
        let again = service.run().unwrap();
        assert_eq!(again.ok, 0);
        assert_eq!(again.omitidos, 1);
        assert_eq!(
            repo.get_in_state(DocumentState::Registered, None).unwrap().len(),
            1
        );
    }

    struct FailingInspector;
    impl DocumentInspector for FailingInspector {
        fn inspect(&self, _path: &Path) -> anyhow::Result<Vec<PageArtifact>> {
            anyhow::bail!("corrupt xref table")
        }
    }

    #[test]
    fn test_failed_file_is_relocated_with_note() {
        let (dir, repo) = setup();
        let entrada = dir.path().join("entrada");
        let errores = dir.path().join("errores");
        fs::create_dir_all(&entrada).unwrap();
        fs::write(entrada.join("malo.pdf"), b"???").unwrap();

        let service = RegisterService::new(
            &repo,
            &FailingInspector,
            &entrada,
            &errores,
            &dir.path().join("padres"),
        );
        let summary = service.run().unwrap();
        assert_eq!(summary.errores, 1);
        assert!(errores.join("malo.pdf").exists());
        assert!(fs::read_to_string(errores.join("malo.log"))
            .unwrap()
            .contains("corrupt xref table"));
    }

    struct SplittingInspector {
        pages_dir: PathBuf,
    }
    impl DocumentInspector for SplittingInspector {
        fn inspect(&self, path: &Path) -> anyhow::Result<Vec<PageArtifact>> {
            let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
            let padre = path.file_name().unwrap().to_string_lossy().into_owned();
            fs::create_dir_all(&self.pages_dir)?;
            let mut pages = Vec::new();
            for i in 1..=2 {
                let page_path = self.pages_dir.join(format!("{stem}_{i}.pdf"));
                fs::write(&page_path, format!("pagina {i}"))?;
                pages.push(PageArtifact {
                    path: page_path,
                    archivo_padre: padre.clone(),
                    numero_paginas: 1,
                    tipo_documento: DocumentKind::Scanned,
                    resolucion_ppi: 300.0,
                });
            }
            Ok(pages)
        }
    }

    #[test]
    fn test_multi_page_split_parks_parent() {
        let (dir, repo) = setup();
        let entrada = dir.path().join("entrada");
        let padres = dir.path().join("padres");
        fs::create_dir_all(&entrada).unwrap();
        fs::write(entrada.join("lote.pdf"), b"dos paginas").unwrap();

        let inspector = SplittingInspector {
            pages_dir: entrada.clone(),
        };
        let service = RegisterService::new(
            &repo,
            &inspector,
            &entrada,
            &dir.path().join("errores"),
            &padres,
        );
        service.run().unwrap();

        let docs = repo.get_in_state(DocumentState::Registered, None).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.archivo_padre == "lote.pdf"));
        assert!(padres.join("lote.pdf").exists());
        assert!(!entrada.join("lote.pdf").exists());
    }
}
