//! End-to-end pipeline flow over a temporary store.
//!
//! Exercises the full lifecycle with stub collaborators: three engines
//! disagreeing on a brand, consensus scoring, consolidation with the
//! engine-priority tie-break, and delivery.

use std::fs;
use std::path::Path;

use consenso::config::default_engine_priority;
use consenso::delivery::JsonExporter;
use consenso::extractor::FieldExtractor;
use consenso::models::DocumentState;
use consenso::ocr::{EngineError, TextEngine};
use consenso::repository::{ConsolidatedRepository, DocumentRepository, ExtractionRepository};
use consenso::services::{
    BasicInspector, ConsensusService, ConsolidateService, DeliverService, FieldService,
    RegisterService, TextService,
};

/// Engine that always produces the same text.
struct FixedEngine {
    metodo: &'static str,
    texto: &'static str,
}

impl TextEngine for FixedEngine {
    fn metodo(&self) -> &str {
        self.metodo
    }
    fn extract_text(&self, _path: &Path) -> Result<String, EngineError> {
        Ok(self.texto.to_string())
    }
}

/// Extractor that reads `campo:valor` lines.
struct LineExtractor;

impl FieldExtractor for LineExtractor {
    fn extract(&self, texto: &str) -> anyhow::Result<Vec<(String, String)>> {
        Ok(texto
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(campo, valor)| (campo.trim().to_string(), valor.trim().to_string()))
            .collect())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    doc_repo: DocumentRepository,
    ext_repo: ExtractionRepository,
    cons_repo: ConsolidatedRepository,
    entrada: std::path::PathBuf,
    errores: std::path::PathBuf,
    padres: std::path::PathBuf,
    salida: std::path::PathBuf,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("consenso.db");
    let doc_repo = DocumentRepository::new(&db).unwrap();
    let ext_repo = ExtractionRepository::new(&db).unwrap();
    let cons_repo = ConsolidatedRepository::new(&db).unwrap();
    let entrada = dir.path().join("entrada");
    fs::create_dir_all(&entrada).unwrap();
    Harness {
        entrada,
        errores: dir.path().join("errores"),
        padres: dir.path().join("archivos_padres"),
        salida: dir.path().join("salida"),
        doc_repo,
        ext_repo,
        cons_repo,
        _dir: dir,
    }
}

fn disagreeing_engines() -> Vec<Box<dyn TextEngine>> {
    vec![
        Box::new(FixedEngine {
            metodo: "paddleocr",
            texto: "marca: TOYOTA\nanio: 2021",
        }),
        Box::new(FixedEngine {
            metodo: "doctr",
            texto: "marca: T0YOTA\nanio: 2021",
        }),
        Box::new(FixedEngine {
            metodo: "easyocr",
            texto: "marca: TOYOTA\nanio: 2021",
        }),
    ]
}

#[test]
fn two_engines_agreeing_beat_the_third() {
    let h = harness();
    fs::write(h.entrada.join("factura_42.pdf"), b"scanned bytes").unwrap();

    // Stage 1: register.
    RegisterService::new(&h.doc_repo, &BasicInspector, &h.entrada, &h.errores, &h.padres)
        .run()
        .unwrap();
    let docs = h.doc_repo.get_in_state(DocumentState::Registered, None).unwrap();
    assert_eq!(docs.len(), 1);
    let id = docs[0].id;

    // Stage 2: all three engines extract text.
    let engines = disagreeing_engines();
    TextService::new(&h.doc_repo, &h.ext_repo, &engines, &h.entrada, &h.errores)
        .run(None)
        .unwrap();
    assert_eq!(h.ext_repo.texts_for_document(id).unwrap().len(), 3);

    // Stage 3: parse candidates.
    FieldService::new(&h.doc_repo, &h.ext_repo, &LineExtractor, &h.entrada, &h.errores)
        .run(None, false)
        .unwrap();
    assert_eq!(h.ext_repo.candidates(id, "marca").unwrap().len(), 3);

    // Stage 4: consensus scoring.
    ConsensusService::new(&h.doc_repo, &h.ext_repo)
        .run(None, false)
        .unwrap();
    let marcas = h.ext_repo.candidates(id, "marca").unwrap();
    for row in &marcas {
        let expected = if row.metodo == "doctr" { 0.3 } else { 1.0 };
        assert_eq!(row.score, Some(expected), "engine {}", row.metodo);
    }
    assert_eq!(
        h.doc_repo.get(id).unwrap().unwrap().estado,
        DocumentState::Evaluated
    );

    // Stage 5: consolidation. paddleocr and easyocr tie at 1.0; priority
    // order decides.
    let priority = default_engine_priority();
    ConsolidateService::new(&h.doc_repo, &h.ext_repo, &h.cons_repo, &priority)
        .run(None, None)
        .unwrap();
    let rows = h.cons_repo.for_document(id).unwrap();
    let marca = rows.iter().find(|r| r.campo == "marca").unwrap();
    assert_eq!(marca.valor, "TOYOTA");
    assert_eq!(marca.metodo, "paddleocr");
    assert_eq!(
        h.doc_repo.get(id).unwrap().unwrap().estado,
        DocumentState::Consolidated
    );

    // Stage 6: delivery.
    let exporter = JsonExporter::new(h.salida.clone());
    DeliverService::new(&h.doc_repo, &h.cons_repo, &exporter)
        .run(None)
        .unwrap();
    assert_eq!(
        h.doc_repo.get(id).unwrap().unwrap().estado,
        DocumentState::Delivered
    );
    let export = fs::read_to_string(h.salida.join(format!("documento_{id}.json"))).unwrap();
    assert!(export.contains("\"valor\": \"TOYOTA\""));
}

#[test]
fn rerunning_every_stage_changes_nothing() {
    let h = harness();
    fs::write(h.entrada.join("factura_7.pdf"), b"bytes").unwrap();

    let engines = disagreeing_engines();
    let priority = default_engine_priority();

    let register =
        RegisterService::new(&h.doc_repo, &BasicInspector, &h.entrada, &h.errores, &h.padres);
    let text = TextService::new(&h.doc_repo, &h.ext_repo, &engines, &h.entrada, &h.errores);
    let fields = FieldService::new(&h.doc_repo, &h.ext_repo, &LineExtractor, &h.entrada, &h.errores);
    let consensus = ConsensusService::new(&h.doc_repo, &h.ext_repo);
    let consolidate =
        ConsolidateService::new(&h.doc_repo, &h.ext_repo, &h.cons_repo, &priority);

    register.run().unwrap();
    text.run(None).unwrap();
    fields.run(None, false).unwrap();
    consensus.run(None, false).unwrap();
    consolidate.run(None, None).unwrap();

    let id = h.doc_repo.get_in_state(DocumentState::Consolidated, None).unwrap()[0].id;
    let scores_before: Vec<_> = h
        .ext_repo
        .candidates(id, "marca")
        .unwrap()
        .iter()
        .map(|c| (c.metodo.clone(), c.score))
        .collect();
    let consolidated_before = h.cons_repo.for_document(id).unwrap();

    // A second full pass over the same backlog is a no-op: every stage
    // either finds nothing eligible or rewrites identical rows.
    register.run().unwrap();
    text.run(None).unwrap();
    fields.run(None, false).unwrap();
    consensus.run(None, false).unwrap();
    consolidate.run(None, None).unwrap();

    let doc = h.doc_repo.get(id).unwrap().unwrap();
    assert_eq!(doc.estado, DocumentState::Consolidated);
    assert_eq!(doc.generacion, 0);
    let scores_after: Vec<_> = h
        .ext_repo
        .candidates(id, "marca")
        .unwrap()
        .iter()
        .map(|c| (c.metodo.clone(), c.score))
        .collect();
    assert_eq!(scores_before, scores_after);
    let consolidated_after = h.cons_repo.for_document(id).unwrap();
    assert_eq!(consolidated_before.len(), consolidated_after.len());
    assert_eq!(consolidated_before[0].valor, consolidated_after[0].valor);
}

#[test]
fn forced_reprocess_is_the_only_way_back() {
    let h = harness();
    fs::write(h.entrada.join("factura_9.pdf"), b"bytes").unwrap();

    let engines = disagreeing_engines();
    RegisterService::new(&h.doc_repo, &BasicInspector, &h.entrada, &h.errores, &h.padres)
        .run()
        .unwrap();
    TextService::new(&h.doc_repo, &h.ext_repo, &engines, &h.entrada, &h.errores)
        .run(None)
        .unwrap();
    FieldService::new(&h.doc_repo, &h.ext_repo, &LineExtractor, &h.entrada, &h.errores)
        .run(None, false)
        .unwrap();
    ConsensusService::new(&h.doc_repo, &h.ext_repo)
        .run(None, false)
        .unwrap();

    let id = h.doc_repo.get_in_state(DocumentState::Evaluated, None).unwrap()[0].id;

    // No stage can regress an evaluated document.
    assert!(!h
        .doc_repo
        .try_advance(id, DocumentState::Evaluated, DocumentState::FieldsExtracted)
        .unwrap());

    // Forced re-parse supersedes candidates and replays the stage.
    let fields = FieldService::new(&h.doc_repo, &h.ext_repo, &LineExtractor, &h.entrada, &h.errores);
    fields.run(Some(id), true).unwrap();
    let marcas = h.ext_repo.candidates(id, "marca").unwrap();
    assert_eq!(marcas.len(), 3);
    assert!(marcas.iter().all(|c| c.generacion == 1));
    assert!(marcas.iter().all(|c| c.score.is_none()));
}
