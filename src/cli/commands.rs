//! Command implementations.

use std::time::{Duration, Instant};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Settings;
use crate::delivery::JsonExporter;
use crate::extractor::{CommandExtractor, FieldExtractor};
use crate::models::{DocumentState, ESTADO_ERROR};
use crate::ocr::{CommandEngine, TextEngine};
use crate::repository::{ConsolidatedRepository, DocumentRepository, ExtractionRepository};
use crate::scoring::{FieldScorer, ReferenceLists};
use crate::services::{
    BasicInspector, ConsensusService, ConsolidateService, DeliverService, FieldService,
    RegisterService, ScoreService, StageSummary, TextService,
};

use super::ReprocessStage;

/// Spinner shown while a stage crunches through its batch.
fn stage_spinner(stage: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(stage.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn print_summary(stage: &str, summary: &StageSummary) {
    let marker = if summary.errores > 0 {
        style("!").yellow()
    } else {
        style("✓").green()
    };
    println!("{} {}: {}", marker, stage, summary);
}

fn require_database(settings: &Settings) -> anyhow::Result<()> {
    anyhow::ensure!(
        settings.database_exists(),
        "database not initialized at {} (run `consenso init` first)",
        settings.database_path().display()
    );
    Ok(())
}

/// Engines that have a configured command, in configuration order.
fn build_engines(settings: &Settings) -> anyhow::Result<Vec<Box<dyn TextEngine>>> {
    let mut engines: Vec<Box<dyn TextEngine>> = Vec::new();
    for metodo in &settings.engines {
        match settings.engine_commands.get(metodo) {
            Some(spec) => engines.push(Box::new(CommandEngine::new(
                metodo,
                &spec.command,
                spec.args.clone(),
            ))),
            None => tracing::warn!("engine '{}' has no configured command; skipping", metodo),
        }
    }
    anyhow::ensure!(
        !engines.is_empty(),
        "no engine commands configured (set [engine_commands] in the config file)"
    );
    Ok(engines)
}

fn build_extractor(settings: &Settings) -> anyhow::Result<Box<dyn FieldExtractor>> {
    let spec = settings
        .extractor_command
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no extractor command configured"))?;
    Ok(Box::new(CommandExtractor::new(
        &spec.command,
        spec.args.clone(),
    )))
}

fn build_scorer(settings: &Settings) -> anyhow::Result<FieldScorer> {
    let lists = match &settings.marcas_csv {
        Some(path) => ReferenceLists::with_marcas_csv(path)?,
        None => ReferenceLists::default(),
    };
    Ok(FieldScorer::new(
        lists,
        &settings.primary_engine,
        settings.primary_engine_bonus,
    ))
}

/// Initialize the data directory and database schema.
pub fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let db = settings.database_path();
    DocumentRepository::new(&db)?;
    ExtractionRepository::new(&db)?;
    ConsolidatedRepository::new(&db)?;
    println!(
        "{} initialized data directory at {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    Ok(())
}

pub fn cmd_register(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let doc_repo = DocumentRepository::new(&settings.database_path())?;
    let service = RegisterService::new(
        &doc_repo,
        &BasicInspector,
        &settings.entrada_dir,
        &settings.errores_dir,
        &settings.padres_dir,
    );
    let pb = stage_spinner("registering intake files");
    let summary = service.run()?;
    pb.finish_and_clear();
    print_summary("register", &summary);
    Ok(())
}

pub fn cmd_extract_text(settings: &Settings, id: Option<i64>) -> anyhow::Result<()> {
    require_database(settings)?;
    let engines = build_engines(settings)?;
    let doc_repo = DocumentRepository::new(&settings.database_path())?;
    let ext_repo = ExtractionRepository::new(&settings.database_path())?;
    let service = TextService::new(
        &doc_repo,
        &ext_repo,
        &engines,
        &settings.entrada_dir,
        &settings.errores_dir,
    );
    let pb = stage_spinner("extracting text");
    let summary = service.run(id)?;
    pb.finish_and_clear();
    print_summary("extract-text", &summary);
    Ok(())
}

pub fn cmd_parse_fields(settings: &Settings, id: Option<i64>, forzar: bool) -> anyhow::Result<()> {
    require_database(settings)?;
    let extractor = build_extractor(settings)?;
    let doc_repo = DocumentRepository::new(&settings.database_path())?;
    let ext_repo = ExtractionRepository::new(&settings.database_path())?;
    let service = FieldService::new(
        &doc_repo,
        &ext_repo,
        extractor.as_ref(),
        &settings.entrada_dir,
        &settings.errores_dir,
    );
    let pb = stage_spinner("parsing fields");
    let summary = service.run(id, forzar)?;
    pb.finish_and_clear();
    print_summary("parse-fields", &summary);
    Ok(())
}

pub fn cmd_score(settings: &Settings, id: Option<i64>) -> anyhow::Result<()> {
    require_database(settings)?;
    let scorer = build_scorer(settings)?;
    let doc_repo = DocumentRepository::new(&settings.database_path())?;
    let ext_repo = ExtractionRepository::new(&settings.database_path())?;
    let service = ScoreService::new(&doc_repo, &ext_repo, &scorer);
    let pb = stage_spinner("scoring candidates");
    let summary = service.run(id)?;
    pb.finish_and_clear();
    print_summary("score", &summary);
    Ok(())
}

pub fn cmd_consensus(settings: &Settings, id: Option<i64>, debug: bool) -> anyhow::Result<()> {
    require_database(settings)?;
    let doc_repo = DocumentRepository::new(&settings.database_path())?;
    let ext_repo = ExtractionRepository::new(&settings.database_path())?;
    let service = ConsensusService::new(&doc_repo, &ext_repo);
    let summary = service.run(id, debug)?;
    print_summary("consensus", &summary);
    Ok(())
}

pub fn cmd_consolidate(
    settings: &Settings,
    forzar_id: Option<i64>,
    solo_campo: Option<&str>,
) -> anyhow::Result<()> {
    require_database(settings)?;
    let doc_repo = DocumentRepository::new(&settings.database_path())?;
    let ext_repo = ExtractionRepository::new(&settings.database_path())?;
    let cons_repo = ConsolidatedRepository::new(&settings.database_path())?;
    let service = ConsolidateService::new(
        &doc_repo,
        &ext_repo,
        &cons_repo,
        &settings.engine_priority,
    );
    let pb = stage_spinner("consolidating fields");
    let summary = service.run(forzar_id, solo_campo)?;
    pb.finish_and_clear();
    print_summary("consolidate", &summary);
    Ok(())
}

pub fn cmd_deliver(settings: &Settings, id: Option<i64>) -> anyhow::Result<()> {
    require_database(settings)?;
    let doc_repo = DocumentRepository::new(&settings.database_path())?;
    let cons_repo = ConsolidatedRepository::new(&settings.database_path())?;
    let exporter = JsonExporter::new(settings.salida_dir.clone());
    let service = DeliverService::new(&doc_repo, &cons_repo, &exporter);
    let pb = stage_spinner("delivering consolidated documents");
    let summary = service.run(id)?;
    pb.finish_and_clear();
    print_summary("deliver", &summary);
    Ok(())
}

pub fn cmd_reprocess(settings: &Settings, id: i64, desde: ReprocessStage) -> anyhow::Result<()> {
    require_database(settings)?;
    let doc_repo = DocumentRepository::new(&settings.database_path())?;
    // Extraction tables must exist for the tombstoning pass.
    ExtractionRepository::new(&settings.database_path())?;

    let back_to = match desde {
        ReprocessStage::Text => DocumentState::Registered,
        ReprocessStage::Fields => DocumentState::TextExtracted,
    };
    let generacion = doc_repo.force_reprocess(id, back_to)?;
    println!(
        "{} document {} reset to {} (generation {})",
        style("✓").green(),
        id,
        back_to.as_str(),
        generacion
    );
    Ok(())
}

pub fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    require_database(settings)?;
    let doc_repo = DocumentRepository::new(&settings.database_path())?;
    let counts = doc_repo.counts_by_state()?;

    println!("{}", style("Pipeline Status").bold());
    println!("{}", "-".repeat(40));
    for state in [
        DocumentState::Registered,
        DocumentState::TextExtracted,
        DocumentState::FieldsExtracted,
        DocumentState::Evaluated,
        DocumentState::Consolidated,
        DocumentState::Delivered,
    ] {
        let count = counts.by_state.get(&state.code()).copied().unwrap_or(0);
        println!("{:<20} {}", format!("{}:", state.as_str()), count);
    }
    let errors = counts.by_state.get(&ESTADO_ERROR).copied().unwrap_or(0);
    let errors_str = if errors > 0 {
        style(errors.to_string()).red().to_string()
    } else {
        errors.to_string()
    };
    println!("{:<20} {}", "error:", errors_str);
    println!("{:<20} {}", "total:", counts.total());
    Ok(())
}

/// Run every stage once, in pipeline order, stopping on the first stage
/// that cannot run at all. Per-document failures never stop the pipeline.
pub fn cmd_pipeline(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let inicio = Instant::now();
    let mut timings: Vec<(&str, Duration)> = Vec::new();

    let stages: Vec<(&str, Box<dyn Fn() -> anyhow::Result<()> + '_>)> = vec![
        ("register", Box::new(|| cmd_register(settings))),
        ("extract-text", Box::new(|| cmd_extract_text(settings, None))),
        (
            "parse-fields",
            Box::new(|| cmd_parse_fields(settings, None, false)),
        ),
        ("score", Box::new(|| cmd_score(settings, None))),
        (
            "consolidate",
            Box::new(|| cmd_consolidate(settings, None, None)),
        ),
        ("deliver", Box::new(|| cmd_deliver(settings, None))),
    ];

    for (name, stage) in stages {
        let t0 = Instant::now();
        if let Err(e) = stage() {
            println!("{} pipeline stopped at {}: {:#}", style("✗").red(), name, e);
            return Err(e);
        }
        timings.push((name, t0.elapsed()));
    }

    println!();
    for (name, elapsed) in &timings {
        println!("  {:<14} {:.2?}", name, elapsed);
    }
    println!(
        "{} pipeline completed in {:.2?}",
        style("✓").green(),
        inicio.elapsed()
    );
    Ok(())
}
