//! Configuration for the consensus pipeline.
//!
//! Configuration is materialized once at process start into a [`Settings`]
//! value and passed explicitly to every service; there is no ambient
//! global state. File formats follow the file extension (TOML, YAML or
//! JSON).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "consenso.db";

/// Default engine identifiers, one per OCR pass.
pub fn default_engines() -> Vec<String> {
    ["paddleocr", "doctr", "easyocr", "tesseract_psm4", "tesseract_psm6"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Default engine-priority order for consolidation tie-breaks. Engines not
/// listed here rank last.
pub fn default_engine_priority() -> Vec<String> {
    ["paddleocr", "doctr", "easyocr"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_primary_engine() -> String {
    "paddleocr".to_string()
}

fn default_primary_engine_bonus() -> f64 {
    0.20
}

/// External command line for a collaborator (engine or extractor).
/// `{file}` in an argument is replaced by the artifact path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Application settings, resolved from config file, environment and flags.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside `data_dir`.
    pub database_filename: String,
    /// Incoming PDFs land here before registration.
    pub entrada_dir: PathBuf,
    /// Artifacts that failed a stage, with sidecar diagnostic notes.
    pub errores_dir: PathBuf,
    /// Multi-page source files after splitting.
    pub padres_dir: PathBuf,
    /// Delivery output directory.
    pub salida_dir: PathBuf,
    /// Engine identifiers the text stage expects to run.
    pub engines: Vec<String>,
    /// Consolidation tie-break order.
    pub engine_priority: Vec<String>,
    /// Engine whose `tipo_doc` readings get the scoring prior.
    pub primary_engine: String,
    /// Magnitude of that prior.
    pub primary_engine_bonus: f64,
    /// Optional brand dictionary CSV.
    pub marcas_csv: Option<PathBuf>,
    /// Command line per engine identifier; engines without one are skipped.
    pub engine_commands: HashMap<String, CommandSpec>,
    /// Command producing `campo -> valor` JSON from text on stdin.
    pub extractor_command: Option<CommandSpec>,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back gracefully: Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("consenso");

        Self {
            entrada_dir: data_dir.join("entrada"),
            errores_dir: data_dir.join("errores"),
            padres_dir: data_dir.join("archivos_padres"),
            salida_dir: data_dir.join("salida"),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            engines: default_engines(),
            engine_priority: default_engine_priority(),
            primary_engine: default_primary_engine(),
            primary_engine_bonus: default_primary_engine_bonus(),
            marcas_csv: None,
            engine_commands: HashMap::new(),
            extractor_command: None,
        }
    }
}

impl Settings {
    /// Full path to the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Check if the database appears to be initialized.
    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Ensure all working directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            &self.data_dir,
            &self.entrada_dir,
            &self.errores_dir,
            &self.padres_dir,
            &self.salida_dir,
        ] {
            fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("failed to create directory '{}': {}", dir.display(), e),
                )
            })?;
        }
        Ok(())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Incoming-files directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrada_dir: Option<String>,
    /// Error-artifact directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errores_dir: Option<String>,
    /// Split multi-page source directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padres_dir: Option<String>,
    /// Delivery output directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salida_dir: Option<String>,
    /// Engine identifiers to run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub engines: Vec<String>,
    /// Consolidation tie-break order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub engine_priority: Vec<String>,
    /// Engine carrying the `tipo_doc` scoring prior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_engine: Option<String>,
    /// Magnitude of the prior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_engine_bonus: Option<f64>,
    /// Brand dictionary CSV path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marcas_csv: Option<String>,
    /// Command line per engine identifier.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub engine_commands: HashMap<String, CommandSpec>,
    /// Field-extractor command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor_command: Option<CommandSpec>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a specific file path. The format follows
    /// the file extension (TOML, YAML, JSON).
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
        let mut config: Config = match ext {
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).context("failed to parse YAML config")?
            }
            "json" => serde_json::from_str(&contents).context("failed to parse JSON config")?,
            _ => toml::from_str(&contents).context("failed to parse TOML config")?,
        };
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings. `base_dir` resolves relative paths
    /// (config file dir or CWD).
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
            settings.entrada_dir = settings.data_dir.join("entrada");
            settings.errores_dir = settings.data_dir.join("errores");
            settings.padres_dir = settings.data_dir.join("archivos_padres");
            settings.salida_dir = settings.data_dir.join("salida");
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref dir) = self.entrada_dir {
            settings.entrada_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref dir) = self.errores_dir {
            settings.errores_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref dir) = self.padres_dir {
            settings.padres_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref dir) = self.salida_dir {
            settings.salida_dir = self.resolve_path(dir, base_dir);
        }
        if !self.engines.is_empty() {
            settings.engines = self.engines.clone();
        }
        if !self.engine_priority.is_empty() {
            settings.engine_priority = self.engine_priority.clone();
        }
        if let Some(ref engine) = self.primary_engine {
            settings.primary_engine = engine.clone();
        }
        if let Some(bonus) = self.primary_engine_bonus {
            settings.primary_engine_bonus = bonus;
        }
        if let Some(ref csv) = self.marcas_csv {
            settings.marcas_csv = Some(self.resolve_path(csv, base_dir));
        }
        if !self.engine_commands.is_empty() {
            settings.engine_commands = self.engine_commands.clone();
        }
        if let Some(ref spec) = self.extractor_command {
            settings.extractor_command = Some(spec.clone());
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data directory override (--data flag).
    pub data: Option<PathBuf>,
}

/// Look for a config file next to the data directory.
fn find_config_next_to_data(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["toml", "yaml", "yml", "json"];
    let basenames = ["consenso", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

/// Load settings with explicit options. An explicit `--config` path that
/// does not load is fatal; auto-discovery finding nothing falls back to
/// defaults.
pub fn load_settings_with_options(options: LoadOptions) -> anyhow::Result<(Settings, Config)> {
    let data_dir_override = options.data.as_ref().map(|d| {
        if d.is_absolute() {
            d.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(d)
        }
    });

    let config = if let Some(ref config_path) = options.config_path {
        Config::load_from_path(config_path)?
    } else if let Some(path) = data_dir_override
        .as_ref()
        .and_then(|dir| find_config_next_to_data(dir))
    {
        tracing::debug!("found config next to data dir: {}", path.display());
        Config::load_from_path(&path).unwrap_or_default()
    } else {
        Config::default()
    };

    let mut settings = Settings::default();

    let base_dir = if options.use_cwd {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        config
            .base_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    };
    config.apply_to_settings(&mut settings, &base_dir);

    // --data override takes precedence for every derived directory.
    if let Some(data_dir) = data_dir_override {
        settings.entrada_dir = data_dir.join("entrada");
        settings.errores_dir = data_dir.join("errores");
        settings.padres_dir = data_dir.join("archivos_padres");
        settings.salida_dir = data_dir.join("salida");
        settings.data_dir = data_dir;
    }

    // CONSENSO_DB environment variable takes highest precedence.
    if let Some(db) = std::env::var("CONSENSO_DB").ok().filter(|s| !s.is_empty()) {
        tracing::debug!("using CONSENSO_DB from environment: {}", db);
        let path = PathBuf::from(db);
        if let Some(parent) = path.parent() {
            if parent.as_os_str().is_empty() {
                settings.database_filename = path.display().to_string();
            } else {
                settings.data_dir = parent.to_path_buf();
                settings.database_filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| DEFAULT_DATABASE_FILENAME.to_string());
            }
        }
    }

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.database_filename, DEFAULT_DATABASE_FILENAME);
        assert_eq!(settings.primary_engine, "paddleocr");
        assert!((settings.primary_engine_bonus - 0.20).abs() < 1e-9);
        assert_eq!(settings.engine_priority[0], "paddleocr");
    }

    #[test]
    fn test_toml_config_applies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consenso.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "data_dir = \"{}\"", dir.path().display()).unwrap();
        writeln!(f, "primary_engine = \"doctr\"").unwrap();
        writeln!(f, "primary_engine_bonus = 0.10").unwrap();
        writeln!(f, "engine_priority = [\"doctr\", \"paddleocr\"]").unwrap();
        drop(f);

        let config = Config::load_from_path(&path).unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());

        assert_eq!(settings.data_dir, dir.path());
        assert_eq!(settings.primary_engine, "doctr");
        assert!((settings.primary_engine_bonus - 0.10).abs() < 1e-9);
        assert_eq!(settings.engine_priority, vec!["doctr", "paddleocr"]);
        assert_eq!(settings.errores_dir, dir.path().join("errores"));
    }

    #[test]
    fn test_explicit_config_path_failure_is_fatal() {
        let options = LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/consenso.toml")),
            ..Default::default()
        };
        assert!(load_settings_with_options(options).is_err());
    }
}
