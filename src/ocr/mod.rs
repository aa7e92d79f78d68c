//! Text-producer collaborators.
//!
//! OCR itself is outside this system's boundary: an engine is anything
//! that can turn a page artifact into text. The built-in implementation
//! shells out to a configured command line, so any engine with a CLI
//! (paddleocr, doctr, easyocr, tesseract, ...) plugs in without code
//! changes.

use std::path::Path;
use std::process::Command;

use thiserror::Error;

/// Errors from text engines.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine not available: {0}")]
    NotAvailable(String),

    #[error("extraction failed: {0}")]
    Failed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A text producer: one OCR engine identified by its `metodo`.
pub trait TextEngine: Send + Sync {
    /// Engine identifier stored with every row it produces.
    fn metodo(&self) -> &str;

    /// Produce the full text for one page artifact.
    fn extract_text(&self, path: &Path) -> Result<String, EngineError>;
}

/// Placeholder in command arguments replaced by the artifact path.
pub const FILE_PLACEHOLDER: &str = "{file}";

/// Engine that runs an external command and captures its stdout.
pub struct CommandEngine {
    metodo: String,
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(metodo: &str, program: &str, args: Vec<String>) -> Self {
        Self {
            metodo: metodo.to_string(),
            program: program.to_string(),
            args,
        }
    }
}

impl TextEngine for CommandEngine {
    fn metodo(&self) -> &str {
        &self.metodo
    }

    fn extract_text(&self, path: &Path) -> Result<String, EngineError> {
        let file = path.display().to_string();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(FILE_PLACEHOLDER, &file))
            .collect();

        let output = Command::new(&self.program).args(&args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::NotAvailable(format!("{}: {}", self.program, e))
            } else {
                EngineError::Io(e)
            }
        })?;

        if !output.status.success() {
            return Err(EngineError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
