//! Field-extractor collaborator.
//!
//! The extraction grammar (regex/heuristics per field) lives outside this
//! system. An extractor receives one engine's full text and returns raw
//! `(campo, valor)` candidates; values may be empty when a field was
//! looked for but not found.

use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::Context;

/// Produces raw field candidates from one engine's text output.
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, texto: &str) -> anyhow::Result<Vec<(String, String)>>;
}

/// Extractor that pipes the text to an external command and reads a JSON
/// object of `campo -> valor` from its stdout.
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
}

impl CommandExtractor {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }
}

impl FieldExtractor for CommandExtractor {
    fn extract(&self, texto: &str) -> anyhow::Result<Vec<(String, String)>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn extractor '{}'", self.program))?;

        child
            .stdin
            .take()
            .context("extractor stdin unavailable")?
            .write_all(texto.as_bytes())
            .context("failed to write text to extractor")?;

        let output = child
            .wait_with_output()
            .context("failed to wait for extractor")?;
        anyhow::ensure!(
            output.status.success(),
            "extractor '{}' exited with {}: {}",
            self.program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );

        let parsed: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&output.stdout).context("extractor produced invalid JSON")?;

        Ok(parsed
            .into_iter()
            .map(|(campo, valor)| {
                let valor = match valor {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                (campo, valor)
            })
            .collect())
    }
}
