use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

/// Turns a staged audio file into a result string.
///
/// Implementations only ever see fully written, validated files.
#[async_trait::async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, path: &Path, media_type: &str) -> Result<String>;

    /// Check if the translator is available/healthy
    async fn health_check(&self) -> bool;
}

/// Fixed-reply translator used until a real model is wired in
pub struct PlaceholderTranslator;

#[async_trait::async_trait]
impl Translator for PlaceholderTranslator {
    async fn translate(&self, _path: &Path, media_type: &str) -> Result<String> {
        Ok(format!(
            "Meow! (Placeholder translation for {} audio)",
            media_type
        ))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Runs an external program with the staged path as its last argument.
/// Trimmed stdout is the translation.
///
/// The media type is passed through `BARKBACK_MEDIA_TYPE`.
pub struct CommandTranslator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTranslator {
    pub fn new(program: String, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }

    /// Splits a whitespace separated command line. Returns `None` when it is empty.
    pub fn from_command_line(line: &str, timeout: Duration) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect(), timeout))
    }

    fn resolve_program(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file().then(|| program.to_path_buf());
        }
        std::env::var_os("PATH").and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(&self.program))
                .find(|candidate| candidate.is_file())
        })
    }
}

#[async_trait::async_trait]
impl Translator for CommandTranslator {
    async fn translate(&self, path: &Path, media_type: &str) -> Result<String> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .arg(path)
            .env("BARKBACK_MEDIA_TYPE", media_type)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow!("Translator timed out after {:?}", self.timeout))?
            .map_err(|e| anyhow!("Failed to run translator '{}': {}", self.program, e))?;

        if !output.status.success() {
            // stderr may mention server paths, keep it in the logs only
            tracing::warn!(
                program = %self.program,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Translator command failed"
            );
            return Err(anyhow!("Translator exited with {}", output.status));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn health_check(&self) -> bool {
        self.resolve_program().is_some()
    }
}

/// Factory function to create the appropriate translator based on config
pub fn create_translator(
    translator_type: &str,
    command: Option<&str>,
    timeout: Duration,
) -> Box<dyn Translator> {
    match translator_type.to_lowercase().as_str() {
        "placeholder" | "noop" | "none" => Box::new(PlaceholderTranslator),
        "command" => match command.and_then(|c| CommandTranslator::from_command_line(c, timeout)) {
            Some(translator) => Box::new(translator),
            None => {
                tracing::warn!(
                    "Command translator selected but TRANSLATOR_COMMAND is empty, using placeholder"
                );
                Box::new(PlaceholderTranslator)
            }
        },
        _ => {
            tracing::warn!(
                "Unknown translator type '{}', using PlaceholderTranslator",
                translator_type
            );
            Box::new(PlaceholderTranslator)
        }
    }
}
