//! # Conversion Engine Contract
//!
//! The PDF → DOCX transformation is performed by an opaque external engine.
//! This module fixes the contract the pipeline relies on:
//!
//! 1. [`ConversionEngine::open`] binds a converter to a source file.
//! 2. [`Converter::convert`] writes a DOCX to the output path or fails.
//! 3. [`Converter::close`] releases the converter's resources.
//!
//! [`EngineSession`] owns an open converter and guarantees step 3 runs
//! exactly once on every exit path, including panics mid-conversion.
//!
//! [`CommandEngine`] is the production engine: it shells out to a converter
//! program (by default `pdf2docx convert {input} {output}`).

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// Failure reported by a conversion engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine could not be started at all.
    #[error("conversion engine unavailable: {0}")]
    Unavailable(String),

    /// The engine rejected the input or failed while converting.
    #[error("{0}")]
    Failed(String),
}

/// Factory for converters bound to a single source document.
pub trait ConversionEngine: Send + Sync {
    /// Open a converter for the document at `source`.
    fn open(&self, source: &Path) -> Result<Box<dyn Converter>, EngineError>;
}

/// A converter bound to one source document.
pub trait Converter: Send {
    /// Convert the bound source into a DOCX at `output`.
    fn convert(&mut self, output: &Path) -> Result<(), EngineError>;

    /// Release all resources held by the converter.
    fn close(&mut self) -> Result<(), EngineError>;
}

/// Scoped ownership of an open converter; closes it when dropped.
pub struct EngineSession {
    converter: Option<Box<dyn Converter>>,
}

impl EngineSession {
    /// Open a converter for `source` through `engine`.
    pub fn open(engine: &dyn ConversionEngine, source: &Path) -> Result<Self, EngineError> {
        Ok(Self {
            converter: Some(engine.open(source)?),
        })
    }

    /// Run the conversion into `output`.
    pub fn convert(&mut self, output: &Path) -> Result<(), EngineError> {
        match self.converter.as_mut() {
            Some(converter) => converter.convert(output),
            None => Err(EngineError::Failed("converter already released".to_string())),
        }
    }
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("open", &self.converter.is_some())
            .finish()
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if let Some(mut converter) = self.converter.take() {
            if let Err(e) = converter.close() {
                tracing::warn!(error = %e, "failed to close converter");
            }
        }
    }
}

/// Program and argument template for [`CommandEngine`].
///
/// Arguments may contain the placeholders `{input}` and `{output}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterCommand {
    /// Executable name or path.
    pub program: String,
    /// Argument template.
    pub args: Vec<String>,
}

impl ConverterCommand {
    /// Build a command from a program and a whitespace-separated argument template.
    pub fn parse(program: &str, args: &str) -> Self {
        Self {
            program: program.to_string(),
            args: args.split_whitespace().map(str::to_string).collect(),
        }
    }

    fn render_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

impl Default for ConverterCommand {
    fn default() -> Self {
        Self::parse("pdf2docx", "convert {input} {output}")
    }
}

/// Engine that runs an external converter program per document.
#[derive(Debug, Clone, Default)]
pub struct CommandEngine {
    command: ConverterCommand,
}

impl CommandEngine {
    /// Create an engine running `command`.
    pub fn new(command: ConverterCommand) -> Self {
        Self { command }
    }
}

impl ConversionEngine for CommandEngine {
    fn open(&self, source: &Path) -> Result<Box<dyn Converter>, EngineError> {
        if !source.is_file() {
            return Err(EngineError::Failed("source document is missing".to_string()));
        }
        Ok(Box::new(CommandConverter {
            command: self.command.clone(),
            source: source.to_path_buf(),
        }))
    }
}

struct CommandConverter {
    command: ConverterCommand,
    source: PathBuf,
}

impl Converter for CommandConverter {
    fn convert(&mut self, output: &Path) -> Result<(), EngineError> {
        let args = self.command.render_args(&self.source, output);
        let result = Command::new(&self.command.program)
            .args(&args)
            .output()
            .map_err(|e| EngineError::Unavailable(format!("{}: {e}", self.command.program)))?;

        if result.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&result.stderr);
        let cause = stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("converter exited with {}", result.status));
        Err(EngineError::Failed(cause))
    }

    fn close(&mut self) -> Result<(), EngineError> {
        // The child process has already been reaped by `output()`.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEngine {
        closed: Arc<AtomicUsize>,
        fail: bool,
    }

    struct CountingConverter {
        closed: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ConversionEngine for CountingEngine {
        fn open(&self, _source: &Path) -> Result<Box<dyn Converter>, EngineError> {
            Ok(Box::new(CountingConverter {
                closed: Arc::clone(&self.closed),
                fail: self.fail,
            }))
        }
    }

    impl Converter for CountingConverter {
        fn convert(&mut self, _output: &Path) -> Result<(), EngineError> {
            if self.fail {
                Err(EngineError::Failed("corrupt xref table".to_string()))
            } else {
                Ok(())
            }
        }

        fn close(&mut self) -> Result<(), EngineError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Failed("close noise".to_string()))
        }
    }

    #[test]
    fn session_closes_after_success() {
        let closed = Arc::new(AtomicUsize::new(0));
        let engine = CountingEngine { closed: Arc::clone(&closed), fail: false };
        {
            let mut session = EngineSession::open(&engine, Path::new("in.pdf")).unwrap();
            session.convert(Path::new("out.docx")).unwrap();
        }
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn session_closes_after_failure() {
        let closed = Arc::new(AtomicUsize::new(0));
        let engine = CountingEngine { closed: Arc::clone(&closed), fail: true };
        let result = (|| {
            let mut session = EngineSession::open(&engine, Path::new("in.pdf"))?;
            session.convert(Path::new("out.docx"))
        })();
        assert!(result.is_err());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn session_closes_during_unwind() {
        let closed = Arc::new(AtomicUsize::new(0));
        let engine = CountingEngine { closed: Arc::clone(&closed), fail: false };
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _session = EngineSession::open(&engine, Path::new("in.pdf")).unwrap();
            panic!("engine fault");
        }));
        assert!(outcome.is_err());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_command_is_pdf2docx() {
        let cmd = ConverterCommand::default();
        assert_eq!(cmd.program, "pdf2docx");
        assert_eq!(
            cmd.render_args(Path::new("/s/a.pdf"), Path::new("/s/b.docx")),
            vec!["convert", "/s/a.pdf", "/s/b.docx"]
        );
    }

    #[test]
    fn command_engine_rejects_missing_source() {
        let engine = CommandEngine::default();
        let err = engine.open(Path::new("/definitely/not/here.pdf")).err().unwrap();
        assert!(matches!(err, EngineError::Failed(_)));
    }

    #[test]
    fn command_engine_reports_unavailable_program() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.pdf");
        std::fs::write(&source, b"%PDF-1.4").unwrap();
        let engine = CommandEngine::new(ConverterCommand::parse(
            "ndx-no-such-converter-binary",
            "{input} {output}",
        ));
        let mut converter = engine.open(&source).unwrap();
        let err = converter.convert(&dir.path().join("out.docx")).unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn command_engine_surfaces_last_stderr_line() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.pdf");
        std::fs::write(&source, b"%PDF-1.4").unwrap();
        let engine = CommandEngine::new(ConverterCommand {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo warming up >&2; echo 'broken trailer' >&2; exit 3".to_string(),
            ],
        });
        let mut converter = engine.open(&source).unwrap();
        let err = converter.convert(&dir.path().join("out.docx")).unwrap_err();
        assert_eq!(err.to_string(), "broken trailer");
    }

    #[cfg(unix)]
    #[test]
    fn command_engine_success_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.pdf");
        let output = dir.path().join("out.docx");
        std::fs::write(&source, b"%PDF-1.4").unwrap();
        let engine = CommandEngine::new(ConverterCommand::parse("cp", "{input} {output}"));
        let mut converter = engine.open(&source).unwrap();
        converter.convert(&output).unwrap();
        converter.close().unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"%PDF-1.4");
    }
}
