//! # Conversion Pipeline
//!
//! One [`ConversionJob`] per request, moving linearly through [`JobState`]:
//!
//! ```text
//! Received → Validated → StagedInput → Converted → Finalized → Counted → Served → Cleaned
//!     └──────────┴────────────┴────────────┴───────────┴──→ Failed → Cleaned
//! ```
//!
//! Validation ([`validate`]) happens before anything touches the disk.
//! [`ConversionPipeline::run`] then stages the upload, drives the engine,
//! moves the result into the output directory and bumps the counter.
//! Staging files are owned by a guard that deletes them on drop, and the
//! engine is owned by an [`EngineSession`], so both are released on every
//! exit path. Cleanup failures are logged, never returned.
//!
//! `run` blocks for the duration of the conversion; async callers should
//! run it on a blocking thread.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::counter::{CounterError, PersistentCounter};
use crate::engine::{ConversionEngine, EngineError, EngineSession};
use crate::naming::{output_file_name, sanitize_name, split_extension, UniquenessToken};

/// Extensions accepted as PDF documents (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: &[&str] = &[".pdf"];

/// MIME hints accepted as PDF documents.
pub const ALLOWED_MIME_TYPES: &[&str] = &["application/pdf", "application/x-pdf"];

const STAGING_PREFIX: &str = "ndx-";

/// Lifecycle of a single job, attached to log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Request entered the pipeline.
    Received,
    /// Upload passed validation.
    Validated,
    /// Upload bytes written to a staging file.
    StagedInput,
    /// Engine produced the staged output.
    Converted,
    /// Output moved to its final location.
    Finalized,
    /// Success counter incremented.
    Counted,
    /// Response handed back to the caller.
    Served,
    /// A stage failed.
    Failed,
    /// Staging files removed.
    Cleaned,
}

/// A file part taken from the request's `pdf` multipart field.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Filename as supplied by the client. Untrusted.
    pub file_name: String,
    /// Content-type hint supplied by the client, if any.
    pub content_type: Option<String>,
    /// Uploaded bytes.
    pub bytes: Vec<u8>,
}

/// An upload that passed [`validate`].
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    file_name: String,
    bytes: Vec<u8>,
}

impl ValidatedUpload {
    /// Trimmed client filename.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Uploaded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Client-input errors. These never touch the filesystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The request carried no `pdf` file part.
    #[error("No PDF file was uploaded.")]
    MissingFile,

    /// The file part had an empty filename.
    #[error("No PDF file selected.")]
    EmptyFileName,

    /// Extension or MIME hint is not a PDF.
    #[error("Only PDF files can be uploaded.")]
    NotPdf,
}

/// Server-side failures after validation.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// The upload could not be written to the staging directory.
    #[error("failed to stage upload: {0}")]
    Staging(#[source] io::Error),

    /// The engine failed to open or convert the document.
    #[error("conversion engine failed: {0}")]
    Engine(#[from] EngineError),

    /// The converted document could not be moved into the output directory.
    #[error("failed to finalize output: {0}")]
    Finalize(#[source] io::Error),

    /// The success counter could not be persisted.
    #[error(transparent)]
    Counter(#[from] CounterError),
}

/// A finalized output ready to be served.
#[derive(Debug, Clone)]
pub struct ConvertedDocument {
    /// Generated download name.
    pub file_name: String,
    /// Location inside the output directory.
    pub path: PathBuf,
}

/// Validate an upload's presence, name, extension and MIME hint.
///
/// An absent MIME hint is accepted; a present one must be a PDF type.
pub fn validate(upload: Option<Upload>) -> Result<ValidatedUpload, ValidationError> {
    let upload = upload.ok_or(ValidationError::MissingFile)?;

    let file_name = upload.file_name.trim();
    if file_name.is_empty() {
        return Err(ValidationError::EmptyFileName);
    }
    if !is_allowed_pdf(file_name, upload.content_type.as_deref()) {
        return Err(ValidationError::NotPdf);
    }

    Ok(ValidatedUpload {
        file_name: file_name.to_string(),
        bytes: upload.bytes,
    })
}

fn is_allowed_pdf(file_name: &str, content_type: Option<&str>) -> bool {
    let lower = file_name.to_lowercase();
    let (_, extension) = split_extension(&lower);
    if !ALLOWED_EXTENSIONS.contains(&extension) {
        return false;
    }

    let essence = content_type
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty());
    match essence {
        None => true,
        Some(ct) => ALLOWED_MIME_TYPES.contains(&ct.as_str()),
    }
}

/// Per-request naming decided before any file is created.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    original_name: String,
    source_stem: String,
    token: UniquenessToken,
    output_name: String,
    final_path: PathBuf,
}

impl ConversionJob {
    /// Plan a job for `original_name`, placing its result in `output_dir`.
    pub fn plan(original_name: &str, output_dir: &Path) -> Self {
        Self::plan_with_token(original_name, output_dir, UniquenessToken::generate())
    }

    fn plan_with_token(original_name: &str, output_dir: &Path, token: UniquenessToken) -> Self {
        let (stem, _) = split_extension(original_name);
        let source_stem = sanitize_name(stem);
        let output_name = output_file_name(&source_stem, &token);
        let final_path = output_dir.join(&output_name);
        Self {
            original_name: original_name.to_string(),
            source_stem,
            token,
            output_name,
            final_path,
        }
    }

    /// Filename as supplied by the client.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Sanitized source stem.
    pub fn source_stem(&self) -> &str {
        &self.source_stem
    }

    /// Uniqueness token embedded in the output name.
    pub fn token(&self) -> &UniquenessToken {
        &self.token
    }

    /// Generated download name.
    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Where the finalized output will live.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }
}

/// Temporary files owned by one job; removed when dropped.
#[derive(Debug, Default)]
struct StagedFiles {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
}

impl StagedFiles {
    /// Mark the staged output as moved away so it is not deleted again.
    fn consume_output(&mut self) {
        self.output = None;
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        for path in [self.input.take(), self.output.take()].into_iter().flatten() {
            remove_if_exists(&path);
        }
    }
}

fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove temporary file");
        }
    }
}

/// Drives uploads through staging, the engine, finalization and counting.
pub struct ConversionPipeline {
    staging_dir: PathBuf,
    output_dir: PathBuf,
    counter: Arc<PersistentCounter>,
    engine: Arc<dyn ConversionEngine>,
}

impl std::fmt::Debug for ConversionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionPipeline")
            .field("staging_dir", &self.staging_dir)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl ConversionPipeline {
    /// Create a pipeline, creating the staging and output directories if needed.
    pub fn new(
        staging_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        counter: Arc<PersistentCounter>,
        engine: Arc<dyn ConversionEngine>,
    ) -> io::Result<Self> {
        let staging_dir = staging_dir.into();
        let output_dir = output_dir.into();
        fs::create_dir_all(&staging_dir)?;
        fs::create_dir_all(&output_dir)?;
        Ok(Self {
            staging_dir,
            output_dir,
            counter,
            engine,
        })
    }

    /// Directory holding per-job temporary files.
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Directory holding finalized outputs.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The success counter this pipeline increments.
    pub fn counter(&self) -> &PersistentCounter {
        &self.counter
    }

    /// Convert a validated upload. Blocks until the engine finishes.
    pub fn run(&self, upload: ValidatedUpload) -> Result<ConvertedDocument, ConversionError> {
        let job = ConversionJob::plan(upload.file_name(), &self.output_dir);
        tracing::debug!(
            source = %job.source_stem(),
            output = %job.output_name(),
            state = ?JobState::Validated,
            "conversion job planned"
        );

        let result = self.execute(&job, upload.bytes());
        match &result {
            Ok(_) => tracing::info!(output = %job.output_name(), state = ?JobState::Counted, "conversion succeeded"),
            Err(e) => tracing::error!(
                output = %job.output_name(),
                state = ?JobState::Failed,
                error = %e,
                "conversion failed"
            ),
        }
        result
    }

    fn execute(&self, job: &ConversionJob, bytes: &[u8]) -> Result<ConvertedDocument, ConversionError> {
        // Declared before the session so the engine is released first.
        let mut staged = StagedFiles::default();

        let input = self
            .stage(".pdf", Some(bytes))
            .map_err(ConversionError::Staging)?;
        staged.input = Some(input.clone());
        let output = self.stage(".docx", None).map_err(ConversionError::Staging)?;
        staged.output = Some(output.clone());
        tracing::debug!(state = ?JobState::StagedInput, "upload staged");

        {
            let mut session = EngineSession::open(self.engine.as_ref(), &input)?;
            session.convert(&output)?;
        }
        tracing::debug!(state = ?JobState::Converted, "engine finished");

        move_file(&output, job.final_path()).map_err(ConversionError::Finalize)?;
        staged.consume_output();
        tracing::debug!(state = ?JobState::Finalized, "output finalized");

        if let Err(e) = self.counter.increment() {
            remove_if_exists(job.final_path());
            return Err(e.into());
        }

        Ok(ConvertedDocument {
            file_name: job.output_name().to_string(),
            path: job.final_path().to_path_buf(),
        })
    }

    /// Create a uniquely named file in the staging directory, optionally
    /// filled with `contents`, and hand back its path.
    fn stage(&self, suffix: &str, contents: Option<&[u8]>) -> io::Result<PathBuf> {
        let mut file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(suffix)
            .tempfile_in(&self.staging_dir)?;
        if let Some(bytes) = contents {
            file.write_all(bytes)?;
            file.flush()?;
        }
        file.into_temp_path().keep().map_err(|e| e.error)
    }

    /// Strip the pipeline's own directories out of a diagnostic message.
    pub fn scrub_paths(&self, message: &str) -> String {
        let mut out = message.to_string();
        for (dir, label) in [(&self.staging_dir, "<staging>"), (&self.output_dir, "<output>")] {
            let shown = dir.display().to_string();
            if !shown.is_empty() {
                out = out.replace(&shown, label);
            }
        }
        out
    }
}

/// Move `from` to `to`, falling back to copy + delete across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(error = %rename_err, "rename failed, copying instead");
            if let Err(e) = fs::copy(from, to) {
                remove_if_exists(to);
                return Err(e);
            }
            remove_if_exists(from);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Converter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine that copies the source with a marker, or fails / panics on demand.
    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Panic,
    }

    struct ScriptedEngine {
        behavior: Behavior,
        opened: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    impl ScriptedEngine {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                opened: AtomicUsize::new(0),
                closed: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    struct ScriptedConverter {
        behavior: Behavior,
        source: PathBuf,
        closed: Arc<AtomicUsize>,
    }

    impl ConversionEngine for ScriptedEngine {
        fn open(&self, source: &Path) -> Result<Box<dyn Converter>, EngineError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedConverter {
                behavior: self.behavior,
                source: source.to_path_buf(),
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    impl Converter for ScriptedConverter {
        fn convert(&mut self, output: &Path) -> Result<(), EngineError> {
            match self.behavior {
                Behavior::Succeed => {
                    let mut body = b"DOCX:".to_vec();
                    body.extend(fs::read(&self.source).map_err(|e| EngineError::Failed(e.to_string()))?);
                    fs::write(output, body).map_err(|e| EngineError::Failed(e.to_string()))
                }
                Behavior::Fail => Err(EngineError::Failed(format!(
                    "cannot parse {}",
                    self.source.display()
                ))),
                Behavior::Panic => panic!("engine crashed"),
            }
        }

        fn close(&mut self) -> Result<(), EngineError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        _root: tempfile::TempDir,
        pipeline: ConversionPipeline,
        engine: Arc<ScriptedEngine>,
    }

    fn fixture(behavior: Behavior) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new(behavior);
        let counter = Arc::new(PersistentCounter::new(root.path().join("count.txt")));
        let pipeline = ConversionPipeline::new(
            root.path().join("tmp"),
            root.path().join("output"),
            counter,
            engine.clone(),
        )
        .unwrap();
        Fixture { _root: root, pipeline, engine }
    }

    fn pdf(name: &str) -> ValidatedUpload {
        validate(Some(Upload {
            file_name: name.to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: b"%PDF-1.7 body".to_vec(),
        }))
        .unwrap()
    }

    fn entries(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect()
    }

    // -- validation ----------------------------------------------------------

    fn upload(name: &str, ct: Option<&str>) -> Option<Upload> {
        Some(Upload {
            file_name: name.to_string(),
            content_type: ct.map(str::to_string),
            bytes: Vec::new(),
        })
    }

    #[test]
    fn missing_upload_rejected() {
        assert_eq!(validate(None).unwrap_err(), ValidationError::MissingFile);
    }

    #[test]
    fn blank_filename_rejected() {
        assert_eq!(
            validate(upload("   ", None)).unwrap_err(),
            ValidationError::EmptyFileName
        );
    }

    #[test]
    fn non_pdf_extension_rejected() {
        assert_eq!(
            validate(upload("notes.txt", Some("text/plain"))).unwrap_err(),
            ValidationError::NotPdf
        );
        assert_eq!(
            validate(upload("notes.txt", None)).unwrap_err(),
            ValidationError::NotPdf
        );
        assert_eq!(validate(upload(".pdf", None)).unwrap_err(), ValidationError::NotPdf);
    }

    #[test]
    fn absent_mime_hint_is_accepted() {
        assert!(validate(upload("scan.PDF", None)).is_ok());
    }

    #[test]
    fn present_but_wrong_mime_hint_is_rejected() {
        assert_eq!(
            validate(upload("scan.pdf", Some("image/png"))).unwrap_err(),
            ValidationError::NotPdf
        );
    }

    #[test]
    fn mime_parameters_and_case_are_ignored() {
        assert!(validate(upload("scan.pdf", Some("Application/PDF; charset=binary"))).is_ok());
        assert!(validate(upload("scan.pdf", Some("application/x-pdf"))).is_ok());
    }

    #[test]
    fn validated_name_is_trimmed() {
        let v = validate(upload("  report.pdf \n", None)).unwrap();
        assert_eq!(v.file_name(), "report.pdf");
    }

    // -- planning ------------------------------------------------------------

    #[test]
    fn job_plan_uses_sanitized_stem() {
        let job = ConversionJob::plan("../evil/Q3 Report.pdf", Path::new("/srv/out"));
        assert_eq!(job.source_stem(), "Q3_Report");
        assert!(job.output_name().starts_with("nebuladocx_Q3_Report_"));
        assert!(job.output_name().ends_with(".docx"));
        assert_eq!(job.final_path().parent(), Some(Path::new("/srv/out")));
    }

    #[test]
    fn unnamed_stem_falls_back() {
        let job = ConversionJob::plan("%%%.pdf", Path::new("out"));
        assert_eq!(job.source_stem(), "converted");
    }

    // -- run -----------------------------------------------------------------

    #[test]
    fn success_finalizes_counts_and_cleans() {
        let fx = fixture(Behavior::Succeed);
        let doc = fx.pipeline.run(pdf("Q3 Report.pdf")).unwrap();

        assert!(doc.file_name.starts_with("nebuladocx_Q3_Report_"));
        assert_eq!(fs::read(&doc.path).unwrap(), b"DOCX:%PDF-1.7 body");
        assert_eq!(fx.pipeline.counter().read(), 1);
        assert!(entries(fx.pipeline.staging_dir()).is_empty());
        assert_eq!(fx.engine.closed.load(Ordering::SeqCst), 1);
    }

    /// Collects the `state` field of every event.
    #[derive(Clone, Default)]
    struct StateRecorder(Arc<parking_lot::Mutex<Vec<String>>>);

    struct StateField(Option<String>);

    impl tracing::field::Visit for StateField {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "state" {
                self.0 = Some(format!("{value:?}"));
            }
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for StateRecorder {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let mut field = StateField(None);
            event.record(&mut field);
            if let Some(state) = field.0 {
                self.0.lock().push(state);
            }
        }
    }

    #[test]
    fn success_logs_lifecycle_up_to_counted() {
        use tracing_subscriber::layer::SubscriberExt;

        let fx = fixture(Behavior::Succeed);
        let recorder = StateRecorder::default();
        let subscriber = tracing_subscriber::registry().with(recorder.clone());

        tracing::subscriber::with_default(subscriber, || {
            fx.pipeline.run(pdf("a.pdf")).unwrap();
        });

        let states = recorder.0.lock().clone();
        assert_eq!(
            states,
            ["Validated", "StagedInput", "Converted", "Finalized", "Counted"]
        );
    }

    #[test]
    fn engine_failure_leaves_nothing_behind() {
        let fx = fixture(Behavior::Fail);
        let err = fx.pipeline.run(pdf("broken.pdf")).unwrap_err();

        assert!(matches!(err, ConversionError::Engine(_)));
        assert_eq!(fx.pipeline.counter().read(), 0);
        assert!(entries(fx.pipeline.staging_dir()).is_empty());
        assert!(entries(fx.pipeline.output_dir()).is_empty());
        assert_eq!(fx.engine.opened.load(Ordering::SeqCst), 1);
        assert_eq!(fx.engine.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn engine_panic_still_releases_and_cleans() {
        let fx = fixture(Behavior::Panic);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            fx.pipeline.run(pdf("boom.pdf"))
        }));

        assert!(outcome.is_err());
        assert_eq!(fx.engine.closed.load(Ordering::SeqCst), 1);
        assert!(entries(fx.pipeline.staging_dir()).is_empty());
        assert_eq!(fx.pipeline.counter().read(), 0);
    }

    #[test]
    fn counter_failure_removes_finalized_output() {
        let root = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new(Behavior::Succeed);
        let counter = Arc::new(PersistentCounter::new(
            root.path().join("no-such-dir").join("count.txt"),
        ));
        let pipeline = ConversionPipeline::new(
            root.path().join("tmp"),
            root.path().join("output"),
            counter,
            engine,
        )
        .unwrap();

        let err = pipeline.run(pdf("a.pdf")).unwrap_err();
        assert!(matches!(err, ConversionError::Counter(_)));
        assert!(entries(pipeline.output_dir()).is_empty());
        assert!(entries(pipeline.staging_dir()).is_empty());
    }

    #[test]
    fn identical_names_in_parallel_do_not_collide() {
        let fx = fixture(Behavior::Succeed);
        let docs: Vec<ConvertedDocument> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..6)
                .map(|_| s.spawn(|| fx.pipeline.run(pdf("same.pdf")).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut names: Vec<_> = docs.iter().map(|d| d.file_name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 6);
        assert_eq!(entries(fx.pipeline.output_dir()).len(), 6);
        assert_eq!(fx.pipeline.counter().read(), 6);
        assert!(entries(fx.pipeline.staging_dir()).is_empty());
    }

    #[test]
    fn scrub_paths_hides_directories() {
        let fx = fixture(Behavior::Fail);
        let staged = fx.pipeline.staging_dir().join("ndx-abc.pdf");
        let message = format!("cannot parse {}", staged.display());
        let scrubbed = fx.pipeline.scrub_paths(&message);
        assert!(!scrubbed.contains(&fx.pipeline.staging_dir().display().to_string()));
        assert!(scrubbed.contains("<staging>"));
        assert!(scrubbed.contains("ndx-abc.pdf"));
    }

    #[test]
    fn move_file_renames_within_a_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("b");
        fs::write(&from, b"x").unwrap();
        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"x");
    }
}
