//! Staged organization of a document through a text generator.
//!
//! A run walks a fixed list of stages, publishing a snapshot of its
//! [`PipelineProcess`] on every transition. Only a failed model invocation
//! (or an explicit strict validation) aborts a run; cancellation is observed
//! at the next stage boundary.

use crate::config::PipelineConfig;
use crate::error::{ConfigError, OrganizeError};
use crate::models::{
    Chunk, Document, OrganizeOutcome, OrganizeRequest, PipelineProcess, ProcessStatus,
    ProcessSummary, Stage, StageKind, StageStatus, StructureAnalysis, ValidationReport,
};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::prompts::{OrganizeContext, PromptTemplate};
use crate::provider::{GenerationRequest, PromptPayload};
use crate::registry::ProcessRegistry;
use crate::segmentation::{segment, DefaultHeadingClassifier};
use crate::traits::{HeadingClassifier, TextGenerator};
use crate::validation::{tail_lines, validate};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

const BASE_ESTIMATE_MS: f64 = 3_000.0;
const MAX_ESTIMATE_MS: f64 = 120_000.0;

#[derive(Debug)]
struct TextPatterns {
    heading: Regex,
    list_item: Regex,
    bold: Regex,
    italic: Regex,
    trailing_space: Regex,
    blank_run: Regex,
}

impl TextPatterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            heading: Regex::new(r"(?m)^#{1,6}\s")?,
            list_item: Regex::new(r"(?m)^[ \t]*(?:[-*+]|\d+\.)\s")?,
            bold: Regex::new(r"\*\*.+?\*\*|__.+?__")?,
            italic: Regex::new(r"\*[^*\n]+\*|_[^_\n]+_")?,
            trailing_space: Regex::new(r"(?m)[ \t]+$")?,
            blank_run: Regex::new(r"\n{3,}")?,
        })
    }
}

/// Handle to a run started with [`Organizer::start`].
pub struct OrganizeRun {
    pub process_id: String,
    pub events: UnboundedReceiver<ProgressEvent>,
    pub handle: JoinHandle<Result<OrganizeOutcome, OrganizeError>>,
}

#[derive(Clone)]
pub struct Organizer {
    generator: Arc<dyn TextGenerator>,
    classifier: Arc<dyn HeadingClassifier>,
    config: Arc<PipelineConfig>,
    registry: ProcessRegistry,
    patterns: Arc<TextPatterns>,
}

impl Organizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = DefaultHeadingClassifier::new(&config.segmentation)?;
        Ok(Self {
            generator,
            classifier: Arc::new(classifier),
            config: Arc::new(config),
            registry: ProcessRegistry::new(),
            patterns: Arc::new(TextPatterns::new()?),
        })
    }

    pub fn with_registry(mut self, registry: ProcessRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn HeadingClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn process_info(&self, process_id: &str) -> Option<PipelineProcess> {
        self.registry.get(process_id)
    }

    /// Cancels a live run. Returns `false` when no such run is registered.
    pub fn cancel(&self, process_id: &str) -> bool {
        let cancelled = self.registry.cancel(process_id).is_some();
        if cancelled {
            info!(process_id, "organization cancelled");
        }
        cancelled
    }

    /// Spawns the run on the current runtime and hands back its event stream.
    pub fn start(&self, mut request: OrganizeRequest) -> OrganizeRun {
        let process_id = request
            .process_id
            .get_or_insert_with(new_process_id)
            .clone();
        let (sink, events) = ProgressSink::channel();
        let organizer = self.clone();
        let handle = tokio::spawn(async move { organizer.organize(request, sink).await });

        OrganizeRun {
            process_id,
            events,
            handle,
        }
    }

    pub async fn organize(
        &self,
        request: OrganizeRequest,
        sink: ProgressSink,
    ) -> Result<OrganizeOutcome, OrganizeError> {
        let process_id = request.process_id.clone().unwrap_or_else(new_process_id);

        if request.text.trim().is_empty() {
            let error = OrganizeError::EmptyInput;
            sink.emit(ProgressEvent::Error {
                process_id,
                message: error.to_string(),
            });
            return Err(error);
        }

        let document = Document::new(request.text.as_str());
        let line_count = document.line_count();
        let large_document = line_count > self.config.invocation.large_document_lines;
        let process = PipelineProcess {
            id: process_id.clone(),
            start_time: Utc::now(),
            end_time: None,
            text_length: line_count,
            document_checksum: document.checksum(),
            model: request.model.clone(),
            stages: stage_plan(large_document)
                .into_iter()
                .map(Stage::pending)
                .collect(),
            current_stage_index: 0,
            completed_stages: 0,
            status: ProcessStatus::Initializing,
            estimated_duration: estimate_processing_time(line_count, &request.model),
            result: None,
            error: None,
            validation: None,
            summary: None,
        };
        let started_at = process.start_time;

        info!(
            process_id = %process_id,
            lines = line_count,
            checksum = %process.document_checksum,
            model = %request.model,
            "organization started"
        );

        if !self.registry.create(process) {
            let error = OrganizeError::DuplicateProcess(process_id.clone());
            sink.emit(ProgressEvent::Error {
                process_id,
                message: error.to_string(),
            });
            return Err(error);
        }

        let tracker = RunTracker {
            registry: &self.registry,
            sink: &sink,
            process_id: &process_id,
        };
        let result = self
            .run_stages(&tracker, &document, &request, large_document)
            .await;

        let result = match result {
            Ok((organized_text, validation)) => {
                tracker.complete(organized_text, validation, started_at, line_count)
            }
            Err(error) => Err(error),
        };

        match &result {
            Ok(outcome) => info!(
                process_id = %process_id,
                duration_ms = outcome.process_info.duration.as_millis() as u64,
                passed = outcome.validation.passed(),
                "organization completed"
            ),
            Err(OrganizeError::Cancelled(_)) => {
                sink.emit(ProgressEvent::Cancelled {
                    process_id: process_id.clone(),
                });
            }
            Err(error) => {
                warn!(process_id = %process_id, error = %error, "organization failed");
                tracker.fail(error);
            }
        }

        self.registry
            .schedule_purge(&process_id, started_at, self.config.registry.retention);
        result
    }

    async fn run_stages(
        &self,
        tracker: &RunTracker<'_>,
        document: &Document,
        request: &OrganizeRequest,
        large_document: bool,
    ) -> Result<(String, ValidationReport), OrganizeError> {
        let text = document.text();

        let analysis = tracker
            .stage(StageKind::StructureAnalysis, async {
                Ok(analyze_structure(text, &self.patterns))
            })
            .await?;

        let segments: Vec<Chunk> = if large_document {
            tracker
                .stage(StageKind::Segmentation, async {
                    let chunks = segment(
                        document,
                        &self.config.segmentation,
                        self.classifier.as_ref(),
                    );
                    tracker.operation(format!("{} segments", chunks.len()));
                    Ok(chunks)
                })
                .await?
        } else {
            Vec::new()
        };

        let payload = tracker
            .stage(StageKind::PromptOptimization, async {
                let context = OrganizeContext {
                    text,
                    line_count: document.line_count(),
                    large_document,
                    analysis: &analysis,
                    closing_lines: tail_lines(text, self.config.validation.tail_lines),
                    segments: &segments,
                    base_instructions: request.prompt_override.as_deref(),
                    disable_italic_formatting: request.disable_italic_formatting,
                };
                PromptTemplate::Organize(context)
                    .render()
                    .map_err(OrganizeError::from)
            })
            .await?;

        let raw = tracker
            .stage(
                StageKind::ModelInvocation,
                self.invoke_with_retry(tracker, document, payload, &request.model),
            )
            .await?;

        let organized = tracker
            .stage(StageKind::PostProcessing, async {
                Ok(post_process(&raw, &self.patterns))
            })
            .await?;

        let validation = tracker
            .stage(StageKind::Validation, async {
                let report = validate(text, &organized, &self.config.validation);
                if self.config.validation.strict && !report.passed() {
                    return Err(OrganizeError::ValidationRejected(report.warnings().join("; ")));
                }
                Ok(report)
            })
            .await?;

        Ok((organized, validation))
    }

    async fn invoke_with_retry(
        &self,
        tracker: &RunTracker<'_>,
        document: &Document,
        payload: PromptPayload,
        model: &str,
    ) -> Result<String, OrganizeError> {
        let invocation = &self.config.invocation;
        let char_count = document.char_count();
        let budget = invocation.output_budget(document.line_count(), char_count);
        let request = GenerationRequest::new(model, payload)
            .max_output_tokens(budget)
            .temperature(invocation.temperature);
        let min_output_chars = char_count as f64 * invocation.min_output_ratio;
        let max_attempts = invocation.max_attempts;
        let mut last_failure = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 && !tracker.is_live() {
                return Err(tracker.cancelled());
            }
            tracker.operation(format!(
                "sending request to {} (attempt {attempt}/{max_attempts}, max {budget} tokens)",
                self.generator.backend_name()
            ));

            match self.generator.generate(&request).await {
                Ok(output) => {
                    let produced = output.trim().chars().count();
                    if produced as f64 >= min_output_chars {
                        tracker.operation("response received".to_string());
                        return Ok(output);
                    }
                    warn!(
                        process_id = %tracker.process_id,
                        attempt,
                        produced,
                        input_chars = char_count,
                        "model output is too short"
                    );
                    last_failure =
                        format!("output too short: {produced} of {char_count} input characters");
                    if attempt < max_attempts {
                        tokio::time::sleep(invocation.short_output_backoff).await;
                    }
                }
                Err(error) if error.is_transient() => {
                    warn!(
                        process_id = %tracker.process_id,
                        attempt,
                        error = %error,
                        "transient provider failure"
                    );
                    last_failure = error.to_string();
                    if attempt < max_attempts {
                        tokio::time::sleep(invocation.transport_backoff).await;
                    }
                }
                Err(error) => {
                    tracker.operation(format!("error: {error}"));
                    return Err(OrganizeError::Provider(error));
                }
            }
        }

        tracker.operation(format!("error: {last_failure}"));
        Err(OrganizeError::ModelInvocation {
            attempts: max_attempts,
            reason: last_failure,
        })
    }
}

/// Stage transitions of one run, mirrored into the registry and the event stream.
struct RunTracker<'a> {
    registry: &'a ProcessRegistry,
    sink: &'a ProgressSink,
    process_id: &'a str,
}

impl RunTracker<'_> {
    fn cancelled(&self) -> OrganizeError {
        OrganizeError::Cancelled(self.process_id.to_string())
    }

    fn is_live(&self) -> bool {
        self.registry.get(self.process_id).is_some()
    }

    fn publish<F>(&self, mutate: F) -> Result<(), OrganizeError>
    where
        F: FnOnce(&mut PipelineProcess),
    {
        let snapshot = self
            .registry
            .update(self.process_id, mutate)
            .ok_or_else(|| self.cancelled())?;
        self.sink.emit(ProgressEvent::Progress(snapshot));
        Ok(())
    }

    async fn stage<T, F>(&self, kind: StageKind, work: F) -> Result<T, OrganizeError>
    where
        F: Future<Output = Result<T, OrganizeError>>,
    {
        self.publish(|process| {
            process.status = ProcessStatus::Active;
            if let Some(index) = process.stage_index(kind) {
                process.current_stage_index = index;
                let stage = &mut process.stages[index];
                stage.status = StageStatus::Active;
                stage.start_time = Some(Utc::now());
            }
        })?;

        match work.await {
            Ok(value) => {
                self.publish(|process| {
                    if let Some(index) = process.stage_index(kind) {
                        let stage = &mut process.stages[index];
                        stage.status = StageStatus::Completed;
                        stage.end_time = Some(Utc::now());
                        process.completed_stages = index + 1;
                    }
                })?;
                Ok(value)
            }
            Err(OrganizeError::Cancelled(id)) => Err(OrganizeError::Cancelled(id)),
            Err(error) => {
                let message = error.to_string();
                self.publish(|process| {
                    if let Some(index) = process.stage_index(kind) {
                        let stage = &mut process.stages[index];
                        stage.status = StageStatus::Error;
                        stage.end_time = Some(Utc::now());
                        stage.error = Some(message);
                    }
                })?;
                Err(error)
            }
        }
    }

    /// Progress note on the active stage. A vanished entry is left to the next transition.
    fn operation(&self, note: String) {
        let _ = self.publish(|process| {
            let index = process.current_stage_index;
            if let Some(stage) = process.stages.get_mut(index) {
                stage.current_operation = Some(note);
            }
        });
    }

    fn complete(
        &self,
        organized_text: String,
        validation: ValidationReport,
        started_at: DateTime<Utc>,
        lines_processed: usize,
    ) -> Result<OrganizeOutcome, OrganizeError> {
        let end_time = Utc::now();
        let duration = (end_time - started_at).to_std().unwrap_or(Duration::ZERO);
        let mut summary = None;

        self.publish(|process| {
            let process_summary = ProcessSummary {
                duration,
                steps_completed: process.stages.len(),
                lines_processed,
            };
            process.status = ProcessStatus::Completed;
            process.completed_stages = process.stages.len();
            process.end_time = Some(end_time);
            process.result = Some(organized_text.clone());
            process.validation = Some(validation.clone());
            process.summary = Some(process_summary);
            summary = Some(process_summary);
        })?;
        let summary = summary.ok_or_else(|| self.cancelled())?;

        self.sink.emit(ProgressEvent::Completed {
            process_id: self.process_id.to_string(),
            organized_text: organized_text.clone(),
            summary,
        });

        Ok(OrganizeOutcome {
            organized_text,
            process_info: summary,
            validation,
        })
    }

    fn fail(&self, error: &OrganizeError) {
        let message = error.to_string();
        let _ = self.registry.update(self.process_id, |process| {
            process.status = ProcessStatus::Error;
            process.end_time = Some(Utc::now());
            process.error = Some(message.clone());
        });
        self.sink.emit(ProgressEvent::Error {
            process_id: self.process_id.to_string(),
            message,
        });
    }
}

fn stage_plan(large_document: bool) -> Vec<StageKind> {
    let mut plan = vec![StageKind::StructureAnalysis];
    if large_document {
        plan.push(StageKind::Segmentation);
    }
    plan.extend([
        StageKind::PromptOptimization,
        StageKind::ModelInvocation,
        StageKind::PostProcessing,
        StageKind::Validation,
    ]);
    plan
}

fn new_process_id() -> String {
    format!("process_{}", Uuid::new_v4().simple())
}

fn analyze_structure(text: &str, patterns: &TextPatterns) -> StructureAnalysis {
    let lines: Vec<&str> = text.split('\n').collect();
    let total_chars: usize = lines.iter().map(|line| line.chars().count()).sum();

    StructureAnalysis {
        total_lines: lines.len(),
        has_headers: patterns.heading.is_match(text),
        has_lists: patterns.list_item.is_match(text),
        has_bold_text: patterns.bold.is_match(text),
        has_italic_text: patterns.italic.is_match(text),
        paragraphs: text.split("\n\n").count(),
        avg_line_length: total_chars as f64 / lines.len().max(1) as f64,
    }
}

fn post_process(text: &str, patterns: &TextPatterns) -> String {
    let stripped = patterns.trailing_space.replace_all(text, "");
    let mut collapsed = patterns.blank_run.replace_all(&stripped, "\n\n").into_owned();
    if !collapsed.ends_with('\n') {
        collapsed.push('\n');
    }
    collapsed
}

/// Rough wall-clock estimate shown to users before a run finishes.
pub fn estimate_processing_time(line_count: usize, model: &str) -> Duration {
    let mut millis = BASE_ESTIMATE_MS;
    if line_count > 100 {
        millis += (line_count - 100) as f64 * 50.0;
    }
    if line_count > 200 {
        millis += (line_count - 200) as f64 * 30.0;
    }
    if model.contains("2.5-pro") {
        millis *= 1.3;
    }
    Duration::from_millis(millis.min(MAX_ESTIMATE_MS) as u64)
}
