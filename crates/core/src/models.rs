use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Raw text of one pipeline run. Counts are derived on demand, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    text: String,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }

    pub fn line_count(&self) -> usize {
        self.lines().count()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SplitMethod {
    HeaderBounded,
    LineBounded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub index: usize,
    /// Zero-based line offset of the first line inside the source document.
    pub start_line: usize,
    pub line_count: usize,
    pub text: String,
    pub method: SplitMethod,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructureAnalysis {
    pub total_lines: usize,
    pub has_headers: bool,
    pub has_lists: bool,
    pub has_bold_text: bool,
    pub has_italic_text: bool,
    pub paragraphs: usize,
    pub avg_line_length: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub original_words: usize,
    pub transformed_words: usize,
    pub words_ratio: f64,
    pub original_chars: usize,
    pub transformed_chars: usize,
    pub chars_ratio: f64,
    pub original_lines: usize,
    pub transformed_lines: usize,
    pub lines_ratio: f64,
    pub last_lines_present: bool,
    pub missing_last_lines: Vec<String>,
    pub is_valid: bool,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.is_valid && self.last_lines_present
    }

    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.is_valid {
            warnings.push(format!(
                "content ratios below threshold: words {:.1}%, chars {:.1}%, lines {:.1}%",
                self.words_ratio * 100.0,
                self.chars_ratio * 100.0,
                self.lines_ratio * 100.0
            ));
        }
        for line in &self.missing_last_lines {
            warnings.push(format!("closing line missing from output: {line}"));
        }
        warnings
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProcessStatus {
    Initializing,
    Active,
    Completed,
    Error,
    Cancelled,
}

impl ProcessStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessStatus::Completed | ProcessStatus::Error | ProcessStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StageStatus {
    Pending,
    Active,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageKind {
    StructureAnalysis,
    Segmentation,
    PromptOptimization,
    ModelInvocation,
    PostProcessing,
    Validation,
}

impl StageKind {
    pub fn title(self) -> &'static str {
        match self {
            StageKind::StructureAnalysis => "Structure analysis",
            StageKind::Segmentation => "Segmentation",
            StageKind::PromptOptimization => "Organization strategy",
            StageKind::ModelInvocation => "Model processing",
            StageKind::PostProcessing => "Result cleanup",
            StageKind::Validation => "Quality validation",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            StageKind::StructureAnalysis => "Detect existing headings, lists, emphasis and paragraphs",
            StageKind::Segmentation => "Split the large document at natural boundaries",
            StageKind::PromptOptimization => "Build an instruction tailored to this document",
            StageKind::ModelInvocation => "Send the document to the model for organization",
            StageKind::PostProcessing => "Normalize blank lines and trailing whitespace",
            StageKind::Validation => "Compare the result against the original for lost content",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub kind: StageKind,
    pub title: String,
    pub description: String,
    pub status: StageStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub current_operation: Option<String>,
    pub error: Option<String>,
}

impl Stage {
    pub fn pending(kind: StageKind) -> Self {
        Self {
            kind,
            title: kind.title().to_string(),
            description: kind.description().to_string(),
            status: StageStatus::Pending,
            start_time: None,
            end_time: None,
            current_operation: None,
            error: None,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSummary {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub duration: Duration,
    pub steps_completed: usize,
    pub lines_processed: usize,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineProcess {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Line count of the input document.
    pub text_length: usize,
    pub document_checksum: String,
    pub model: String,
    pub stages: Vec<Stage>,
    pub current_stage_index: usize,
    pub completed_stages: usize,
    pub status: ProcessStatus,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub estimated_duration: Duration,
    pub result: Option<String>,
    pub error: Option<String>,
    pub validation: Option<ValidationReport>,
    pub summary: Option<ProcessSummary>,
}

impl PipelineProcess {
    pub fn stage_index(&self, kind: StageKind) -> Option<usize> {
        self.stages.iter().position(|stage| stage.kind == kind)
    }

    pub fn current_stage(&self) -> Option<&Stage> {
        self.stages.get(self.current_stage_index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrganizeRequest {
    pub text: String,
    pub prompt_override: Option<String>,
    pub model: String,
    pub process_id: Option<String>,
    pub disable_italic_formatting: bool,
}

impl OrganizeRequest {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt_override: None,
            model: model.into(),
            process_id: None,
            disable_italic_formatting: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrganizeOutcome {
    pub organized_text: String,
    pub process_info: ProcessSummary,
    pub validation: ValidationReport,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFile {
    pub name: String,
    pub relative_path: String,
    pub absolute_path: String,
}

/// Relative paths picked by the ranking stage, already filtered against the candidate set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchSelection {
    pub paths: Vec<String>,
}

impl SearchSelection {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub file_path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub k: usize,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub found: bool,
    pub quote: String,
    pub source_file: String,
    /// 1-based line within `source_file`.
    pub line_number: u64,
}

impl Answer {
    pub fn new(quote: impl Into<String>, source_file: impl Into<String>, line_number: u64) -> Self {
        Self {
            found: true,
            quote: quote.into(),
            source_file: source_file.into(),
            line_number,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotFound {
    pub not_found: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_considered_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_selected_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_read_count: Option<usize>,
}

impl NotFound {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            not_found: true,
            reason: reason.into(),
            files_considered_count: None,
            files_selected_count: None,
            files_read_count: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SearchOutcome {
    Found(Answer),
    NotFound(NotFound),
}

impl SearchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}
