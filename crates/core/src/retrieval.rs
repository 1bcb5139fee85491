//! Smart search: discover candidate files, let the model rank them, read the
//! chosen ones and extract a single quoted answer grounded in what was read.
//!
//! [`SmartSearch::search`] never fails. Every internal error becomes a
//! [`NotFound`] carrying the reason and how far the run got.

use crate::config::SearchConfig;
use crate::discovery::{discover_candidates, CandidateMatcher};
use crate::error::{ConfigError, SearchError};
use crate::models::{
    Answer, CandidateFile, FileContent, NotFound, SearchOutcome, SearchRequest, SearchSelection,
};
use crate::prompts::PromptTemplate;
use crate::provider::{GenerationRequest, TieredJsonDecoder};
use crate::traits::{JsonDecoder, TextGenerator};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PREVIEW_CHARS: usize = 200;

pub struct SmartSearch {
    generator: Arc<dyn TextGenerator>,
    decoder: Arc<dyn JsonDecoder>,
    matcher: CandidateMatcher,
    config: SearchConfig,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    considered: Option<usize>,
    selected: Option<usize>,
    read: Option<usize>,
}

impl Counters {
    fn not_found(self, reason: impl Into<String>) -> SearchOutcome {
        let reason = reason.into();
        warn!(reason = %reason, "smart search found no answer");
        let mut outcome = NotFound::new(reason);
        outcome.files_considered_count = self.considered;
        outcome.files_selected_count = self.selected;
        outcome.files_read_count = self.read;
        SearchOutcome::NotFound(outcome)
    }
}

impl SmartSearch {
    pub fn new(generator: Arc<dyn TextGenerator>, config: SearchConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            generator,
            decoder: Arc::new(TieredJsonDecoder::new()?),
            matcher: CandidateMatcher::new(&config)?,
            config,
        })
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn JsonDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub async fn search(&self, root: &Path, request: &SearchRequest) -> SearchOutcome {
        let mut counters = Counters::default();
        let query = request.query.trim();
        if query.is_empty() {
            return counters.not_found("query is empty");
        }
        let k = if request.k == 0 {
            self.config.default_k
        } else {
            request.k
        };

        let candidates = match self.discover(root).await {
            Ok(candidates) => candidates,
            Err(error) => return counters.not_found(format!("failed to list workspace files: {error}")),
        };
        counters.considered = Some(candidates.len());
        if candidates.is_empty() {
            return counters.not_found("no text files found in the workspace");
        }
        info!(query, candidates = candidates.len(), k, "ranking candidate files");

        let selection = match self.rank(query, &candidates, k, &request.model).await {
            Ok(selection) => selection,
            Err(error) => return counters.not_found(format!("file selection failed: {error}")),
        };
        counters.selected = Some(selection.len());
        if selection.is_empty() {
            return counters.not_found("no relevant files selected");
        }
        debug!(selected = ?selection.paths, "model selected files");

        let files = self.fetch(&candidates, &selection).await;
        counters.read = Some(files.len());
        if files.is_empty() {
            return counters.not_found("none of the selected files could be read");
        }

        match self.extract(query, &files, &request.model).await {
            Ok(Some(answer)) => {
                info!(source_file = %answer.source_file, line = answer.line_number, "answer found");
                SearchOutcome::Found(answer)
            }
            Ok(None) => counters.not_found("no matching answer in the scanned files"),
            Err(error) => counters.not_found(format!("answer extraction failed: {error}")),
        }
    }

    async fn discover(&self, root: &Path) -> Result<Vec<CandidateFile>, SearchError> {
        let root = root.to_path_buf();
        let matcher = self.matcher.clone();
        tokio::task::spawn_blocking(move || discover_candidates(&root, &matcher))
            .await
            .map_err(|error| SearchError::Io(std::io::Error::other(error.to_string())))?
    }

    /// Asks the model for up to `k` candidates, keeping only paths it was actually shown.
    pub async fn rank(
        &self,
        query: &str,
        candidates: &[CandidateFile],
        k: usize,
        model: &str,
    ) -> Result<SearchSelection, SearchError> {
        let payload = PromptTemplate::RankFiles {
            query,
            candidates,
            k,
        }
        .render()?;
        let reply = self
            .generator
            .generate(&GenerationRequest::new(model, payload))
            .await?;
        let value = self.decoder.decode(&reply)?;
        Ok(filter_selection(&value, candidates, k))
    }

    /// Reads the selected files. Unreadable files are skipped.
    pub async fn fetch(
        &self,
        candidates: &[CandidateFile],
        selection: &SearchSelection,
    ) -> Vec<FileContent> {
        let by_path: HashMap<&str, &CandidateFile> = candidates
            .iter()
            .map(|candidate| (candidate.relative_path.as_str(), candidate))
            .collect();

        let mut files = Vec::with_capacity(selection.len());
        for path in &selection.paths {
            let Some(candidate) = by_path.get(path.as_str()) else {
                continue;
            };
            match tokio::fs::read_to_string(&candidate.absolute_path).await {
                Ok(content) => files.push(FileContent {
                    file_path: path.clone(),
                    content,
                }),
                Err(error) => {
                    warn!(file = %path, error = %error, "skipping unreadable file");
                }
            }
        }
        files
    }

    pub async fn extract(
        &self,
        query: &str,
        files: &[FileContent],
        model: &str,
    ) -> Result<Option<Answer>, SearchError> {
        let payload = PromptTemplate::ExtractAnswer { query, files }.render()?;
        let reply = self
            .generator
            .generate(&GenerationRequest::new(model, payload))
            .await?;
        let value = self.decoder.decode(&reply)?;
        verify_answer(&value, files)
    }
}

/// Keeps string entries that name a candidate, without duplicates, at most `k` of them.
pub fn filter_selection(value: &Value, candidates: &[CandidateFile], k: usize) -> SearchSelection {
    let Some(entries) = value.as_array() else {
        warn!(reply = %preview(&value.to_string()), "file selection reply is not a JSON array");
        return SearchSelection::default();
    };

    let known: HashSet<&str> = candidates
        .iter()
        .map(|candidate| candidate.relative_path.as_str())
        .collect();
    let mut seen = HashSet::new();
    let mut paths = Vec::new();

    for path in entries.iter().filter_map(Value::as_str) {
        if paths.len() >= k {
            break;
        }
        if !known.contains(path) {
            warn!(path, "model selected a file that is not a candidate");
            continue;
        }
        if seen.insert(path) {
            paths.push(path.to_string());
        }
    }

    SearchSelection { paths }
}

/// Checks the extraction reply: a boolean `found`, a complete citation when
/// found, and a `sourceFile` that is one of the files actually read.
pub fn verify_answer(value: &Value, files: &[FileContent]) -> Result<Option<Answer>, SearchError> {
    let object = value.as_object().ok_or_else(|| {
        SearchError::InvalidStructure(format!("expected a JSON object, got {}", preview(&value.to_string())))
    })?;
    let found = object.get("found").and_then(Value::as_bool).ok_or_else(|| {
        SearchError::InvalidStructure("reply has no boolean 'found' field".to_string())
    })?;
    if !found {
        return Ok(None);
    }

    let quote = non_empty_str(object.get("quote"));
    let source_file = non_empty_str(object.get("sourceFile"));
    let line_number = object.get("lineNumber").and_then(line_number);

    let (Some(quote), Some(source_file), Some(line_number)) = (quote, source_file, line_number)
    else {
        return Err(SearchError::IncompleteAnswer(preview(&value.to_string())));
    };

    if !files.iter().any(|file| file.file_path == source_file) {
        return Err(SearchError::GroundingViolation {
            source_file: source_file.to_string(),
            retrieved: files.iter().map(|file| file.file_path.clone()).collect(),
        });
    }

    Ok(Some(Answer::new(quote, source_file, line_number)))
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
}

/// Line numbers are 1-based, so zero is as incomplete as a missing one.
fn line_number(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|number| number.is_finite() && *number >= 0.0 && number.fract() == 0.0)
                .map(|number| number as u64)
        })
        .filter(|line| *line >= 1)
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
