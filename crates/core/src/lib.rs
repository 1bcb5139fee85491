pub mod assist;
pub mod config;
pub mod discovery;
pub mod error;
pub mod models;
pub mod organize;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod registry;
pub mod retrieval;
pub mod segmentation;
pub mod traits;
pub mod validation;

pub use assist::{
    annotate_sources, generate_flashcards, organize_transcript, summarize, SummaryStyle,
};
pub use config::{
    InvocationConfig, PipelineConfig, ProviderConfig, RegistryConfig, SearchConfig,
    SegmentationConfig, TokenTier, ValidationConfig,
};
pub use discovery::{discover_candidates, CandidateMatcher};
pub use error::{AssistError, ConfigError, OrganizeError, ProviderError, SearchError};
pub use models::{
    Answer, CandidateFile, Chunk, Document, FileContent, Flashcard, NotFound, OrganizeOutcome,
    OrganizeRequest, PipelineProcess, ProcessStatus, ProcessSummary, SearchOutcome, SearchRequest,
    SearchSelection, SplitMethod, Stage, StageKind, StageStatus, StructureAnalysis,
    ValidationReport,
};
pub use organize::{estimate_processing_time, OrganizeRun, Organizer};
pub use progress::{ProgressEvent, ProgressSink};
pub use prompts::{OrganizeContext, PromptTemplate};
pub use provider::{
    extract_json, BackendKind, ChatCompletionClient, GenerateContentClient, GenerationRequest,
    PromptPayload, ProviderAdapter, TieredJsonDecoder,
};
pub use registry::ProcessRegistry;
pub use retrieval::SmartSearch;
pub use segmentation::{join_chunks, segment, split_by_lines, DefaultHeadingClassifier};
pub use traits::{HeadingClassifier, JsonDecoder, TextGenerator};
pub use validation::validate;
