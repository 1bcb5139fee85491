use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{backend} returned status {status}: {body}")]
    Status {
        backend: String,
        status: u16,
        body: String,
    },

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Network failures, rate limits and server-side errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(error) => {
                error.is_timeout()
                    || error.is_connect()
                    || error.is_request()
                    || error.status().is_some_and(|status| status.is_server_error())
            }
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("text to organize is empty")]
    EmptyInput,

    #[error("process id already in use: {0}")]
    DuplicateProcess(String),

    #[error("process was cancelled: {0}")]
    Cancelled(String),

    #[error("model invocation failed after {attempts} attempt(s): {reason}")]
    ModelInvocation { attempts: u32, reason: String },

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("organized text rejected by validation: {0}")]
    ValidationRejected(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("workspace root does not exist: {0}")]
    MissingRoot(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("model returned an invalid sourceFile not present in the retrieved files: {source_file} (expected one of {retrieved:?})")]
    GroundingViolation {
        source_file: String,
        retrieved: Vec<String>,
    },

    #[error("incomplete answer structure from model: {0}")]
    IncompleteAnswer(String),

    #[error("invalid JSON structure from model: {0}")]
    InvalidStructure(String),
}

#[derive(Debug, Error)]
pub enum AssistError {
    #[error("input text is empty")]
    EmptyInput,

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("invalid flashcard response: {0}")]
    InvalidFlashcards(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid glob: {0}")]
    Glob(#[from] globset::Error),
}
