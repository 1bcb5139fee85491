use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub segmentation: SegmentationConfig,
    pub validation: ValidationConfig,
    pub invocation: InvocationConfig,
    pub registry: RegistryConfig,
    pub search: SearchConfig,
    pub provider: ProviderConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.segmentation.validate()?;
        self.validation.validate()?;
        self.invocation.validate()?;
        if self.search.extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "search.extensions must list at least one extension".to_string(),
            ));
        }
        if self.search.default_k == 0 {
            return Err(ConfigError::Invalid(
                "search.default_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Hard upper bound of lines per chunk; documents at or below it are not split.
    pub max_lines: usize,
    /// A heading closes the running chunk once it holds more than this many lines.
    pub soft_lines: usize,
    /// Cut size used by the line-bounded pass.
    pub target_lines: usize,
    /// How far back from the target boundary to look for a clean cut.
    pub lookback_lines: usize,
    pub heading_keywords: Vec<String>,
    pub keyword_heading_max_chars: usize,
    pub colon_heading_max_chars: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_lines: 80,
            soft_lines: 40,
            target_lines: 70,
            lookback_lines: 10,
            heading_keywords: [
                "chapter",
                "section",
                "part",
                "topic",
                "question",
                "answer",
                "summary",
                "introduction",
                "conclusion",
                "פרק",
                "סימן",
                "הלכה",
                "שאלה",
                "תשובה",
                "סיכום",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            keyword_heading_max_chars: 40,
            colon_heading_max_chars: 60,
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_lines == 0 || self.target_lines == 0 {
            return Err(ConfigError::Invalid(
                "segmentation bounds must be positive".to_string(),
            ));
        }
        if self.soft_lines >= self.max_lines {
            return Err(ConfigError::Invalid(format!(
                "segmentation.soft_lines ({}) must be below max_lines ({})",
                self.soft_lines, self.max_lines
            )));
        }
        if self.target_lines > self.max_lines {
            return Err(ConfigError::Invalid(format!(
                "segmentation.target_lines ({}) must not exceed max_lines ({})",
                self.target_lines, self.max_lines
            )));
        }
        if self.lookback_lines >= self.target_lines {
            return Err(ConfigError::Invalid(format!(
                "segmentation.lookback_lines ({}) must be below target_lines ({})",
                self.lookback_lines, self.target_lines
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_words_ratio: f64,
    pub min_chars_ratio: f64,
    pub min_lines_ratio: f64,
    pub tail_lines: usize,
    pub tail_min_chars: usize,
    pub tail_word_min_chars: usize,
    pub tail_presence_ratio: f64,
    /// Fail the run when the report does not pass. Off by default.
    pub strict: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_words_ratio: 0.8,
            min_chars_ratio: 0.8,
            min_lines_ratio: 0.6,
            tail_lines: 3,
            tail_min_chars: 10,
            tail_word_min_chars: 2,
            tail_presence_ratio: 0.5,
            strict: false,
        }
    }
}

impl ValidationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratios = [
            ("min_words_ratio", self.min_words_ratio),
            ("min_chars_ratio", self.min_chars_ratio),
            ("min_lines_ratio", self.min_lines_ratio),
            ("tail_presence_ratio", self.tail_presence_ratio),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "validation.{name} must be within 0..=1, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenTier {
    /// Inclusive line bound; `None` matches every remaining size.
    pub max_lines: Option<usize>,
    pub tokens: u32,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvocationConfig {
    pub max_attempts: u32,
    /// Outputs shorter than this fraction of the input length trigger a retry.
    pub min_output_ratio: f64,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "short_output_backoff_ms")]
    pub short_output_backoff: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "transport_backoff_ms")]
    pub transport_backoff: Duration,
    pub chars_per_token: usize,
    pub output_token_multiplier: f64,
    pub token_tiers: Vec<TokenTier>,
    pub temperature: f32,
    /// Documents above this many lines get the large-document prompt and a segmentation stage.
    pub large_document_lines: usize,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            min_output_ratio: 0.3,
            short_output_backoff: Duration::from_secs(2),
            transport_backoff: Duration::from_secs(3),
            chars_per_token: 3,
            output_token_multiplier: 1.5,
            token_tiers: vec![
                TokenTier { max_lines: Some(100), tokens: 15_000 },
                TokenTier { max_lines: Some(200), tokens: 25_000 },
                TokenTier { max_lines: Some(350), tokens: 35_000 },
                TokenTier { max_lines: Some(500), tokens: 45_000 },
                TokenTier { max_lines: None, tokens: 60_000 },
            ],
            temperature: 0.3,
            large_document_lines: 200,
        }
    }
}

impl InvocationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "invocation.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.chars_per_token == 0 {
            return Err(ConfigError::Invalid(
                "invocation.chars_per_token must be positive".to_string(),
            ));
        }
        if self.token_tiers.is_empty() {
            return Err(ConfigError::Invalid(
                "invocation.token_tiers must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Output budget for a document: enough room to echo the whole input back,
    /// never below the size tier for its line count.
    pub fn output_budget(&self, line_count: usize, char_count: usize) -> u32 {
        let estimated_input_tokens = char_count.div_ceil(self.chars_per_token);
        let min_output_tokens =
            (estimated_input_tokens as f64 * self.output_token_multiplier).ceil() as u32;
        let tier = self
            .token_tiers
            .iter()
            .find(|tier| tier.max_lines.map_or(true, |bound| line_count <= bound))
            .or_else(|| self.token_tiers.last())
            .map(|tier| tier.tokens)
            .unwrap_or_default();
        min_output_tokens.max(tier)
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "retention_ms")]
    pub retention: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_k: usize,
    /// Extensions without the leading dot, matched case-insensitively.
    pub extensions: Vec<String>,
    pub exclude_globs: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let extensions = [
            "txt", "md", "json", "js", "jsx", "ts", "tsx", "html", "htm", "css", "scss", "less",
            "xml", "yaml", "yml", "ini", "cfg", "conf", "log", "sh", "bash", "py", "rb", "php",
            "java", "c", "cpp", "h", "hpp", "cs", "go", "rs", "swift", "kt", "kts", "dart", "vue",
            "svelte", "pl", "pm", "tcl", "vb", "vbs", "csv", "tsv", "rtf", "tex", "text",
        ];
        let exclude_globs = [
            "**/node_modules/**",
            "**/.git/**",
            "**/dist/**",
            "**/build/**",
            "**/coverage/**",
            "**/target/**",
            "**/.vscode/**",
            "**/.idea/**",
            "**/*.lock",
            "**/*.{png,jpg,jpeg,gif,bmp,ico,webp,svg}",
            "**/*.{mp3,wav,ogg,flac,mp4,mov,avi,mkv}",
            "**/*.{pdf,doc,docx,xls,xlsx,ppt,pptx}",
            "**/*.{zip,tar,gz,rar,7z}",
            "**/*.{exe,dll,so,app,dmg}",
            "**/*.{class,jar,pyc,pyd,o,a}",
            "**/.DS_Store",
        ];
        Self {
            default_k: 2,
            extensions: extensions.into_iter().map(str::to_string).collect(),
            exclude_globs: exclude_globs.into_iter().map(str::to_string).collect(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub chat_completions_url: String,
    /// Base URL the model id and `:generateContent` are appended to.
    pub generate_content_base_url: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "request_timeout_ms")]
    pub request_timeout: Duration,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            chat_completions_url: "https://api.openai.com/v1/chat/completions".to_string(),
            generate_content_base_url: "https://generativelanguage.googleapis.com/v1beta/models/"
                .to_string(),
            request_timeout: Duration::from_secs(5 * 60),
            top_p: 0.95,
            top_k: 40,
        }
    }
}
