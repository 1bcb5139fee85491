mod config;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use textloom_core::{
    annotate_sources, generate_flashcards, organize_transcript, segment, summarize, validate,
    DefaultHeadingClassifier, Document, OrganizeRequest, OrganizeRun, Organizer, PipelineConfig,
    ProgressEvent, ProviderAdapter, SearchRequest, SmartSearch, SummaryStyle, TextGenerator,
};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "textloom", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML file overriding pipeline thresholds.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model id; names containing "gemini" use the generate-content backend.
    #[arg(long, global = true, env = "TEXTLOOM_MODEL", default_value = "gemini-2.5-flash")]
    model: String,

    /// Provider API key.
    #[arg(long, global = true, env = "TEXTLOOM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Reorganize a document into structured Markdown.
    Organize {
        /// Input file, or `-` for stdin.
        #[arg(long, default_value = "-")]
        input: PathBuf,
        /// Write the result here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        /// File whose contents replace the built-in organization rules.
        #[arg(long)]
        prompt: Option<PathBuf>,
        #[arg(long)]
        process_id: Option<String>,
        /// Emphasize with bold only.
        #[arg(long, default_value_t = false)]
        no_italics: bool,
        /// Fail when the result loses content.
        #[arg(long, default_value_t = false)]
        strict: bool,
        /// Treat the input as a lesson transcript (paragraphs and plain subheadings only).
        #[arg(long, default_value_t = false)]
        transcript: bool,
    },
    /// Answer a query with a quote from the files under a directory.
    Search {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        query: String,
        /// Number of files the model may select.
        #[arg(long, default_value = "2")]
        k: usize,
    },
    /// Show how a document would be split into chunks.
    Segment {
        #[arg(long, default_value = "-")]
        input: PathBuf,
        /// Print the chunks as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Compare an organized document against its original.
    Validate {
        #[arg(long)]
        original: PathBuf,
        #[arg(long)]
        transformed: PathBuf,
        /// Exit with an error when the report does not pass.
        #[arg(long, default_value_t = false)]
        fail_on_warning: bool,
    },
    /// Summarize a document or a lesson transcript.
    Summarize {
        #[arg(long, default_value = "-")]
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = Style::Document)]
        style: Style,
    },
    /// Generate question/answer flashcards as JSON.
    Flashcards {
        #[arg(long, default_value = "-")]
        input: PathBuf,
    },
    /// Return the document with Jewish source citations added inline.
    Sources {
        #[arg(long, default_value = "-")]
        input: PathBuf,
        /// Let the model use web search (generate-content backend, paid keys only).
        #[arg(long, default_value_t = false)]
        search_grounding: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Style {
    Document,
    Transcript,
}

impl From<Style> for SummaryStyle {
    fn from(style: Style) -> Self {
        match style {
            Style::Document => SummaryStyle::Document,
            Style::Transcript => SummaryStyle::Transcript,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut pipeline = config::load(cli.config.as_deref())?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        model = %cli.model,
        "textloom boot"
    );

    match cli.command {
        Command::Organize {
            ref input,
            ref output,
            ref prompt,
            ref process_id,
            no_italics,
            strict,
            transcript,
        } => {
            let text = read_input(input).await?;
            let generator = generator(&pipeline, &cli)?;

            let organized = if transcript {
                let organized = organize_transcript(generator.as_ref(), &cli.model, &text).await?;
                format!("{}\n", organized.trim_end())
            } else {
                pipeline.validation.strict |= strict;
                let mut request = OrganizeRequest::new(text, cli.model.as_str());
                request.process_id = process_id.clone();
                request.disable_italic_formatting = no_italics;
                if let Some(prompt) = prompt {
                    request.prompt_override = Some(
                        tokio::fs::read_to_string(prompt)
                            .await
                            .with_context(|| format!("failed to read prompt {}", prompt.display()))?,
                    );
                }
                run_organizer(Organizer::new(generator, pipeline)?, request).await?
            };

            match output {
                Some(path) => {
                    tokio::fs::write(path, &organized)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(path = %path.display(), "organized text written");
                }
                None => print!("{organized}"),
            }
        }
        Command::Search {
            ref root,
            ref query,
            k,
        } => {
            let search = SmartSearch::new(generator(&pipeline, &cli)?, pipeline.search.clone())?;
            let request = SearchRequest {
                query: query.clone(),
                k,
                model: cli.model.clone(),
            };
            let outcome = search.search(root, &request).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Segment { ref input, json } => {
            let document = Document::new(read_input(input).await?);
            let classifier = DefaultHeadingClassifier::new(&pipeline.segmentation)?;
            let chunks = segment(&document, &pipeline.segmentation, &classifier);

            if json {
                println!("{}", serde_json::to_string_pretty(&chunks)?);
            } else {
                println!("{} lines, {} chunk(s)", document.line_count(), chunks.len());
                for chunk in &chunks {
                    println!(
                        "chunk {}: lines {}-{} ({:?})",
                        chunk.index,
                        chunk.start_line + 1,
                        chunk.start_line + chunk.line_count,
                        chunk.method
                    );
                }
            }
        }
        Command::Validate {
            ref original,
            ref transformed,
            fail_on_warning,
        } => {
            let original = read_input(original).await?;
            let transformed = read_input(transformed).await?;
            let report = validate(&original, &transformed, &pipeline.validation);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if fail_on_warning && !report.passed() {
                bail!("validation failed: {}", report.warnings().join("; "));
            }
        }
        Command::Summarize { ref input, style } => {
            let text = read_input(input).await?;
            let generator = generator(&pipeline, &cli)?;
            let summary = summarize(generator.as_ref(), &cli.model, &text, style.into()).await?;
            println!("{summary}");
        }
        Command::Flashcards { ref input } => {
            let text = read_input(input).await?;
            let generator = generator(&pipeline, &cli)?;
            let cards = generate_flashcards(generator.as_ref(), &cli.model, &text).await?;
            println!("{}", serde_json::to_string_pretty(&cards)?);
        }
        Command::Sources {
            ref input,
            search_grounding,
        } => {
            let text = read_input(input).await?;
            let generator = generator(&pipeline, &cli)?;
            let annotated =
                annotate_sources(generator.as_ref(), &cli.model, &text, search_grounding).await?;
            println!("{annotated}");
        }
    }

    Ok(())
}

fn generator(pipeline: &PipelineConfig, cli: &Cli) -> anyhow::Result<Arc<dyn TextGenerator>> {
    let api_key = cli
        .api_key
        .as_deref()
        .filter(|key| !key.trim().is_empty())
        .context("missing API key: pass --api-key or set TEXTLOOM_API_KEY")?;
    let adapter = ProviderAdapter::new(pipeline.provider.clone())?;
    Ok(adapter.generator_for_model(&cli.model, api_key)?)
}

async fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("failed to read stdin")?;
        return Ok(text);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

/// Streams progress to the log until the run ends. Ctrl-C cancels the run.
async fn run_organizer(organizer: Organizer, request: OrganizeRequest) -> anyhow::Result<String> {
    let OrganizeRun {
        process_id,
        mut events,
        handle,
    } = organizer.start(request);
    let mut cancel_requested = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => report(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                warn!(process_id = %process_id, "interrupt received, cancelling after the current stage");
                cancel_requested = organizer.cancel(&process_id);
            }
        }
    }

    let outcome = handle.await.context("organize task aborted")??;
    for warning in outcome.validation.warnings() {
        warn!(process_id = %process_id, "{warning}");
    }
    info!(
        process_id = %process_id,
        duration_ms = outcome.process_info.duration.as_millis() as u64,
        steps = outcome.process_info.steps_completed,
        lines = outcome.process_info.lines_processed,
        "organization finished"
    );
    Ok(outcome.organized_text)
}

fn report(event: &ProgressEvent) {
    match event {
        ProgressEvent::Progress(process) => {
            if let Some(stage) = process.current_stage() {
                info!(
                    process_id = %process.id,
                    stage = %stage.title,
                    status = ?stage.status,
                    operation = stage.current_operation.as_deref().unwrap_or(""),
                    completed = process.completed_stages,
                    total = process.stages.len(),
                    "progress"
                );
            }
        }
        ProgressEvent::Completed { process_id, .. } => {
            info!(process_id = %process_id, "completed");
        }
        ProgressEvent::Error {
            process_id,
            message,
        } => warn!(process_id = %process_id, error = %message, "failed"),
        ProgressEvent::Cancelled { process_id } => {
            warn!(process_id = %process_id, "cancelled");
        }
    }
}
