//! Model instructions as typed templates.
//!
//! Every template renders to a [`PromptPayload`]: behavioral rules go in the
//! system slot, the material to work on goes in the user slot.

use crate::error::ProviderError;
use crate::models::{CandidateFile, Chunk, FileContent, StructureAnalysis};
use crate::provider::PromptPayload;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

const OUTLINE_PREVIEW_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryStyle {
    #[default]
    Document,
    /// Lesson or study-session transcripts.
    Transcript,
}

/// Everything the organize instruction is tailored on.
#[derive(Debug, Clone)]
pub struct OrganizeContext<'a> {
    pub text: &'a str,
    pub line_count: usize,
    pub large_document: bool,
    pub analysis: &'a StructureAnalysis,
    /// Closing lines of the document, repeated to the model verbatim.
    pub closing_lines: Vec<&'a str>,
    pub segments: &'a [Chunk],
    pub base_instructions: Option<&'a str>,
    pub disable_italic_formatting: bool,
}

#[derive(Debug, Clone)]
pub enum PromptTemplate<'a> {
    Organize(OrganizeContext<'a>),
    OrganizeTranscript {
        text: &'a str,
    },
    Summarize {
        text: &'a str,
        style: SummaryStyle,
    },
    RankFiles {
        query: &'a str,
        candidates: &'a [CandidateFile],
        k: usize,
    },
    ExtractAnswer {
        query: &'a str,
        files: &'a [FileContent],
    },
    Flashcards {
        text: &'a str,
    },
    /// The text returned with inline source citations.
    AnnotateSources {
        text: &'a str,
    },
}

impl PromptTemplate<'_> {
    pub fn render(&self) -> Result<PromptPayload, ProviderError> {
        let payload = match self {
            PromptTemplate::Organize(context) => {
                PromptPayload::with_system(organize_instructions(context), context.text)
            }
            PromptTemplate::OrganizeTranscript { text } => {
                PromptPayload::with_system(TRANSCRIPT_INSTRUCTIONS, *text)
            }
            PromptTemplate::Summarize { text, style } => {
                let instructions = match style {
                    SummaryStyle::Document => DOCUMENT_SUMMARY_INSTRUCTIONS,
                    SummaryStyle::Transcript => TRANSCRIPT_SUMMARY_INSTRUCTIONS,
                };
                PromptPayload::with_system(instructions, *text)
            }
            PromptTemplate::RankFiles {
                query,
                candidates,
                k,
            } => PromptPayload::user(rank_files(query, candidates, *k)?),
            PromptTemplate::ExtractAnswer { query, files } => {
                PromptPayload::user(extract_answer(query, files)?)
            }
            PromptTemplate::Flashcards { text } => {
                PromptPayload::with_system(FLASHCARD_INSTRUCTIONS, *text)
            }
            PromptTemplate::AnnotateSources { text } => {
                PromptPayload::with_system(SOURCE_INSTRUCTIONS, format!("---\n{text}\n---"))
            }
        };
        Ok(payload)
    }
}

const DEFAULT_ORGANIZE_RULES: &str = "\
You are an expert editor who organizes existing text. Organize the text the user \
provides; do not write new content.

CRITICAL RULES:
- Keep all of the original content. Do not delete, shorten or skip information.
- Do not repeat content. Every part appears exactly once.
- Do not add information that was not in the original text.
- Do not replace the content with a different topic. Only organize what is already there.
- Cover the text from its first line to its last line. Do not stop in the middle.
- Write in the same language as the original text and keep its terminology, names and quoted sources.
- Return only the organized text, without explanations or commentary.";

fn organize_instructions(context: &OrganizeContext<'_>) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        context
            .base_instructions
            .filter(|base| !base.trim().is_empty())
            .unwrap_or(DEFAULT_ORGANIZE_RULES)
            .trim(),
    );

    prompt.push_str("\n\nORGANIZATION TASKS:\n");
    prompt.push_str(
        "1. Build a clear heading hierarchy (H1, H2, H3) from the logical structure of the existing text.\n\
         2. Split the existing content into coherent, topical paragraphs.\n\
         3. Format lists as proper Markdown lists (-, 1., 2.).\n",
    );
    if context.disable_italic_formatting {
        prompt.push_str(
            "4. Emphasize important key terms with bold (**term**) only. Never use italic (*term*).\n",
        );
    } else {
        prompt.push_str("4. Emphasize important key terms (**term**, *term*).\n");
    }
    prompt.push_str(
        "5. Improve punctuation and sentence structure without changing the meaning.\n\
         6. Never leave more than one blank line in a row.\n",
    );

    let observations = structure_observations(context.analysis);
    if !observations.is_empty() {
        prompt.push_str("\nEXISTING STRUCTURE:\n");
        for observation in observations {
            let _ = writeln!(prompt, "- {observation}");
        }
    }

    if context.large_document {
        let _ = write!(
            prompt,
            "\nGUIDANCE FOR A LARGE TEXT ({} lines):\n\
             - Divide it into main parts with H1 headings taken from the existing content.\n\
             - Use H2 headings for sub-topics and keep the hierarchy consistent throughout.\n\
             - Keep a logical flow between the existing sections.\n\
             - Include everything from the beginning to the end. Do not cut the text short or drop its final part.\n",
            context.line_count
        );
    } else {
        let _ = write!(
            prompt,
            "\nGUIDANCE FOR A SHORT OR MEDIUM TEXT ({} lines):\n\
             - Organize it simply and clearly.\n\
             - Use H2 and H3 headings where they help.\n\
             - Keep the natural flow of the text and include all of it.\n",
            context.line_count
        );
    }

    if context.segments.len() > 1 {
        prompt.push_str("\nTHE TEXT HAS THESE NATURAL SECTIONS, IN ORDER:\n");
        for chunk in context.segments {
            let _ = writeln!(
                prompt,
                "- lines {}-{}: {}",
                chunk.start_line + 1,
                chunk.start_line + chunk.line_count,
                opening_line(chunk)
            );
        }
    }

    if !context.closing_lines.is_empty() {
        prompt.push_str("\nTHE ORIGINAL TEXT ENDS WITH THESE LINES. THEY MUST APPEAR IN YOUR OUTPUT:\n");
        push_quoted(&mut prompt, &context.closing_lines);
        prompt.push_str(
            "\nREMINDER: your output must end with the content of these closing lines:\n",
        );
        push_quoted(&mut prompt, &context.closing_lines);
    }

    prompt
}

fn structure_observations(analysis: &StructureAnalysis) -> Vec<&'static str> {
    let mut observations = Vec::new();
    if analysis.has_headers {
        observations.push("The text already has Markdown headings; keep them and make the levels consistent.");
    }
    if analysis.has_lists {
        observations.push("The text contains lists; keep every item.");
    }
    if analysis.has_bold_text || analysis.has_italic_text {
        observations.push("The text already uses emphasis; keep the existing emphasis.");
    }
    if analysis.paragraphs <= 1 && analysis.total_lines > 1 {
        observations.push("The text has no paragraph breaks; introduce them at topic changes.");
    }
    observations
}

fn opening_line(chunk: &Chunk) -> String {
    let line = chunk
        .text
        .split('\n')
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    let mut preview: String = line.chars().take(OUTLINE_PREVIEW_CHARS).collect();
    if line.chars().count() > OUTLINE_PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

fn push_quoted(prompt: &mut String, lines: &[&str]) {
    for line in lines {
        let _ = writeln!(prompt, "> {line}");
    }
}

fn rank_files(query: &str, candidates: &[CandidateFile], k: usize) -> Result<String, ProviderError> {
    let listing = serde_json::to_string_pretty(candidates)?;
    Ok(format!(
        "Given the user query: \"{query}\" and the following list of files \
         (each with name, absolutePath and relativePath):\n\
         {listing}\n\n\
         Select the {k} files most likely to contain the answer to the query. \
         Base the decision on both the file name and its full path (absolutePath).\n\n\
         Required output: a JSON array of the relativePath values of up to {k} selected files, \
         copied exactly as given in the input. If fewer than {k} files are relevant, return only \
         those. If no file looks relevant, return an empty array [].\n\n\
         Example output: [\"src/important_doc.txt\", \"user_guides/guide.txt\"]\n\n\
         Your output must be a valid JSON string only. Do not add any text, explanation or \
         Markdown fences before or after the JSON."
    ))
}

fn extract_answer(query: &str, files: &[FileContent]) -> Result<String, ProviderError> {
    let contents = serde_json::to_string_pretty(files)?;
    Ok(format!(
        "Given the user query: \"{query}\" and the content of the following files:\n\
         {contents}\n\n\
         Do the following:\n\
         1. Read the content of every file provided.\n\
         2. Find the best answer to the user query.\n\
         3. Quote the exact passage from the source that contains the answer.\n\
         4. Give the exact filePath of the file the quote was taken from, as provided in the input.\n\
         5. Give the line number where the quote starts inside that file (the first line is 1).\n\n\
         Required output: a single JSON object with these keys:\n\
         - \"quote\": (string) the exact quote.\n\
         - \"sourceFile\": (string) the filePath of the file containing the quote.\n\
         - \"lineNumber\": (number) the line where the quote starts.\n\
         - \"found\": (boolean) true if an answer was found, false otherwise.\n\n\
         If none of the files contains an answer, return an object with \"found\": false; the other \
         fields may then be empty, null or omitted. Make sure the quote is copied exactly from the \
         provided text.\n\n\
         User query: \"{query}\"\n\n\
         Your output must be a valid JSON string only. Do not add any text, explanation or \
         Markdown fences before or after the JSON."
    ))
}

const TRANSCRIPT_INSTRUCTIONS: &str = "\
You edit transcripts of lessons and study sessions. Organize the transcript the user provides:
- Split it into paragraphs at changes of topic or speaker.
- Add short plain-text subheadings where a new subject begins. Do not use Markdown symbols.
- Fix punctuation and obvious transcription errors.
- Keep the spoken style, the wording and every piece of content. Do not summarize.
- Write in the same language as the transcript.
Return only the organized transcript.";

const DOCUMENT_SUMMARY_INSTRUCTIONS: &str = "\
Summarize the text the user provides. Capture its main points, arguments and conclusions \
in a concise, well-structured summary. Do not add information that is not in the text. \
Write in the same language as the text. Return only the summary.";

const TRANSCRIPT_SUMMARY_INSTRUCTIONS: &str = "\
The user provides a transcript of a lesson or study session. Summarize it for a student who \
missed it: the main ideas that were taught, the sources that were cited, the questions that \
were raised and the conclusions that were reached. Do not add information that is not in the \
transcript. Write in the same language as the transcript. Return only the summary.";

const FLASHCARD_INSTRUCTIONS: &str = "\
Create study flashcards from the text the user provides. Each card asks one clear question \
about an important fact or idea in the text and gives a short, accurate answer taken from \
the text. Write in the same language as the text.

Your output must be a valid JSON array only, in this exact shape:
[{\"question\": \"...\", \"answer\": \"...\"}]
Do not add any text, explanation or Markdown fences before or after the JSON.";

const SOURCE_INSTRUCTIONS: &str = "\
You find relevant Jewish sources for a text the user provides. If search is available to you, \
use it. Cite only canonical Jewish texts (Tanakh, Mishnah, Talmud, Midrash, major halachic works \
such as the Rambam and the Shulchan Aruch, classic works of Jewish thought) and reputable Jewish \
websites such as Sefaria.

Examine every relevant sentence or passage of the text and decide which case applies:

Case A, an exact or near-exact textual match: the passage quotes a source. Right after the \
passage, add the reference only, as (source: <reference>). Do not repeat the quote.
Example: \"...Hear, O Israel, the Lord is our God, the Lord is one... (source: Deuteronomy 6:4)\"

Case B, a conceptual match: the passage expresses an idea found in the sources without quoting \
them. Right after the passage, add the reference and a short quote of one or two sentences that \
shows the idea, as (source: <reference>, \"<short quote>\").
Example: \"...it is important to pray with intent... (source: Rambam, Laws of Prayer 4:15, \
\"What is intent? One clears his mind of all thoughts and sees himself as standing before the \
Divine Presence.\")\"

Further rules:
- Where no source is found, leave the passage exactly as it is.
- Write the word \"source\" in the language of the text (for Hebrew text: מקור).
- Your output is the user's original text with the citations woven in. Add no explanations \
outside of it.
- Be precise with references. Any URL you include must be complete and valid.";
