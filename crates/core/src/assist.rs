//! Single-shot study helpers: summaries, transcript cleanup, flashcards and source citations.

use crate::error::{AssistError, ProviderError};
use crate::models::Flashcard;
use crate::prompts::PromptTemplate;
use crate::provider::{extract_json, GenerationRequest};
use crate::traits::TextGenerator;
use serde_json::Value;
use tracing::{debug, warn};

pub use crate::prompts::SummaryStyle;

pub async fn summarize(
    generator: &dyn TextGenerator,
    model: &str,
    text: &str,
    style: SummaryStyle,
) -> Result<String, AssistError> {
    let text = non_blank(text)?;
    let reply = complete(generator, model, PromptTemplate::Summarize { text, style }).await?;
    debug!(style = ?style, chars = reply.chars().count(), "summary generated");
    Ok(reply)
}

/// Paragraphs, plain subheadings and punctuation for a spoken transcript, wording untouched.
pub async fn organize_transcript(
    generator: &dyn TextGenerator,
    model: &str,
    text: &str,
) -> Result<String, AssistError> {
    let text = non_blank(text)?;
    complete(generator, model, PromptTemplate::OrganizeTranscript { text }).await
}

pub async fn generate_flashcards(
    generator: &dyn TextGenerator,
    model: &str,
    text: &str,
) -> Result<Vec<Flashcard>, AssistError> {
    let text = non_blank(text)?;
    let reply = complete(generator, model, PromptTemplate::Flashcards { text }).await?;
    let value = extract_json(&reply)?;
    let cards = parse_flashcards(&value)?;
    debug!(count = cards.len(), "flashcards generated");
    Ok(cards)
}

/// Returns `text` with inline source citations. `search_grounding` asks the
/// backend to consult web search; keys without search access should leave it off.
pub async fn annotate_sources(
    generator: &dyn TextGenerator,
    model: &str,
    text: &str,
    search_grounding: bool,
) -> Result<String, AssistError> {
    let text = non_blank(text)?;
    let payload = PromptTemplate::AnnotateSources { text }.render()?;
    let request = GenerationRequest::new(model, payload).search_grounding(search_grounding);
    let annotated = send(generator, &request).await?;
    debug!(search_grounding, chars = annotated.chars().count(), "sources annotated");
    Ok(annotated)
}

pub fn parse_flashcards(value: &Value) -> Result<Vec<Flashcard>, AssistError> {
    let entries = value.as_array().ok_or_else(|| {
        AssistError::InvalidFlashcards("expected a JSON array of cards".to_string())
    })?;

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let field = |name: &str| {
                entry
                    .get(name)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                    .map(str::to_string)
            };
            match (field("question"), field("answer")) {
                (Some(question), Some(answer)) => Ok(Flashcard { question, answer }),
                _ => {
                    warn!(index, "flashcard is missing a question or an answer");
                    Err(AssistError::InvalidFlashcards(format!(
                        "card {index} needs a non-empty question and answer"
                    )))
                }
            }
        })
        .collect()
}

fn non_blank(text: &str) -> Result<&str, AssistError> {
    if text.trim().is_empty() {
        return Err(AssistError::EmptyInput);
    }
    Ok(text)
}

async fn complete(
    generator: &dyn TextGenerator,
    model: &str,
    template: PromptTemplate<'_>,
) -> Result<String, AssistError> {
    let payload = template.render()?;
    send(generator, &GenerationRequest::new(model, payload)).await
}

async fn send(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
) -> Result<String, AssistError> {
    let reply = generator.generate(request).await?;
    if reply.trim().is_empty() {
        return Err(ProviderError::MalformedResponse("model returned an empty reply".to_string()).into());
    }
    Ok(reply.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedGenerator;
    use serde_json::json;

    #[tokio::test]
    async fn transcript_summary_uses_the_transcript_instructions() -> Result<(), AssistError> {
        let generator = ScriptedGenerator::texts(["  The lesson covered three ideas.  "]);

        let summary = summarize(
            &generator,
            "gpt-4o",
            "instructor: today we learn...",
            SummaryStyle::Transcript,
        )
        .await?;

        assert_eq!(summary, "The lesson covered three ideas.");
        let system = generator.requests()[0].prompt.system.clone().unwrap_or_default();
        assert!(system.contains("transcript of a lesson"));
        Ok(())
    }

    #[tokio::test]
    async fn blank_input_is_rejected_before_calling_the_model() {
        let generator = ScriptedGenerator::default();
        let result = organize_transcript(&generator, "gpt-4o", " \n\t").await;
        assert!(matches!(result, Err(AssistError::EmptyInput)));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn flashcards_are_decoded_from_a_fenced_reply() -> Result<(), AssistError> {
        let generator = ScriptedGenerator::texts([
            "```json\n[{\"question\": \"What color are apples?\", \"answer\": \"Red\"}]\n```",
        ]);

        let cards = generate_flashcards(&generator, "gemini-2.5-flash", "apples are red").await?;

        assert_eq!(
            cards,
            vec![Flashcard {
                question: "What color are apples?".to_string(),
                answer: "Red".to_string(),
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn source_annotation_forwards_the_grounding_choice() -> Result<(), AssistError> {
        let annotated_text = "Hear, O Israel, the Lord is one. (source: Deuteronomy 6:4)";
        let generator = ScriptedGenerator::texts([annotated_text, annotated_text]);

        let grounded =
            annotate_sources(&generator, "gemini-2.5-flash", "Hear, O Israel, the Lord is one.", true)
                .await?;
        annotate_sources(&generator, "gemini-2.5-flash", "Hear, O Israel, the Lord is one.", false)
            .await?;

        assert_eq!(grounded, annotated_text);
        let requests = generator.requests();
        assert!(requests[0].search_grounding);
        assert!(!requests[1].search_grounding);
        assert!(requests[0].prompt.user.contains("Hear, O Israel"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_source_annotation_reply_is_malformed() {
        let generator = ScriptedGenerator::texts(["   "]);
        let result = annotate_sources(&generator, "gemini-2.5-flash", "some text", false).await;
        assert!(matches!(
            result,
            Err(AssistError::Provider(ProviderError::MalformedResponse(_)))
        ));
    }

    #[test]
    fn flashcards_need_a_question_and_an_answer() {
        assert!(matches!(
            parse_flashcards(&json!([{"question": "Why?", "answer": " "}])),
            Err(AssistError::InvalidFlashcards(_))
        ));
        assert!(matches!(
            parse_flashcards(&json!({"question": "Why?", "answer": "Because"})),
            Err(AssistError::InvalidFlashcards(_))
        ));
        assert_eq!(parse_flashcards(&json!([])).map(|cards| cards.len()).ok(), Some(0));
    }
}
