use crate::error::ProviderError;
use crate::traits::JsonDecoder;
use regex::Regex;
use serde_json::Value;

const FENCE_OPEN: &str = r"(?i)^```(?:json|javascript|js)?\s*";
const FENCE_CLOSE: &str = r"\s*```$";
/// Opening brackets tried by the span scan; each try is linear in the reply length.
const MAX_SPAN_STARTS: usize = 64;

/// Decodes model replies in three tiers: as-is, without code fences, then the
/// first balanced `{...}`/`[...]` span that parses.
#[derive(Debug, Clone)]
pub struct TieredJsonDecoder {
    fence_open: Regex,
    fence_close: Regex,
}

impl TieredJsonDecoder {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            fence_open: Regex::new(FENCE_OPEN)?,
            fence_close: Regex::new(FENCE_CLOSE)?,
        })
    }

    fn strip_fences(&self, trimmed: &str) -> String {
        let without_open = self.fence_open.replace(trimmed, "");
        let without_close = self.fence_close.replace(&without_open, "");
        without_close
            .trim()
            .trim_matches(|ch| ch == '`' || ch == '"' || ch == '\'')
            .trim()
            .to_string()
    }
}

impl JsonDecoder for TieredJsonDecoder {
    fn decode(&self, raw: &str) -> Result<Value, ProviderError> {
        let trimmed = raw.trim();
        if let Ok(value) = serde_json::from_str(trimmed) {
            return Ok(value);
        }

        let unfenced = self.strip_fences(trimmed);
        if let Ok(value) = serde_json::from_str(&unfenced) {
            return Ok(value);
        }

        let starts = trimmed
            .char_indices()
            .filter(|(_, ch)| *ch == '{' || *ch == '[')
            .map(|(start, _)| start)
            .take(MAX_SPAN_STARTS);
        for start in starts {
            if let Some(span) = balanced_span(trimmed, start) {
                if let Ok(value) = serde_json::from_str(span) {
                    return Ok(value);
                }
            }
        }

        let preview: String = trimmed.chars().take(200).collect();
        Err(ProviderError::MalformedResponse(format!(
            "no JSON value could be decoded from reply: {preview}"
        )))
    }
}

/// Convenience wrapper over [`TieredJsonDecoder`].
pub fn extract_json(raw: &str) -> Result<Value, ProviderError> {
    let decoder = TieredJsonDecoder::new()
        .map_err(|error| ProviderError::MalformedResponse(error.to_string()))?;
    decoder.decode(raw)
}

/// Shortest bracket-balanced span starting at `start`, skipping brackets inside strings.
fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' | '[' => stack.push(ch),
            '}' | ']' => {
                let open = stack.pop()?;
                if (open == '{') != (ch == '}') {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unclosed_brackets_are_rejected_without_scanning_every_start() {
        let raw = "[".repeat(40_000);
        assert!(matches!(
            extract_json(&raw),
            Err(ProviderError::MalformedResponse(_))
        ));

        let raw = format!("{} then {{\"found\": false}}", "[".repeat(MAX_SPAN_STARTS - 1));
        assert_eq!(extract_json(&raw).ok(), Some(json!({"found": false})));
    }

    #[test]
    fn plain_json_decodes_directly() {
        assert_eq!(
            extract_json(r#"  ["a.txt", "b.txt"] "#).expect("tier 1"),
            json!(["a.txt", "b.txt"])
        );
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "```json\n{\"found\": false}\n```";
        assert_eq!(extract_json(raw).expect("tier 2"), json!({"found": false}));

        let raw = "```JS\n[1, 2]\n```";
        assert_eq!(extract_json(raw).expect("tier 2"), json!([1, 2]));
    }

    #[test]
    fn json_embedded_in_prose_is_found() {
        let raw = "Sure! Based on the files [see below], the answer is:\n\
                   {\"quote\": \"apples are {red}\", \"sourceFile\": \"a.txt\", \"lineNumber\": 1, \"found\": true}\n\
                   Let me know if you need more.";
        let value = extract_json(raw).expect("tier 3");
        assert_eq!(value["sourceFile"], "a.txt");
        assert_eq!(value["quote"], "apples are {red}");
    }

    #[test]
    fn escaped_quotes_do_not_confuse_the_scanner() {
        let raw = r#"result: {"quote": "he said \"stop]\" twice", "found": true} done"#;
        assert_eq!(extract_json(raw).expect("tier 3")["found"], true);
    }

    #[test]
    fn undecodable_reply_is_malformed() {
        let error = extract_json("I could not find anything relevant.").expect_err("no json");
        assert!(matches!(error, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn unbalanced_span_is_rejected() {
        assert_eq!(balanced_span("{\"a\": [1, 2}", 0), None);
        assert_eq!(balanced_span("x {\"a\": 1} y", 2), Some("{\"a\": 1}"));
    }
}
