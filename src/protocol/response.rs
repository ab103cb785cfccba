use serde::Deserialize;
use serde_json::Value;

use crate::stream::citations::CitationRecord;

use super::event::collect_citations;

#[derive(Debug, Deserialize)]
struct CompletionText<'a> {
    #[serde(default, borrow)]
    choices: Vec<CompletionChoice<'a>>,
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default, borrow)]
    output: Vec<OutputItem<'a>>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice<'a> {
    #[serde(default, borrow)]
    message: Option<CompletionMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage<'a> {
    #[serde(default, borrow)]
    content: Option<MessageContent<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(String),
    #[serde(borrow)]
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Deserialize)]
struct ContentPart<'a> {
    #[serde(default, borrow, rename = "type")]
    part_type: Option<&'a str>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputItem<'a> {
    #[serde(default, borrow, rename = "type")]
    item_type: Option<&'a str>,
    #[serde(default, borrow)]
    content: Vec<ContentPart<'a>>,
}

/// Answer text and citations of a complete (non-streaming) upstream response.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompletionOutput {
    pub text: String,
    pub citations: Vec<CitationRecord>,
}

/// Decode a complete chat-completions or responses body.
///
/// Returns `None` when the body is not JSON. A JSON body without any known
/// text field decodes to empty text.
#[must_use]
pub fn decode_completion(body: &[u8]) -> Option<CompletionOutput> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let text = serde_json::from_slice::<CompletionText<'_>>(body)
        .ok()
        .map(completion_text)
        .unwrap_or_default();

    let mut citations = Vec::new();
    collect_citations(&value, &mut citations);
    Some(CompletionOutput { text, citations })
}

fn completion_text(parsed: CompletionText<'_>) -> String {
    let from_choice = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .map(|content| match content {
            MessageContent::Text(text) => text,
            MessageContent::Parts(parts) => join_text_parts(parts),
        })
        .filter(|text| !text.is_empty());
    if let Some(text) = from_choice {
        return text;
    }
    if let Some(text) = parsed.output_text.filter(|t| !t.is_empty()) {
        return text;
    }
    parsed
        .output
        .into_iter()
        .filter(|item| matches!(item.item_type, Some("message") | None))
        .map(|item| join_text_parts(item.content))
        .collect()
}

fn join_text_parts(parts: Vec<ContentPart<'_>>) -> String {
    parts
        .into_iter()
        .filter(|part| matches!(part.part_type, Some("text" | "output_text") | None))
        .filter_map(|part| part.text)
        .collect()
}
