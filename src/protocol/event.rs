//! Upstream event decoding.
//!
//! One `data:` payload becomes a [`DecodedEvent`]: at most one text delta plus
//! any citation records the event carries. Providers have shipped several
//! event schemas over time, so text is taken from the first [`TextShape`] in
//! priority order that yields a non-empty string, and citations are gathered
//! from every known citation-bearing field.
//!
//! Payloads that are not valid JSON are rejected with `None`. Callers treat
//! that as "ignore and continue": split or garbled lines are expected on a
//! best-effort stream and are only counted.

use serde_json::Value;
use smallvec::SmallVec;

use crate::stream::citations::{CitationRecord, CitationSource};

/// Normalized content of one upstream event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedEvent {
    pub text: Option<String>,
    pub citations: SmallVec<[CitationRecord; 2]>,
}

impl DecodedEvent {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.citations.is_empty()
    }
}

/// Text-bearing event shapes, checked in [`TextShape::PRIORITY`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextShape {
    /// `{"type":"response.output_text.delta","delta":"…"}` or an untyped
    /// event whose `delta` is a string.
    OutputTextDelta,
    /// `{"delta":{"content":"…"}}`
    DeltaContent,
    /// `{"content":"…"}`
    TopLevelContent,
    /// `{"choices":[{"delta":{"content":"…"}}]}`
    LegacyChoice,
}

impl TextShape {
    pub const PRIORITY: [TextShape; 4] = [
        TextShape::OutputTextDelta,
        TextShape::DeltaContent,
        TextShape::TopLevelContent,
        TextShape::LegacyChoice,
    ];

    #[must_use]
    pub fn extract(self, event: &Value) -> Option<&str> {
        match self {
            TextShape::OutputTextDelta => {
                let delta = event.get("delta")?.as_str()?;
                match event.get("type").and_then(Value::as_str) {
                    None => Some(delta),
                    Some(kind) if kind.ends_with("output_text.delta") => Some(delta),
                    Some(_) => None,
                }
            }
            TextShape::DeltaContent => event.get("delta")?.get("content")?.as_str(),
            TextShape::TopLevelContent => event.get("content")?.as_str(),
            TextShape::LegacyChoice => first_choice(event)?
                .get("delta")?
                .get("content")?
                .as_str(),
        }
    }
}

/// Decode one data-line payload. `None` means the payload was not JSON.
#[must_use]
pub fn decode_event_payload(payload: &str) -> Option<DecodedEvent> {
    let event: Value = serde_json::from_str(payload).ok()?;
    Some(decode_event(&event))
}

#[must_use]
pub fn decode_event(event: &Value) -> DecodedEvent {
    let text = extract_text_delta(event).map(str::to_owned);
    let mut citations = SmallVec::new();
    collect_citations(event, &mut citations);
    DecodedEvent { text, citations }
}

#[must_use]
pub fn extract_text_delta(event: &Value) -> Option<&str> {
    TextShape::PRIORITY
        .iter()
        .find_map(|shape| shape.extract(event).filter(|text| !text.is_empty()))
}

#[inline]
fn first_choice(event: &Value) -> Option<&Value> {
    event.get("choices")?.get(0)
}

// ---------------------------------------------------------------------------
// Citation shapes
// ---------------------------------------------------------------------------

/// Gather citation records from every known citation-bearing field of
/// `event`. Unrecognized entries are skipped.
pub fn collect_citations<E>(event: &Value, out: &mut E)
where
    E: Extend<CitationRecord>,
{
    let choice = first_choice(event);
    let choice_delta = choice.and_then(|c| c.get("delta"));
    let choice_message = choice.and_then(|c| c.get("message"));

    // Bare citation lists: the delta-level list wins over the top-level one.
    let citation_list = choice_delta
        .and_then(|d| d.get("citations"))
        .filter(|v| is_non_empty_array(v))
        .or_else(|| event.get("citations"));
    if let Some(list) = citation_list.and_then(Value::as_array) {
        out.extend(list.iter().filter_map(citation_list_entry));
    }

    for holder in [Some(event), choice_delta, choice_message].into_iter().flatten() {
        if let Some(results) = holder.get("search_results").and_then(Value::as_array) {
            out.extend(
                results
                    .iter()
                    .filter_map(|r| object_record(r, CitationSource::SearchResult)),
            );
        }
        collect_annotation_array(holder.get("annotations"), out);
    }

    if let Some(delta) = event.get("delta").filter(|d| d.is_object()) {
        collect_annotation_array(delta.get("annotations"), out);
    }
    if let Some(annotation) = event.get("annotation") {
        out.extend(annotation_record(annotation));
    }
    if let Some(part) = event.get("part") {
        collect_annotation_array(part.get("annotations"), out);
    }
    if let Some(item) = event.get("item") {
        collect_output_item(item, out);
    }
    if let Some(items) = event.get("output").and_then(Value::as_array) {
        for item in items {
            collect_output_item(item, out);
        }
    }
    if let Some(items) = event
        .get("response")
        .and_then(|r| r.get("output"))
        .and_then(Value::as_array)
    {
        for item in items {
            collect_output_item(item, out);
        }
    }
}

fn is_non_empty_array(value: &Value) -> bool {
    value.as_array().is_some_and(|a| !a.is_empty())
}

fn citation_list_entry(entry: &Value) -> Option<CitationRecord> {
    match entry {
        Value::String(url) => CitationRecord::new(url, None, CitationSource::CitationList),
        Value::Object(_) => object_record(entry, CitationSource::CitationList),
        _ => None,
    }
}

fn object_record(value: &Value, source: CitationSource) -> Option<CitationRecord> {
    let url = value.get("url")?.as_str()?;
    let title = value.get("title").and_then(Value::as_str);
    CitationRecord::new(url, title, source)
}

fn collect_annotation_array<E>(annotations: Option<&Value>, out: &mut E)
where
    E: Extend<CitationRecord>,
{
    if let Some(list) = annotations.and_then(Value::as_array) {
        out.extend(list.iter().filter_map(annotation_record));
    }
}

/// `{"type":"url_citation","url_citation":{"url","title"}}` (chat completions)
/// or the flat `{"type":"url_citation","url","title"}` (responses).
fn annotation_record(annotation: &Value) -> Option<CitationRecord> {
    if let Some(nested) = annotation.get("url_citation") {
        return object_record(nested, CitationSource::Annotation);
    }
    match annotation.get("type").and_then(Value::as_str) {
        Some("url_citation") => object_record(annotation, CitationSource::Annotation),
        _ => None,
    }
}

/// Output items from responses-style events: assistant messages carry
/// annotations on their content parts, web search tool calls carry sources.
fn collect_output_item<E>(item: &Value, out: &mut E)
where
    E: Extend<CitationRecord>,
{
    match item.get("type").and_then(Value::as_str) {
        Some("web_search_call") => {
            let sources = item
                .get("action")
                .and_then(|a| a.get("sources"))
                .and_then(Value::as_array);
            let results = item.get("results").and_then(Value::as_array);
            for entry in sources.into_iter().chain(results).flatten() {
                out.extend(object_record(entry, CitationSource::WebSearchTool));
            }
        }
        Some("message") | None => {
            if let Some(parts) = item.get("content").and_then(Value::as_array) {
                for part in parts {
                    collect_annotation_array(part.get("annotations"), out);
                }
            }
        }
        Some(_) => {}
    }
}
