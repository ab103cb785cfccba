//! Upstream byte stream to answer text plus collected citations.

use tracing::trace;

use crate::observability::DecodeStats;
use crate::protocol::event::decode_event_payload;

use super::citations::{CitationAccumulator, CitationPolicy, CitationRecord, ReferenceBlock};
use super::sse::{classify_line, LineFramer, SseLine};

/// Request-scoped decode state: line framer, citation accumulator and
/// counters. Text deltas are appended to the caller's buffer in arrival
/// order so they can be forwarded without waiting for the stream to end.
#[derive(Debug, Default)]
pub struct ResponsePipeline {
    framer: LineFramer,
    accumulator: CitationAccumulator,
    stats: DecodeStats,
    terminated: bool,
}

impl ResponsePipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one upstream chunk. Decoded text is appended to `out`.
    pub fn push_chunk(&mut self, chunk: &[u8], out: &mut String) {
        if self.terminated {
            return;
        }
        let Self {
            framer,
            accumulator,
            stats,
            terminated,
        } = self;
        framer.push(chunk, |line| {
            handle_line(line, accumulator, stats, terminated, out);
        });
    }

    /// End of upstream input: process a final unterminated line.
    pub fn finish_input(&mut self, out: &mut String) {
        if self.terminated {
            return;
        }
        if let Some(line) = self.framer.finish() {
            handle_line(
                &line,
                &mut self.accumulator,
                &mut self.stats,
                &mut self.terminated,
                out,
            );
        }
    }

    /// Whether a `[DONE]` marker has been seen.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    #[must_use]
    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    #[cfg(test)]
    pub(crate) fn citation_count(&self) -> usize {
        self.accumulator.len()
    }

    /// Add citations obtained outside the event stream, e.g. from a
    /// non-streaming fallback body.
    pub fn add_citations<I: IntoIterator<Item = CitationRecord>>(&mut self, records: I) {
        for record in records {
            self.stats.citations_seen += 1;
            self.accumulator.push(record);
        }
    }

    #[must_use]
    pub fn reference_block(&self, policy: &CitationPolicy) -> Option<ReferenceBlock> {
        self.accumulator.finish(policy)
    }
}

fn handle_line(
    line: &str,
    accumulator: &mut CitationAccumulator,
    stats: &mut DecodeStats,
    terminated: &mut bool,
    out: &mut String,
) {
    // Anything after [DONE] inside the same chunk is ignored too.
    if *terminated {
        return;
    }
    match classify_line(line) {
        SseLine::Blank => {}
        SseLine::Other => stats.ignored_lines += 1,
        SseLine::Done => {
            stats.done_markers += 1;
            *terminated = true;
        }
        SseLine::Data(payload) => {
            stats.data_lines += 1;
            let Some(event) = decode_event_payload(payload) else {
                stats.dropped_payloads += 1;
                trace!(payload_len = payload.len(), "dropped undecodable data line");
                return;
            };
            stats.decoded_events += 1;
            if let Some(text) = event.text {
                stats.text_deltas += 1;
                stats.text_bytes += text.len() as u64;
                out.push_str(&text);
            }
            stats.citations_seen += event.citations.len() as u64;
            accumulator.extend(event.citations);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&[u8]]) -> (String, ResponsePipeline) {
        let mut pipeline = ResponsePipeline::new();
        let mut out = String::new();
        for chunk in chunks {
            pipeline.push_chunk(chunk, &mut out);
        }
        pipeline.finish_input(&mut out);
        (out, pipeline)
    }

    #[test]
    fn test_text_in_arrival_order() {
        let (out, pipeline) = run(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            b"data: [DONE]\n\n",
        ]);
        assert_eq!(out, "Hello");
        assert!(pipeline.is_terminated());
        assert_eq!(pipeline.stats().text_deltas, 2);
        assert_eq!(pipeline.stats().done_markers, 1);
    }

    #[test]
    fn test_lines_after_done_are_ignored() {
        let (out, pipeline) = run(&[
            b"data: {\"content\":\"a\"}\ndata: [DONE]\ndata: {\"content\":\"b\"}\n",
            b"data: {\"content\":\"c\"}\n",
        ]);
        assert_eq!(out, "a");
        assert_eq!(pipeline.stats().data_lines, 1);
    }

    #[test]
    fn test_malformed_payload_counted_and_skipped() {
        let (out, pipeline) = run(&[
            b"data: {\"content\":\"ok\"}\n",
            b"data: {broken\n",
            b": keep-alive\n",
            b"data: {\"content\":\"!\"}\n",
        ]);
        assert_eq!(out, "ok!");
        assert_eq!(pipeline.stats().dropped_payloads, 1);
        assert_eq!(pipeline.stats().ignored_lines, 1);
        assert!(pipeline.stats().has_dropped_payloads());
    }

    #[test]
    fn test_unterminated_final_line_processed() {
        let (out, pipeline) = run(&[b"data: {\"content\":\"x\"}\n", b"data: {\"content\":\"y\"}"]);
        assert_eq!(out, "xy");
        assert!(!pipeline.is_terminated());
    }

    #[test]
    fn test_citations_accumulated_across_events() {
        let (out, pipeline) = run(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}],\"citations\":[\"https://a.edu/p\"]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"\"}}],\"citations\":[\"https://a.edu/p\"]}\n\n",
            b"data: [DONE]\n",
        ]);
        assert_eq!(out, "Hello");
        assert_eq!(pipeline.stats().citations_seen, 2);
        assert_eq!(pipeline.citation_count(), 1);
        let block = pipeline
            .reference_block(&CitationPolicy::from_config(&crate::config::CitationConfig {
                exclude_domains: Vec::new(),
                trusted_domains: Vec::new(),
                ..crate::config::CitationConfig::default()
            }))
            .unwrap();
        assert_eq!(block.render(), "\n\n참고문헌:\n- [1] https://a.edu/p");
    }

    #[test]
    fn test_repeated_citation_lists_do_not_grow_held_records() {
        let urls: Vec<String> = (0..5).map(|i| format!("https://site{i}.org/doc")).collect();
        let search_results: Vec<serde_json::Value> = urls
            .iter()
            .map(|url| serde_json::json!({"url": url, "title": "Doc"}))
            .collect();
        let event = serde_json::json!({
            "choices": [{"delta": {"content": "."}}],
            "citations": urls,
            "search_results": search_results,
        });
        let line = format!("data: {event}\n\n");

        let mut pipeline = ResponsePipeline::new();
        let mut out = String::new();
        for _ in 0..2000 {
            pipeline.push_chunk(line.as_bytes(), &mut out);
        }
        pipeline.finish_input(&mut out);

        assert_eq!(out.len(), 2000);
        assert_eq!(pipeline.stats().citations_seen, 2000 * 10);
        assert_eq!(pipeline.citation_count(), 10);
        let block = pipeline.reference_block(&CitationPolicy::default()).unwrap();
        assert_eq!(block.entry_count(), 5);
    }

    #[test]
    fn test_byte_at_a_time_matches_whole() {
        let input = "data: {\"delta\":\"안녕\"}\n\ndata: {\"delta\":\"하세요\"}\n\ndata: [DONE]\n".as_bytes();
        let (whole, _) = run(&[input]);
        let chunks: Vec<&[u8]> = input.chunks(1).collect();
        let (split, _) = run(&chunks);
        assert_eq!(whole, "안녕하세요");
        assert_eq!(split, whole);
    }
}
