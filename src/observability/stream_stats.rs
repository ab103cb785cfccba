use std::time::Duration;

use tracing::debug;

/// Per-response decode counters. Dropped payloads are the only signal that
/// upstream sent something the decoder could not read, so they are kept
/// separate from ignored non-data lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub data_lines: u64,
    pub done_markers: u64,
    pub decoded_events: u64,
    pub dropped_payloads: u64,
    pub text_deltas: u64,
    pub text_bytes: u64,
    pub citations_seen: u64,
    pub ignored_lines: u64,
}

impl DecodeStats {
    #[cfg(test)]
    pub(crate) fn has_dropped_payloads(&self) -> bool {
        self.dropped_payloads > 0
    }
}

/// Log the summary of a finished response at debug level.
pub fn log_stream_complete(
    request_id: &str,
    stats: &DecodeStats,
    references: usize,
    elapsed: Duration,
) {
    debug!(
        request_id,
        data_lines = stats.data_lines,
        decoded = stats.decoded_events,
        dropped = stats.dropped_payloads,
        text_deltas = stats.text_deltas,
        text_bytes = stats.text_bytes,
        citations_seen = stats.citations_seen,
        references,
        elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        "stream complete"
    );
}
