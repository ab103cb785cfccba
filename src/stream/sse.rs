/// SSE line framing for upstream chat-completions streams.
///
/// Upstream bodies arrive in chunks split at arbitrary byte offsets, including
/// inside multi-byte UTF-8 sequences. [`LineFramer`] decodes incrementally and
/// hands out complete `\n`-terminated lines; [`classify_line`] decides what a
/// line carries.
use memchr::memchr_iter;

const REPLACEMENT: char = '\u{FFFD}';

/// Incremental UTF-8 decoder plus line splitter.
///
/// State is the undecoded byte tail of the previous chunk and the text after
/// the last newline.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending_bytes: Vec<u8>,
    remainder: String,
}

impl LineFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and invoke `on_line` for every completed line, in order.
    ///
    /// A trailing `\r` is stripped from each line.
    pub fn push<F>(&mut self, chunk: &[u8], mut on_line: F)
    where
        F: FnMut(&str),
    {
        if self.pending_bytes.is_empty() {
            let tail = decode_utf8_prefix(chunk, &mut self.remainder);
            self.pending_bytes.extend_from_slice(tail);
        } else {
            self.pending_bytes.extend_from_slice(chunk);
            let bytes = std::mem::take(&mut self.pending_bytes);
            let tail = decode_utf8_prefix(&bytes, &mut self.remainder);
            self.pending_bytes.extend_from_slice(tail);
        }
        self.drain_lines(&mut on_line);
    }

    /// End of input: flush the undecoded tail and return the unterminated
    /// last line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending_bytes.is_empty() {
            let bytes = std::mem::take(&mut self.pending_bytes);
            self.remainder.push_str(&String::from_utf8_lossy(&bytes));
        }
        let mut line = std::mem::take(&mut self.remainder);
        if line.ends_with('\r') {
            line.pop();
        }
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }

    #[cfg(test)]
    pub(crate) fn buffered_len(&self) -> usize {
        self.pending_bytes.len() + self.remainder.len()
    }

    fn drain_lines<F>(&mut self, on_line: &mut F)
    where
        F: FnMut(&str),
    {
        let mut line_start = 0usize;
        for newline in memchr_iter(b'\n', self.remainder.as_bytes()) {
            let mut line = &self.remainder[line_start..newline];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            on_line(line);
            line_start = newline + 1;
        }
        if line_start == self.remainder.len() {
            self.remainder.clear();
        } else if line_start > 0 {
            self.remainder.drain(..line_start);
        }
    }
}

/// Decode as much of `bytes` as forms complete UTF-8 into `out`, replacing
/// invalid sequences with U+FFFD. Returns the incomplete tail to carry over.
fn decode_utf8_prefix<'a>(mut bytes: &'a [u8], out: &mut String) -> &'a [u8] {
    loop {
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                out.push_str(text);
                return &[];
            }
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                let (valid, rest) = bytes.split_at(valid_up_to);
                if let Ok(text) = std::str::from_utf8(valid) {
                    out.push_str(text);
                }
                match err.error_len() {
                    Some(invalid_len) => {
                        out.push(REPLACEMENT);
                        bytes = &rest[invalid_len..];
                    }
                    None => return rest,
                }
            }
        }
    }
}

/// What a single framed line carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// Empty or whitespace-only line (event separator).
    Blank,
    /// `data: [DONE]` in any casing or spacing.
    Done,
    /// Payload after `data:` with leading whitespace removed.
    Data(&'a str),
    /// `event:`, `id:`, comments and anything else.
    Other,
}

#[must_use]
pub fn classify_line(line: &str) -> SseLine<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return SseLine::Blank;
    }
    if is_done_marker(trimmed) {
        return SseLine::Done;
    }
    match line.strip_prefix("data:") {
        Some(payload) => SseLine::Data(payload.trim_start()),
        None => SseLine::Other,
    }
}

/// Case-insensitive, whitespace-tolerant `data:[DONE]` / `data: [DONE]` match.
#[must_use]
pub fn is_done_marker(line: &str) -> bool {
    let trimmed = line.trim();
    let Some(prefix) = trimmed.get(..5) else {
        return false;
    };
    if !prefix.eq_ignore_ascii_case("data:") {
        return false;
    }
    trimmed[5..].trim().eq_ignore_ascii_case("[DONE]")
}
