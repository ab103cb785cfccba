//! Citation linker for rendered answers.
//!
//! A finished answer is `main text` + optional reference section (the block
//! appended by the output composer). The linker splits the two, builds the
//! `n -> url` map from the reference lines and rewrites `[n]` markers in the
//! main text as links. Markers without a matching reference stay literal.

use regex_lite::{Captures, Regex};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// How markers and the reference section are presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// `[n]` becomes the markdown link `[[n]](url)`; references are kept.
    #[default]
    Links,
    /// `[n]` becomes a superscript HTML link icon; references are dropped
    /// and single newlines are doubled into paragraphs.
    Superscript,
    /// Markers are linked as in `Links`; references are dropped.
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedMessage {
    pub main: String,
    pub references: Option<String>,
}

pub struct CitationLinker {
    section: Regex,
    titled_line: Regex,
    bare_line: Regex,
    marker: Regex,
    mode: DisplayMode,
}

impl CitationLinker {
    /// Linker that recognizes `header` (and `References:`) as the start of
    /// the reference section.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error; with an escaped header this only
    /// happens if the pattern exceeds the size limit.
    pub fn new(header: &str, mode: DisplayMode) -> Result<Self, regex_lite::Error> {
        let header = header.trim();
        let section = if header.is_empty() || header.eq_ignore_ascii_case("References:") {
            Regex::new(r"(?i)\n{1,2}References:")?
        } else {
            Regex::new(&format!(
                r"(?i)\n{{1,2}}(?:{}|References:)",
                regex_lite::escape(header)
            ))?
        };
        Ok(Self {
            section,
            titled_line: Regex::new(r"^-\s*\[(\d+)\]\s*\[[^\]]*\]\(([^)\s]+)\)")?,
            bare_line: Regex::new(r"^-\s*\[(\d+)\]\s+(\S+)\s*$")?,
            marker: Regex::new(r"\[(\d+)\]")?,
            mode,
        })
    }

    #[must_use]
    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// Split `text` at the reference section. The section is returned
    /// without its leading newlines.
    #[must_use]
    pub fn split_references<'t>(&self, text: &'t str) -> (&'t str, Option<&'t str>) {
        match self.section.find(text) {
            Some(found) => (
                &text[..found.start()],
                Some(text[found.start()..].trim_start_matches('\n')),
            ),
            None => (text, None),
        }
    }

    /// `n -> url` for every reference line, titled (`- [n] [title](url)`) or
    /// bare (`- [n] url`). The first line for a number wins.
    #[must_use]
    pub fn build_citation_map(&self, references: &str) -> FxHashMap<String, String> {
        let mut map = FxHashMap::default();
        for line in references.lines() {
            let line = line.trim();
            let caps = self
                .titled_line
                .captures(line)
                .or_else(|| self.bare_line.captures(line));
            if let Some(caps) = caps {
                map.entry(caps[1].to_string())
                    .or_insert_with(|| caps[2].to_string());
            }
        }
        map
    }

    /// Rewrite `[n]` markers in `main` according to the display mode.
    #[must_use]
    pub fn link_markers(&self, main: &str, citations: &FxHashMap<String, String>) -> String {
        self.marker
            .replace_all(main, |caps: &Captures<'_>| {
                let number = &caps[1];
                match citations.get(number) {
                    Some(url) => match self.mode {
                        DisplayMode::Superscript => superscript_link(number, url),
                        DisplayMode::Links | DisplayMode::Hidden => {
                            format!("[[{number}]]({url})")
                        }
                    },
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Full pass over one assistant message.
    #[must_use]
    pub fn render(&self, text: &str) -> LinkedMessage {
        let (main, references) = self.split_references(text);
        let citations = references
            .map(|section| self.build_citation_map(section))
            .unwrap_or_default();
        let linked = self.link_markers(main, &citations);
        match self.mode {
            DisplayMode::Links => LinkedMessage {
                main: linked,
                references: references.map(str::to_string),
            },
            DisplayMode::Superscript => LinkedMessage {
                main: double_single_newlines(&linked),
                references: None,
            },
            DisplayMode::Hidden => LinkedMessage {
                main: linked,
                references: None,
            },
        }
    }
}

fn superscript_link(number: &str, url: &str) -> String {
    let digits: String = number.chars().map(superscript_digit).collect();
    let href = url.replace('"', "%22");
    format!(
        "<sup><a href=\"{href}\" target=\"_blank\" rel=\"noopener noreferrer\">🔗{digits}</a></sup>"
    )
}

fn superscript_digit(c: char) -> char {
    match c {
        '0' => '⁰',
        '1' => '¹',
        '2' => '²',
        '3' => '³',
        '4' => '⁴',
        '5' => '⁵',
        '6' => '⁶',
        '7' => '⁷',
        '8' => '⁸',
        '9' => '⁹',
        other => other,
    }
}

/// Every `\n` directly followed by a non-newline character becomes `\n\n`.
fn double_single_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 16);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '\n' && chars.peek().is_some_and(|next| *next != '\n') {
            out.push('\n');
        }
    }
    out
}
