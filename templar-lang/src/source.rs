//! Source text bookkeeping: named sources with line lookup, and the
//! indentation normalization used before re-parsing a nested definition.

use std::sync::Arc;

/// A named piece of script text
#[derive(Debug)]
pub struct Source {
    name: Arc<str>,
    text: Arc<str>,
    line_starts: Vec<usize>,
}

impl Source {
    pub fn new(name: impl Into<Arc<str>>, text: impl Into<Arc<str>>) -> Arc<Self> {
        let text: Arc<str> = text.into();
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Arc::new(Self {
            name: name.into(),
            text,
            line_starts,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> usize {
        if self.text.ends_with('\n') {
            self.line_starts.len() - 1
        } else {
            self.line_starts.len()
        }
    }

    /// A single line (1-based) without its terminator
    pub fn line(&self, line: u32) -> Option<&str> {
        let index = (line as usize).checked_sub(1)?;
        let start = *self.line_starts.get(index)?;
        if start >= self.text.len() && index > 0 {
            return None;
        }
        let end = self
            .line_starts
            .get(index + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        Some(self.text[start..end].trim_end_matches('\r'))
    }

    /// Lines `first..=last` (1-based) joined with newlines, with a trailing newline
    pub fn lines(&self, first: u32, last: u32) -> Option<String> {
        if first == 0 || last < first {
            return None;
        }
        let mut out = String::new();
        for line in first..=last {
            out.push_str(self.line(line)?);
            out.push('\n');
        }
        Some(out)
    }
}

/// Remove the common leading whitespace of all non-blank lines.
///
/// Whitespace-only lines are normalized to empty lines.
pub fn dedent(text: &str) -> String {
    let margin = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if line.trim().is_empty() {
            out.push('\n');
        } else {
            out.push_str(&line[margin..]);
            out.push('\n');
        }
    }
    out
}
