//! Bounded textual views of a conversation for decision prompts
//!
//! Rendering is a pure function of its inputs: the same history and window
//! always produce byte-identical output.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::agents::domain::Message;

/// Substituted for an empty history so prompts are never degenerate
pub const EMPTY_HISTORY_PLACEHOLDER: &str = "(no messages yet)";

/// Marks the cut point when older context is dropped
pub const TRUNCATION_MARKER: &str = "...";

/// How much of the history a view includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextWindow {
    /// Every message
    Full,
    /// Only the most recent N messages
    Last(usize),
}

impl From<Option<usize>> for ContextWindow {
    fn from(size: Option<usize>) -> Self {
        size.map_or(ContextWindow::Full, ContextWindow::Last)
    }
}

impl ContextWindow {
    fn slice<'a>(&self, history: &'a [Message]) -> &'a [Message] {
        match *self {
            ContextWindow::Full => history,
            ContextWindow::Last(n) => &history[history.len().saturating_sub(n)..],
        }
    }
}

/// Renders history as `role: text` lines under a size bound
#[derive(Debug, Clone)]
pub struct ConversationContext {
    max_chars: usize,
    sanitize: bool,
}

impl ConversationContext {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            sanitize: false,
        }
    }

    /// Enable or disable the redaction pass
    pub fn with_sanitizer(mut self, enabled: bool) -> Self {
        self.sanitize = enabled;
        self
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Render the window for inclusion in a prompt
    pub fn build(&self, history: &[Message], window: ContextWindow) -> String {
        let rendered = render_lines(window.slice(history));
        let rendered = if self.sanitize {
            sanitize(&rendered).into_owned()
        } else {
            rendered
        };
        truncate(rendered, self.max_chars)
    }

    /// Render the window without redaction or truncation
    pub fn build_raw(&self, history: &[Message], window: ContextWindow) -> String {
        render_lines(window.slice(history))
    }
}

fn render_lines(messages: &[Message]) -> String {
    if messages.is_empty() {
        return EMPTY_HISTORY_PLACEHOLDER.to_string();
    }
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep the newest `max_chars` characters; the oldest are dropped
fn truncate(text: String, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let start = text
        .char_indices()
        .nth(total - max_chars)
        .map_or(text.len(), |(idx, _)| idx);
    format!("{}{}", TRUNCATION_MARKER, &text[start..])
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap()
});
static SSN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{4}[ -]?){3}\d{4}\b").unwrap());
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[ .-]?)?\(?\b\d{3}\)?[ .-]?\d{3}[ .-]\d{4}\b").unwrap()
});
static ACCOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:acc(?:ount)?[ #:-]*\d+|\d{8,12})\b").unwrap()
});
static TRIGGER_WORDS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\bfraudulent\b", "suspicious"),
        (r"(?i)\bfraud\b", "security concern"),
        (r"(?i)\bscam(?:med)?\b", "suspicious activity"),
        (r"(?i)\bhacked\b", "compromised"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

/// Best-effort redaction to reduce spurious content-filter rejections
///
/// Not a security boundary: anything the patterns miss reaches the model.
pub fn sanitize(text: &str) -> Cow<'_, str> {
    let redactions: [(&Regex, &str); 5] = [
        (&*EMAIL, "[EMAIL]"),
        (&*SSN, "[SSN]"),
        (&*CARD, "[CARD]"),
        (&*PHONE, "[PHONE]"),
        (&*ACCOUNT, "[ACCOUNT]"),
    ];

    let mut out = Cow::Borrowed(text);
    for (pattern, replacement) in redactions {
        if pattern.is_match(&out) {
            out = Cow::Owned(pattern.replace_all(&out, replacement).into_owned());
        }
    }
    for (pattern, replacement) in TRIGGER_WORDS.iter() {
        if pattern.is_match(&out) {
            out = Cow::Owned(pattern.replace_all(&out, *replacement).into_owned());
        }
    }
    out
}
