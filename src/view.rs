//! Result of one capture request as shown to the user and copied to the clipboard.

use std::fmt;

use crate::prompt::OutputMode;
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultView {
    Table(Table),
    Text(String),
    /// Request failed; shown in place of the result.
    Error(String),
}

impl ResultView {
    /// Turns the model's answer into the view for `mode`.
    pub fn from_response(mode: OutputMode, raw: &str) -> Self {
        let body = strip_code_fence(raw);
        match mode {
            OutputMode::Excel => Self::Table(Table::normalize(body)),
            OutputMode::Docs => Self::Text(body.to_string()),
        }
    }

    pub fn from_error(err: impl fmt::Display) -> Self {
        Self::Error(format!("Error: {err}"))
    }

    /// What the copy action puts on the clipboard. Errors are not copyable.
    pub fn clipboard_text(&self) -> Option<String> {
        match self {
            Self::Table(table) => Some(table.to_tsv()),
            Self::Text(text) => Some(text.clone()),
            Self::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for ResultView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(table) => write!(f, "{table}"),
            Self::Text(text) => f.write_str(text),
            Self::Error(message) => f.write_str(message),
        }
    }
}

/// Removes a surrounding Markdown code fence (```` ```excel ````, ```` ```tsv ````, ...) that
/// models sometimes wrap their answer in. Tabs are never trimmed: a leading tab is an empty cell.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut body = raw.trim_matches(is_padding);
    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.find('\n') {
            // opening line holds only the info string
            Some(newline) if !rest[..newline].contains('\t') => &rest[newline + 1..],
            _ => rest,
        };
    }
    if let Some(rest) = body.trim_end_matches(is_padding).strip_suffix("```") {
        body = rest;
    }
    body.trim_matches(is_padding)
}

fn is_padding(c: char) -> bool {
    c.is_whitespace() && c != '\t'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excel_response_becomes_table() {
        let view = ResultView::from_response(OutputMode::Excel, "```excel\na\tb\nc\n```");
        let ResultView::Table(table) = &view else {
            panic!("expected table, got {view:?}");
        };
        assert_eq!(table.row_count(), 2);
        assert_eq!(view.clipboard_text().as_deref(), Some("a\tb\nc\t"));
    }

    #[test]
    fn test_docs_response_is_trimmed_text() {
        let view = ResultView::from_response(OutputMode::Docs, "\n  Hello\nworld  \n");
        assert_eq!(view, ResultView::Text("Hello\nworld".into()));
    }

    #[test]
    fn test_error_not_copyable() {
        let view = ResultView::from_error("HTTP 401 Unauthorized: Invalid credentials");
        assert!(view.is_error());
        assert_eq!(view.clipboard_text(), None);
        assert_eq!(
            view.to_string(),
            "Error: HTTP 401 Unauthorized: Invalid credentials"
        );
    }

    #[test]
    fn test_strip_code_fence_variants() {
        assert_eq!(strip_code_fence("```\nx\ty\n```"), "x\ty");
        assert_eq!(strip_code_fence("```tsv\nx\ty\n```\n"), "x\ty");
        assert_eq!(strip_code_fence("```x\ty```"), "x\ty");
        assert_eq!(strip_code_fence("plain\ttext"), "plain\ttext");
    }

    #[test]
    fn test_strip_code_fence_keeps_leading_tab() {
        assert_eq!(strip_code_fence("\tb\nc\td"), "\tb\nc\td");
    }
}
