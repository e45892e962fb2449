//! Uniform diagnostics shared by every pipeline stage.

use serde::Serialize;
use std::fmt;

/// Pipeline stage a diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Pp,
    Lex,
    Parse,
    Sema,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pp => "pp",
            Stage::Lex => "lex",
            Stage::Parse => "parse",
            Stage::Sema => "sema",
        };
        write!(f, "{}", name)
    }
}

/// One reportable problem. Human format is `file:line:col: stage: message`,
/// with the `line:col` segment omitted when no position is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub filename: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Diagnostic {
    pub fn new(stage: Stage, filename: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            stage,
            filename: filename.into(),
            message: message.into(),
            line: None,
            column: None,
            code: None,
        }
    }

    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(
                f,
                "{}:{}:{}: {}: {}",
                self.filename, line, column, self.stage, self.message
            ),
            _ => write!(f, "{}: {}: {}", self.filename, self.stage, self.message),
        }
    }
}

/// Terminal error of the frontend pipeline: a single diagnostic tagged with
/// the stage that produced it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct FrontendError(pub Diagnostic);

impl FrontendError {
    pub fn diagnostic(&self) -> &Diagnostic {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_format_with_location() {
        let diag = Diagnostic::new(Stage::Lex, "bad.c", "oops").with_location(2, 3);
        assert_eq!(diag.to_string(), "bad.c:2:3: lex: oops");
    }

    #[test]
    fn test_human_format_without_location() {
        let diag = Diagnostic::new(Stage::Sema, "bad.c", "oops");
        assert_eq!(diag.to_string(), "bad.c: sema: oops");
    }

    #[test]
    fn test_json_format_skips_absent_fields() {
        let diag = Diagnostic::new(Stage::Sema, "bad.c", "oops");
        let json = serde_json::to_string(&diag).unwrap();
        assert_eq!(
            json,
            r#"{"stage":"sema","filename":"bad.c","message":"oops"}"#
        );
    }

    #[test]
    fn test_json_format_with_code() {
        let diag = Diagnostic::new(Stage::Pp, "main.c", "Include not found: <x.h>")
            .with_location(1, 1)
            .with_code("XCC-PP-0102");
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains(r#""code":"XCC-PP-0102""#));
        assert!(json.contains(r#""line":1"#));
    }

    #[test]
    fn test_frontend_error_displays_diagnostic() {
        let err = FrontendError(Diagnostic::new(Stage::Parse, "x.c", "Expected ';'").with_location(4, 9));
        assert_eq!(err.to_string(), "x.c:4:9: parse: Expected ';'");
    }
}
