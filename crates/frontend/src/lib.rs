//! xcc frontend library
//!
//! Turns C11/GNU11 source text into a validated translation unit: the
//! preprocessed source with its line map, the token stream, the AST, and the
//! semantic model (symbol tables plus per-expression types).
//!
//! # Pipeline
//!
//! `compile_source` runs preprocess → lex → parse → analyze. Any stage
//! failure becomes a [`FrontendError`] carrying one [`Diagnostic`] tagged
//! with the originating stage; positions that refer to the preprocessed
//! buffer are mapped back to the original file and line through the
//! preprocessor's line map.
//!
//! ```rust,ignore
//! use xcc::{FrontendOptions, compile_source};
//!
//! let result = compile_source("int main(){return 0;}", "main.c", &FrontendOptions::default())?;
//! assert!(result.sema.functions.contains_key("main"));
//! ```

pub mod ast;
pub mod diag;
pub mod lexer;
pub mod options;
pub mod parser;
pub mod preprocessor;
pub mod sema;
pub mod types;

pub use ast::TranslationUnit;
pub use diag::{Diagnostic, FrontendError, Stage};
pub use lexer::{LexerError, Token, TokenKind, lex, lex_pp, translate_source};
pub use options::{DiagFormat, FrontendOptions, Std};
pub use parser::{Parser, ParserError, parse};
pub use preprocessor::{PreprocessResult, PreprocessorError, preprocess_source};
pub use sema::{Analyzer, SemaError, SemaUnit, analyze};
pub use types::{Type, TypeOp};

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Everything the frontend produces for one successful compilation.
#[derive(Debug)]
pub struct FrontendResult {
    pub filename: String,
    /// The preprocessed source the later stages consumed.
    pub source: String,
    pub tokens: Vec<Token>,
    pub unit: TranslationUnit,
    pub sema: SemaUnit,
}

/// Read an input path, with `-` meaning stdin (reported as `<stdin>`).
pub fn read_source(path: &str) -> io::Result<(String, String)> {
    if path == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        return Ok(("<stdin>".to_string(), buffer));
    }
    let source = fs::read_to_string(path)?;
    Ok((path.to_string(), source))
}

/// Run the full pipeline over one source buffer.
pub fn compile_source(
    source: &str,
    filename: &str,
    options: &FrontendOptions,
) -> Result<FrontendResult, FrontendError> {
    debug!(file = filename, std = %options.std, "compiling");
    let preprocessed = preprocess_source(source, filename, options)
        .map_err(|error| pp_error_to_frontend(error, filename))?;
    let tokens = lex(&preprocessed.source).map_err(|error| {
        let (mapped_file, mapped_line) = map_line(&preprocessed.line_map, error.line, filename);
        FrontendError(
            Diagnostic::new(Stage::Lex, mapped_file, error.message.clone())
                .with_location(mapped_line, error.column),
        )
    })?;
    let unit = parse(tokens.clone(), options.std).map_err(|error| {
        let (mapped_file, mapped_line) =
            map_line(&preprocessed.line_map, error.token.line, filename);
        FrontendError(
            Diagnostic::new(Stage::Parse, mapped_file, error.message.clone())
                .with_location(mapped_line, error.token.column),
        )
    })?;
    let sema = analyze(&unit)
        .map_err(|error| FrontendError(Diagnostic::new(Stage::Sema, filename, error.message)))?;
    Ok(FrontendResult {
        filename: filename.to_string(),
        source: preprocessed.source,
        tokens,
        unit,
        sema,
    })
}

/// Read a UTF-8 source file and compile it.
pub fn compile_path(
    path: impl AsRef<Path>,
    options: &FrontendOptions,
) -> Result<FrontendResult, FrontendError> {
    let path = path.as_ref();
    let filename = path.to_string_lossy().to_string();
    let source = fs::read_to_string(path).map_err(|error| {
        FrontendError(
            Diagnostic::new(Stage::Pp, filename.clone(), error.to_string())
                .with_code(preprocessor::PP_INCLUDE_READ_ERROR),
        )
    })?;
    compile_source(&source, &filename, options)
}

/// `line:column<TAB>KIND<TAB>lexeme` (lexeme omitted for EOF).
pub fn format_token(token: &Token) -> String {
    match &token.lexeme {
        None => format!("{}:{}\t{}", token.line, token.column, token.kind.as_str()),
        Some(lexeme) => format!(
            "{}:{}\t{}\t{}",
            token.line,
            token.column,
            token.kind.as_str(),
            lexeme
        ),
    }
}

pub fn format_tokens(tokens: &[Token]) -> Vec<String> {
    tokens.iter().map(format_token).collect()
}

fn map_line(line_map: &[(String, usize)], line: usize, fallback: &str) -> (String, usize) {
    match line_map.get(line.saturating_sub(1)) {
        Some((filename, mapped_line)) => (filename.clone(), *mapped_line),
        None => (fallback.to_string(), line),
    }
}

fn pp_error_to_frontend(error: PreprocessorError, filename: &str) -> FrontendError {
    let diag_filename = error.filename.unwrap_or_else(|| filename.to_string());
    let mut diagnostic =
        Diagnostic::new(Stage::Pp, diag_filename, error.message).with_code(error.code);
    diagnostic.line = error.line;
    diagnostic.column = error.column;
    FrontendError(diagnostic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_source_success() {
        let result =
            compile_source("int main(){return 0;}", "sample.c", &FrontendOptions::default())
                .unwrap();
        assert_eq!(result.filename, "sample.c");
        assert_eq!(result.tokens.last().unwrap().kind, TokenKind::Eof);
        assert_eq!(result.unit.functions[0].name, "main");
        assert!(result.sema.functions.contains_key("main"));
    }

    #[test]
    fn test_compile_source_token_stream_shape() {
        let result =
            compile_source("int main(){return 0;}", "sample.c", &FrontendOptions::default())
                .unwrap();
        let lexemes: Vec<Option<&str>> =
            result.tokens.iter().map(|t| t.lexeme.as_deref()).collect();
        assert_eq!(
            lexemes,
            vec![
                Some("int"),
                Some("main"),
                Some("("),
                Some(")"),
                Some("{"),
                Some("return"),
                Some("0"),
                Some(";"),
                Some("}"),
                None,
            ]
        );
    }

    #[test]
    fn test_compile_source_lex_error() {
        let err = compile_source("@", "bad.c", &FrontendOptions::default()).unwrap_err();
        let diagnostic = err.diagnostic();
        assert_eq!(diagnostic.stage, Stage::Lex);
        assert_eq!((diagnostic.line, diagnostic.column), (Some(1), Some(1)));
        assert_eq!(err.to_string(), "bad.c:1:1: lex: Unexpected character");
    }

    #[test]
    fn test_compile_source_parse_error() {
        let err =
            compile_source("int main( {return 0;}", "bad.c", &FrontendOptions::default())
                .unwrap_err();
        let diagnostic = err.diagnostic();
        assert_eq!(diagnostic.stage, Stage::Parse);
        assert_eq!((diagnostic.line, diagnostic.column), (Some(1), Some(11)));
    }

    #[test]
    fn test_compile_source_sema_error() {
        let err =
            compile_source("int main(){return;}", "bad.c", &FrontendOptions::default())
                .unwrap_err();
        let diagnostic = err.diagnostic();
        assert_eq!(diagnostic.stage, Stage::Sema);
        assert_eq!((diagnostic.line, diagnostic.column), (None, None));
        assert_eq!(
            err.to_string(),
            "bad.c: sema: Non-void function must return a value"
        );
    }

    #[test]
    fn test_compile_source_pp_error_carries_code() {
        let err = compile_source(
            "#include \"missing.h\"\n",
            "main.c",
            &FrontendOptions::default(),
        )
        .unwrap_err();
        let diagnostic = err.diagnostic();
        assert_eq!(diagnostic.stage, Stage::Pp);
        assert_eq!(diagnostic.code.as_deref(), Some("XCC-PP-0102"));
        assert_eq!(
            err.to_string(),
            "main.c:1:1: pp: Include not found: \"missing.h\""
        );
    }

    #[test]
    fn test_compile_source_macro_paste_end_to_end() {
        let source = "#define CAT(a,b) a##b\nint hello=1;\nint x=CAT(he,llo);\n";
        let result = compile_source(source, "main.c", &FrontendOptions::default()).unwrap();
        assert!(result.source.contains("int x = hello"));
        assert!(result.sema.functions.is_empty());
        assert_eq!(result.unit.declarations.len(), 2);
    }

    #[test]
    fn test_compile_source_conditional_excludes_code() {
        let source = "#if __has_include(\"missing.h\")\nint bad(){return}\n#endif\nint main(){return 0;}\n";
        let result = compile_source(source, "main.c", &FrontendOptions::default()).unwrap();
        assert!(!result.source.contains("int bad"));
        assert!(result.sema.functions.contains_key("main"));
    }

    #[test]
    fn test_lex_error_in_included_file_maps_to_header() {
        let tmp = tempfile::tempdir().unwrap();
        let header = tmp.path().join("inc.h");
        std::fs::write(&header, "int @;\n").unwrap();
        let main = tmp.path().join("main.c");
        let err = compile_source(
            "#include \"inc.h\"\nint main(){return 0;}\n",
            main.to_str().unwrap(),
            &FrontendOptions::default(),
        )
        .unwrap_err();
        let diagnostic = err.diagnostic();
        assert_eq!(diagnostic.stage, Stage::Lex);
        assert!(diagnostic.filename.ends_with("inc.h"));
        assert_eq!(diagnostic.line, Some(1));
    }

    #[test]
    fn test_gnu_statement_expression_end_to_end() {
        let source = "int main(){return ({ 1; });}";
        assert!(compile_source(source, "x.c", &FrontendOptions::default()).is_err());
        let gnu = FrontendOptions::new().with_std(Std::Gnu11);
        assert!(compile_source(source, "x.c", &gnu).is_ok());
    }

    #[test]
    fn test_compile_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ok.c");
        std::fs::write(&path, "int main(){return 0;}").unwrap();
        let result = compile_path(&path, &FrontendOptions::default()).unwrap();
        assert_eq!(result.filename, path.to_string_lossy());
        assert_eq!(result.unit.functions[0].name, "main");
    }

    #[test]
    fn test_compile_path_missing_file() {
        let err = compile_path("/nonexistent/missing.c", &FrontendOptions::default())
            .unwrap_err();
        let diagnostic = err.diagnostic();
        assert_eq!(diagnostic.stage, Stage::Pp);
        assert_eq!(diagnostic.code.as_deref(), Some("XCC-PP-0301"));
    }

    #[test]
    fn test_read_source_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ok.c");
        std::fs::write(&path, "int main(){return 0;}").unwrap();
        let (filename, source) = read_source(path.to_str().unwrap()).unwrap();
        assert_eq!(filename, path.to_string_lossy());
        assert_eq!(source, "int main(){return 0;}");
    }

    #[test]
    fn test_format_token() {
        let result =
            compile_source("int main(){return 0;}", "<input>", &FrontendOptions::default())
                .unwrap();
        assert_eq!(format_token(&result.tokens[0]), "1:1\tKEYWORD\tint");
        assert_eq!(
            format_token(result.tokens.last().unwrap()),
            "1:22\tEOF"
        );
    }
}
