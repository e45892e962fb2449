//! Shared lexer for the translation and preprocessor phases.
//!
//! The same scanner serves both pipelines: in translation mode keywords are
//! recognized and numeric literals classified; in preprocessor mode numerics
//! stay untyped `PPNumber` tokens and header names are recognized on request
//! (the caller knows whether the current directive is an `#include`).

use regex::Regex;
use std::sync::OnceLock;

/// Third character of a `??X` trigraph and its replacement.
const TRIGRAPHS: &[(char, char)] = &[
    ('=', '#'),
    ('/', '\\'),
    ('\'', '^'),
    ('(', '['),
    (')', ']'),
    ('!', '|'),
    ('<', '{'),
    ('>', '}'),
    ('-', '~'),
];

/// C11 keywords plus the `__extension__` marker.
const KEYWORDS: &[&str] = &[
    "auto",
    "break",
    "case",
    "char",
    "const",
    "continue",
    "default",
    "do",
    "double",
    "else",
    "enum",
    "extern",
    "float",
    "for",
    "goto",
    "if",
    "inline",
    "int",
    "long",
    "register",
    "restrict",
    "return",
    "short",
    "signed",
    "sizeof",
    "static",
    "struct",
    "switch",
    "typedef",
    "union",
    "unsigned",
    "void",
    "volatile",
    "while",
    "_Alignas",
    "_Alignof",
    "_Atomic",
    "_Bool",
    "_Complex",
    "_Generic",
    "_Imaginary",
    "_Noreturn",
    "_Static_assert",
    "_Thread_local",
    "__extension__",
];

/// Full punctuator set, longest first so matching is longest-match.
const PUNCTUATORS: &[&str] = &[
    "%:%:", "...", ">>=", "<<=", "->", "++", "--", "&&", "||", "<=", ">=", "==", "!=", "+=", "-=",
    "*=", "/=", "%=", "&=", "|=", "^=", "<<", ">>", "##", "<:", ":>", "<%", "%>", "%:", "[", "]",
    "(", ")", "{", "}", ".", "&", "*", "+", "-", "~", "!", "/", "%", "<", ">", "^", "|", "?", ":",
    ";", "=", ",", "#",
];

const SIMPLE_ESCAPES: &[char] = &['\'', '"', '?', '\\', 'a', 'b', 'f', 'n', 'r', 't', 'v'];

fn decimal_float_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?:[0-9]+\.[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+)[fFlL]?$",
        )
        .expect("decimal float pattern")
    })
}

fn hex_float_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^0[xX](?:(?:[0-9A-Fa-f]+\.[0-9A-Fa-f]*|\.[0-9A-Fa-f]+)|[0-9A-Fa-f]+)[pP][+-]?[0-9]+[fFlL]?$",
        )
        .expect("hex float pattern")
    })
}

fn integer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:[1-9][0-9]*|0[0-7]*|0[xX][0-9A-Fa-f]+)(?:[uU](?:ll|LL|[lL])?|(?:ll|LL|[lL])[uU]?)?$",
        )
        .expect("integer pattern")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Keyword,
    Ident,
    IntConst,
    FloatConst,
    CharConst,
    StringLiteral,
    Punctuator,
    HeaderName,
    PPNumber,
    Eof,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Keyword => "KEYWORD",
            TokenKind::Ident => "IDENT",
            TokenKind::IntConst => "INT_CONST",
            TokenKind::FloatConst => "FLOAT_CONST",
            TokenKind::CharConst => "CHAR_CONST",
            TokenKind::StringLiteral => "STRING_LITERAL",
            TokenKind::Punctuator => "PUNCTUATOR",
            TokenKind::HeaderName => "HEADER_NAME",
            TokenKind::PPNumber => "PP_NUMBER",
            TokenKind::Eof => "EOF",
        }
    }
}

/// One token; `lexeme` is `None` only for EOF. Line and column are 1-based
/// and refer to the post-translation buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, lexeme: Option<String>, line: usize, column: usize) -> Self {
        Token {
            kind,
            lexeme,
            line,
            column,
        }
    }

    pub fn is_punct(&self, value: &str) -> bool {
        self.kind == TokenKind::Punctuator && self.lexeme.as_deref() == Some(value)
    }

    pub fn is_keyword(&self, value: &str) -> bool {
        self.kind == TokenKind::Keyword && self.lexeme.as_deref() == Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at {line}:{column}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl LexerError {
    fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        LexerError {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Translation phases 1 and 2: normalize line endings, replace trigraphs,
/// splice backslash-newline pairs.
pub fn translate_source(source: &str) -> String {
    let normalized = source.replace("\r\n", "\n").replace('\r', "\n");
    splice_lines(&replace_trigraphs(&normalized))
}

fn replace_trigraphs(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '?' && i + 2 < chars.len() && chars[i + 1] == '?' {
            if let Some(&(_, replacement)) =
                TRIGRAPHS.iter().find(|(third, _)| *third == chars[i + 2])
            {
                out.push(replacement);
                i += 3;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn splice_lines(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() && chars[i + 1] == '\n' {
            i += 2;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Tokenize in translation mode.
pub fn lex(source: &str) -> Result<Vec<Token>, LexerError> {
    Lexer::new(source, LexMode::Translation, false).tokenize()
}

/// Tokenize in preprocessor mode, optionally recognizing header names.
pub fn lex_pp(source: &str, header_names: bool) -> Result<Vec<Token>, LexerError> {
    Lexer::new(source, LexMode::Preprocessor, header_names).tokenize()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexMode {
    Translation,
    Preprocessor,
}

struct Lexer {
    source: Vec<char>,
    index: usize,
    line: usize,
    column: usize,
    mode: LexMode,
    header_names: bool,
}

impl Lexer {
    fn new(source: &str, mode: LexMode, header_names: bool) -> Self {
        Lexer {
            source: translate_source(source).chars().collect(),
            index: 0,
            line: 1,
            column: 1,
            mode,
            header_names,
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            if self.eof() {
                tokens.push(Token::new(TokenKind::Eof, None, self.line, self.column));
                return Ok(tokens);
            }
            let start_line = self.line;
            let start_column = self.column;
            if self.mode == LexMode::Preprocessor && self.header_names {
                if let Some(header_name) = self.maybe_read_header_name()? {
                    tokens.push(Token::new(
                        TokenKind::HeaderName,
                        Some(header_name),
                        start_line,
                        start_column,
                    ));
                    continue;
                }
            }
            if let Some((kind, lexeme)) = self.maybe_read_literal()? {
                tokens.push(Token::new(kind, Some(lexeme), start_line, start_column));
                continue;
            }
            if self.is_number_start() {
                let lexeme = self.read_pp_number()?;
                let kind = if self.mode == LexMode::Preprocessor {
                    TokenKind::PPNumber
                } else {
                    classify_number(&lexeme, start_line, start_column)?
                };
                tokens.push(Token::new(kind, Some(lexeme), start_line, start_column));
                continue;
            }
            if self.is_identifier_start() {
                let lexeme = self.read_identifier()?;
                let kind = if self.mode == LexMode::Translation
                    && KEYWORDS.contains(&lexeme.as_str())
                {
                    TokenKind::Keyword
                } else {
                    TokenKind::Ident
                };
                tokens.push(Token::new(kind, Some(lexeme), start_line, start_column));
                continue;
            }
            let punct = self.read_punctuator(start_line, start_column)?;
            tokens.push(Token::new(
                TokenKind::Punctuator,
                Some(punct),
                start_line,
                start_column,
            ));
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.source.get(self.index + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek(0)?;
        self.index += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn eof(&self) -> bool {
        self.index >= self.source.len()
    }

    fn error<T>(&self, message: &str) -> Result<T, LexerError> {
        Err(LexerError::new(message, self.line, self.column))
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexerError> {
        loop {
            match self.peek(0) {
                Some(ch) if matches!(ch, ' ' | '\t' | '\x0b' | '\x0c' | '\n') => {
                    self.advance();
                }
                Some('/') if self.peek(1) == Some('/') => {
                    self.advance();
                    self.advance();
                    while let Some(ch) = self.peek(0) {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    let mut terminated = false;
                    while !self.eof() {
                        if self.peek(0) == Some('*') && self.peek(1) == Some('/') {
                            self.advance();
                            self.advance();
                            terminated = true;
                            break;
                        }
                        self.advance();
                    }
                    if !terminated {
                        return self.error("Unterminated block comment");
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn is_identifier_start(&self) -> bool {
        match self.peek(0) {
            Some('_') => true,
            Some(ch) if ch.is_alphabetic() => true,
            Some('\\') => matches!(self.peek(1), Some('u') | Some('U')),
            _ => false,
        }
    }

    fn is_identifier_part(&self) -> bool {
        match self.peek(0) {
            Some('_') => true,
            Some(ch) if ch.is_alphabetic() || ch.is_ascii_digit() => true,
            Some('\\') => matches!(self.peek(1), Some('u') | Some('U')),
            _ => false,
        }
    }

    fn read_identifier(&mut self) -> Result<String, LexerError> {
        let start = self.index;
        if !self.is_identifier_start() {
            return self.error("Expected identifier");
        }
        self.read_identifier_char(true)?;
        while !self.eof() && self.is_identifier_part() {
            self.read_identifier_char(false)?;
        }
        Ok(self.source[start..self.index].iter().collect())
    }

    fn read_identifier_char(&mut self, initial: bool) -> Result<(), LexerError> {
        match self.peek(0) {
            Some('\\') if matches!(self.peek(1), Some('u') | Some('U')) => {
                self.read_ucn()?;
                Ok(())
            }
            Some('_') => {
                self.advance();
                Ok(())
            }
            Some(ch) if ch.is_alphabetic() || (!initial && ch.is_ascii_digit()) => {
                self.advance();
                Ok(())
            }
            _ => self.error("Invalid identifier character"),
        }
    }

    fn read_ucn(&mut self) -> Result<(), LexerError> {
        if self.advance() != Some('\\') {
            return self.error("Expected universal character name");
        }
        match self.advance() {
            Some(kind @ ('u' | 'U')) => self.read_ucn_digits(kind),
            _ => self.error("Invalid universal character name"),
        }
    }

    fn read_ucn_digits(&mut self, kind: char) -> Result<(), LexerError> {
        let count = if kind == 'u' { 4 } else { 8 };
        let mut value: u32 = 0;
        for _ in 0..count {
            let digit = match self.peek(0) {
                Some(ch) if ch.is_ascii_hexdigit() => ch,
                _ => return self.error("Invalid universal character name"),
            };
            self.advance();
            value = value.wrapping_mul(16) + digit.to_digit(16).expect("hex digit");
        }
        if value > 0x0010_FFFF {
            return self.error("Invalid universal character name");
        }
        if value < 0x00A0 && !matches!(value, 0x0024 | 0x0040 | 0x0060) {
            return self.error("Invalid universal character name");
        }
        if (0xD800..=0xDFFF).contains(&value) {
            return self.error("Invalid universal character name");
        }
        Ok(())
    }

    fn maybe_read_literal(&mut self) -> Result<Option<(TokenKind, String)>, LexerError> {
        let start = self.index;
        match self.peek(0) {
            Some('"') => Ok(Some((
                TokenKind::StringLiteral,
                self.read_string_literal(start)?,
            ))),
            Some('\'') => Ok(Some((
                TokenKind::CharConst,
                self.read_char_constant(start)?,
            ))),
            Some('u') if self.peek(1) == Some('8') && self.peek(2) == Some('"') => {
                self.advance();
                self.advance();
                Ok(Some((
                    TokenKind::StringLiteral,
                    self.read_string_literal(start)?,
                )))
            }
            Some('u' | 'U' | 'L') if matches!(self.peek(1), Some('"') | Some('\'')) => {
                self.advance();
                if self.peek(0) == Some('"') {
                    Ok(Some((
                        TokenKind::StringLiteral,
                        self.read_string_literal(start)?,
                    )))
                } else {
                    Ok(Some((
                        TokenKind::CharConst,
                        self.read_char_constant(start)?,
                    )))
                }
            }
            _ => Ok(None),
        }
    }

    fn read_string_literal(&mut self, start: usize) -> Result<String, LexerError> {
        if self.peek(0) != Some('"') {
            return self.error("Expected string literal");
        }
        self.advance();
        while let Some(ch) = self.advance() {
            if ch == '"' {
                return Ok(self.source[start..self.index].iter().collect());
            }
            if ch == '\n' {
                return self.error("Unterminated string literal");
            }
            if ch == '\\' {
                self.read_escape_sequence()?;
            }
        }
        self.error("Unterminated string literal")
    }

    fn read_char_constant(&mut self, start: usize) -> Result<String, LexerError> {
        if self.peek(0) != Some('\'') {
            return self.error("Expected character constant");
        }
        self.advance();
        if self.peek(0) == Some('\'') {
            return self.error("Empty character constant");
        }
        while let Some(ch) = self.advance() {
            if ch == '\'' {
                return Ok(self.source[start..self.index].iter().collect());
            }
            if ch == '\n' {
                return self.error("Unterminated character constant");
            }
            if ch == '\\' {
                self.read_escape_sequence()?;
            }
        }
        self.error("Unterminated character constant")
    }

    fn read_escape_sequence(&mut self) -> Result<(), LexerError> {
        match self.peek(0) {
            Some(ch) if SIMPLE_ESCAPES.contains(&ch) => {
                self.advance();
                Ok(())
            }
            Some('x') => {
                self.advance();
                if !matches!(self.peek(0), Some(ch) if ch.is_ascii_hexdigit()) {
                    return self.error("Invalid hexadecimal escape");
                }
                while matches!(self.peek(0), Some(ch) if ch.is_ascii_hexdigit()) {
                    self.advance();
                }
                Ok(())
            }
            Some('u' | 'U') => {
                let kind = self.advance().expect("escape kind");
                self.read_ucn_digits(kind)
            }
            Some(ch) if ('0'..='7').contains(&ch) => {
                self.advance();
                if matches!(self.peek(0), Some(ch) if ('0'..='7').contains(&ch)) {
                    self.advance();
                    if matches!(self.peek(0), Some(ch) if ('0'..='7').contains(&ch)) {
                        self.advance();
                    }
                }
                Ok(())
            }
            _ => self.error("Invalid escape sequence"),
        }
    }

    fn is_number_start(&self) -> bool {
        match self.peek(0) {
            Some(ch) if ch.is_ascii_digit() => true,
            Some('.') => matches!(self.peek(1), Some(ch) if ch.is_ascii_digit()),
            _ => false,
        }
    }

    fn read_pp_number(&mut self) -> Result<String, LexerError> {
        let start = self.index;
        self.advance();
        loop {
            let ch = match self.peek(0) {
                Some(ch) => ch,
                None => break,
            };
            let next_ch = self.peek(1);
            if matches!(ch, 'e' | 'E' | 'p' | 'P') && matches!(next_ch, Some('+') | Some('-')) {
                self.advance();
                self.advance();
                continue;
            }
            if ch.is_ascii_digit() || ch == '.' || ch == '_' || ch.is_alphabetic() {
                self.advance();
                continue;
            }
            if ch == '\\' && matches!(next_ch, Some('u') | Some('U')) {
                self.read_ucn()?;
                continue;
            }
            break;
        }
        Ok(self.source[start..self.index].iter().collect())
    }

    fn read_punctuator(&mut self, line: usize, column: usize) -> Result<String, LexerError> {
        for punct in PUNCTUATORS {
            if self.source_starts_with(punct) {
                self.index += punct.len();
                self.column += punct.len();
                return Ok((*punct).to_string());
            }
        }
        Err(LexerError::new("Unexpected character", line, column))
    }

    fn source_starts_with(&self, text: &str) -> bool {
        let mut offset = 0;
        for ch in text.chars() {
            if self.peek(offset) != Some(ch) {
                return false;
            }
            offset += 1;
        }
        true
    }

    fn maybe_read_header_name(&mut self) -> Result<Option<String>, LexerError> {
        let end_char = match self.peek(0) {
            Some('<') => '>',
            Some('"') => '"',
            _ => return Ok(None),
        };
        let start = self.index;
        self.advance();
        while !self.eof() {
            match self.peek(0) {
                Some('\n') => return self.error("Unterminated header name"),
                Some(ch) if ch == end_char => {
                    self.advance();
                    return Ok(Some(self.source[start..self.index].iter().collect()));
                }
                Some('\'' | '\\') => return self.error("Invalid header name"),
                Some('/') if matches!(self.peek(1), Some('/') | Some('*')) => {
                    return self.error("Invalid header name");
                }
                _ => {
                    self.advance();
                }
            }
        }
        self.error("Unterminated header name")
    }
}

fn classify_number(lexeme: &str, line: usize, column: usize) -> Result<TokenKind, LexerError> {
    if hex_float_re().is_match(lexeme) || decimal_float_re().is_match(lexeme) {
        return Ok(TokenKind::FloatConst);
    }
    if integer_re().is_match(lexeme) {
        return Ok(TokenKind::IntConst);
    }
    Err(LexerError::new("Invalid numeric constant", line, column))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexemes(tokens: &[Token]) -> Vec<Option<&str>> {
        tokens.iter().map(|t| t.lexeme.as_deref()).collect()
    }

    #[test]
    fn test_translate_trigraphs_and_splice() {
        assert_eq!(translate_source("??=x"), "#x");
        assert_eq!(translate_source("a\\\n b"), "a b");
        assert_eq!(translate_source("??/\n"), "");
    }

    #[test]
    fn test_translate_newlines() {
        assert_eq!(translate_source("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_basic_tokens() {
        let tokens = lex("int main(){return 42;}").unwrap();
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword,
                TokenKind::Ident,
                TokenKind::Punctuator,
                TokenKind::Punctuator,
                TokenKind::Punctuator,
                TokenKind::Keyword,
                TokenKind::IntConst,
                TokenKind::Punctuator,
                TokenKind::Punctuator,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            lexemes(&tokens),
            vec![
                Some("int"),
                Some("main"),
                Some("("),
                Some(")"),
                Some("{"),
                Some("return"),
                Some("42"),
                Some(";"),
                Some("}"),
                None,
            ]
        );
    }

    #[test]
    fn test_keyword_vs_identifier() {
        let tokens = lex("_Alignas alignas").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
        assert_eq!(tokens[1].kind, TokenKind::Ident);
    }

    #[test]
    fn test_extension_marker_keyword() {
        let tokens = lex("__extension__ ext").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
        assert_eq!(tokens[1].kind, TokenKind::Ident);
    }

    #[test]
    fn test_comments_and_whitespace() {
        let tokens = lex("int /*c*/\n// line\nmain() {return 0;}").unwrap();
        assert_eq!(tokens[0].lexeme.as_deref(), Some("int"));
        assert_eq!(tokens[1].lexeme.as_deref(), Some("main"));
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn test_spliced_line_comment() {
        let tokens = lex("//\\\nint").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
    }

    #[test]
    fn test_unterminated_comment() {
        assert!(lex("/*").is_err());
    }

    #[test]
    fn test_punctuators() {
        let tokens = lex("a>>=1;").unwrap();
        assert!(tokens.iter().any(|t| t.is_punct(">>=")));
    }

    #[test]
    fn test_digraphs() {
        let tokens = lex("<: :> <% %> %: %:%:").unwrap();
        let punct: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Punctuator)
            .map(|t| t.lexeme.as_deref().unwrap())
            .collect();
        assert_eq!(punct, vec!["<:", ":>", "<%", "%>", "%:", "%:%:"]);
    }

    #[test]
    fn test_identifier_with_ucn() {
        let tokens = lex("\\u00A0_name").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[0].lexeme.as_deref(), Some("\\u00A0_name"));
    }

    #[test]
    fn test_identifier_with_ucn_allowed_low() {
        let tokens = lex("\\u0040id").unwrap();
        assert_eq!(tokens[0].lexeme.as_deref(), Some("\\u0040id"));
    }

    #[test]
    fn test_ucn_invalid_forms() {
        for source in ["\\u12G4", "\\u0001", "\\uD800", "\\U00110000"] {
            assert!(lex(source).is_err(), "expected error for {source}");
        }
    }

    #[test]
    fn test_string_prefixes() {
        let tokens = lex(r#""a" u8"b" u"c" U"d" L"e""#).unwrap();
        let strings: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::StringLiteral)
            .map(|t| t.lexeme.as_deref().unwrap())
            .collect();
        assert_eq!(strings, vec![r#""a""#, r#"u8"b""#, r#"u"c""#, r#"U"d""#, r#"L"e""#]);
    }

    #[test]
    fn test_string_escapes() {
        let source = "\"\\n\\t\\r\\0\\a\\b\\f\\v\\?\\\\\\\"\\x41\\u00A0\"";
        let tokens = lex(source).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
    }

    #[test]
    fn test_invalid_escapes() {
        assert!(lex(r#""\q""#).is_err());
        assert!(lex("\"\\xZ\"").is_err());
    }

    #[test]
    fn test_string_newline_error() {
        assert!(lex("\"line1\nline2\"").is_err());
    }

    #[test]
    fn test_char_constants() {
        let tokens = lex("'a' L'\\n' u'\\x41' U'\\u00A0' 'ab'").unwrap();
        let chars: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::CharConst)
            .map(|t| t.lexeme.as_deref().unwrap())
            .collect();
        assert_eq!(chars, vec!["'a'", "L'\\n'", "u'\\x41'", "U'\\u00A0'", "'ab'"]);
    }

    #[test]
    fn test_char_errors() {
        assert!(lex("''").is_err());
        assert!(lex("'a").is_err());
        assert!(lex("'a\n'").is_err());
    }

    #[test]
    fn test_octal_escape_lengths() {
        let tokens = lex(r#""\1" "\12" "\123""#).unwrap();
        let count = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::StringLiteral)
            .count();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_integer_constants() {
        let tokens = lex("0 7 077 0x1f 123u 456UL 789llu 42LL 5lU").unwrap();
        let ints: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::IntConst)
            .map(|t| t.lexeme.as_deref().unwrap())
            .collect();
        assert_eq!(
            ints,
            vec!["0", "7", "077", "0x1f", "123u", "456UL", "789llu", "42LL", "5lU"]
        );
    }

    #[test]
    fn test_floating_constants() {
        let tokens = lex("1.0 .5 1. 1e3 1e-3 1.2e+3 0x1p2 0x1.2p+3 0x.8p-1 1.0f 2.0L").unwrap();
        let floats: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::FloatConst)
            .map(|t| t.lexeme.as_deref().unwrap())
            .collect();
        assert_eq!(
            floats,
            vec![
                "1.0", ".5", "1.", "1e3", "1e-3", "1.2e+3", "0x1p2", "0x1.2p+3", "0x.8p-1",
                "1.0f", "2.0L",
            ]
        );
    }

    #[test]
    fn test_invalid_numbers() {
        for text in ["0x", "08", "1e", "1f", "0x1p"] {
            assert!(lex(text).is_err(), "expected error for {text}");
        }
    }

    #[test]
    fn test_pp_numbers() {
        let tokens = lex_pp("1e+2 1E-2 .1e+2 1abc 0x1p+2", false).unwrap();
        assert!(
            tokens
                .iter()
                .all(|t| matches!(t.kind, TokenKind::PPNumber | TokenKind::Eof))
        );
        assert_eq!(tokens[0].lexeme.as_deref(), Some("1e+2"));
    }

    #[test]
    fn test_pp_numbers_with_ucn() {
        let tokens = lex_pp("1\\u00A0", false).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::PPNumber);
    }

    #[test]
    fn test_header_name() {
        let tokens = lex_pp("<stdio.h>", true).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::HeaderName);
        assert_eq!(tokens[0].lexeme.as_deref(), Some("<stdio.h>"));
    }

    #[test]
    fn test_header_name_skipped() {
        let tokens = lex_pp("int", true).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident);
    }

    #[test]
    fn test_header_name_invalid() {
        for text in ["<a\\b>", "<a/*b>", "\"a//b\"", "<a\nb>", "<a"] {
            assert!(lex_pp(text, true).is_err(), "expected error for {text}");
        }
    }

    #[test]
    fn test_unexpected_character() {
        let err = lex("@").unwrap_err();
        assert_eq!(err.message, "Unexpected character");
        assert_eq!((err.line, err.column), (1, 1));
    }
}
