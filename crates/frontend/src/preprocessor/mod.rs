//! The preprocessor driver.
//!
//! A line-oriented loop over the translated source: directives are parsed and
//! dispatched, conditional regions tracked on a stack, and every consumed
//! input line accounted for in the output so the line map stays parallel to
//! the output buffer. Directive lines are replaced by blank lines; include
//! expansions are inserted inline with their own line-map segments.

mod cond;
mod include;
mod macros;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use tracing::{debug, warn};

use crate::lexer::{TokenKind, translate_source};
use crate::options::FrontendOptions;

use cond::{
    collapse_function_invocations, evaluate_condition_tokens, strip_condition_comments,
    tokenize_expr,
};
use include::{parse_direct_header, resolve_include};
use macros::{
    Macro, MacroToken, expand_macro_tokens, is_identifier, macro_table_line, parse_macro_parameters,
    quote_string_literal, render_macro_tokens, tokenize_macro_replacement, tokenize_macro_text,
};

pub const PP_UNKNOWN_DIRECTIVE: &str = "XCC-PP-0101";
pub const PP_INCLUDE_NOT_FOUND: &str = "XCC-PP-0102";
pub const PP_INVALID_IF_EXPR: &str = "XCC-PP-0103";
pub const PP_INVALID_DIRECTIVE: &str = "XCC-PP-0104";
pub const PP_GNU_EXTENSION: &str = "XCC-PP-0105";
pub const PP_INVALID_MACRO: &str = "XCC-PP-0201";
pub const PP_INCLUDE_READ_ERROR: &str = "XCC-PP-0301";
pub const PP_INCLUDE_CYCLE: &str = "XCC-PP-0302";

const PREDEFINED_MACROS: &[&str] = &[
    "__STDC__=1",
    "__STDC_HOSTED__=1",
    "__STDC_VERSION__=201112L",
    "__STDC_UTF_16__=1",
    "__STDC_UTF_32__=1",
    "__INT_WIDTH__=32",
    "__LONG_WIDTH__=64",
    "__LONG_LONG_WIDTH__=64",
    "__INTMAX_MAX__=9223372036854775807LL",
    "__LONG_LONG_MAX__=9223372036854775807LL",
    "__UINTMAX_MAX__=18446744073709551615ULL",
    "__LP64__=1",
    "__SIZEOF_POINTER__=8",
    "__SIZEOF_LONG__=8",
    "__SIZE_TYPE__=unsigned long",
    "__PTRDIFF_TYPE__=long",
    "__FILE__=0",
    "__LINE__=0",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessorError {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub filename: Option<String>,
    pub code: &'static str,
}

impl PreprocessorError {
    pub(crate) fn at(
        message: impl Into<String>,
        location: &SourceLocation,
        code: &'static str,
    ) -> Self {
        PreprocessorError {
            message: message.into(),
            line: Some(location.line),
            column: Some(1),
            filename: Some(location.filename.clone()),
            code,
        }
    }

    pub(crate) fn bare(message: impl Into<String>, code: &'static str) -> Self {
        PreprocessorError {
            message: message.into(),
            line: None,
            column: None,
            filename: None,
            code,
        }
    }
}

impl fmt::Display for PreprocessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => match &self.filename {
                Some(filename) => {
                    write!(f, "{} at {}:{}:{}", self.message, filename, line, column)
                }
                None => write!(f, "{} at {}:{}", self.message, line, column),
            },
            _ => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for PreprocessorError {}

/// Result of preprocessing one compilation's input.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    pub source: String,
    /// One `(filename, line)` entry per output line.
    pub line_map: Vec<(String, usize)>,
    /// `"includer:line: #include <name> -> /resolved/path"` in encounter order.
    pub include_trace: Vec<String>,
    /// `NAME=body` / `NAME(params)=body` lines, sorted by macro name.
    pub macro_table: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceLocation {
    pub filename: String,
    pub line: usize,
}

#[derive(Debug, Default)]
struct LineMapBuilder {
    entries: Vec<(String, usize)>,
}

impl LineMapBuilder {
    fn append_line(&mut self, text: &str, location: &SourceLocation) {
        if !text.is_empty() {
            self.entries.push((location.filename.clone(), location.line));
        }
    }

    fn extend(&mut self, mappings: Vec<(String, usize)>) {
        self.entries.extend(mappings);
    }
}

#[derive(Debug, Default)]
struct OutputBuilder {
    chunks: String,
    line_map: LineMapBuilder,
}

#[derive(Debug, Clone)]
struct ProcessedText {
    source: String,
    line_map: Vec<(String, usize)>,
}

impl OutputBuilder {
    fn new() -> Self {
        OutputBuilder::default()
    }

    fn append(&mut self, text: &str, location: &SourceLocation) {
        self.chunks.push_str(text);
        self.line_map.append_line(text, location);
    }

    fn extend_processed(&mut self, processed: ProcessedText) {
        self.chunks.push_str(&processed.source);
        self.line_map.extend(processed.line_map);
    }

    fn build(self) -> ProcessedText {
        ProcessedText {
            source: self.chunks,
            line_map: self.line_map.entries,
        }
    }
}

/// Logical `(filename, line)` cursor; `#line` rebases it.
#[derive(Debug)]
struct LogicalCursor {
    filename: String,
    line: usize,
}

impl LogicalCursor {
    fn new(filename: &str) -> Self {
        LogicalCursor {
            filename: filename.to_string(),
            line: 1,
        }
    }

    fn current(&self) -> SourceLocation {
        SourceLocation {
            filename: self.filename.clone(),
            line: self.line,
        }
    }

    fn advance(&mut self, count: usize) {
        self.line += count;
    }

    fn rebase(&mut self, line: usize, filename: Option<String>) {
        self.line = line;
        if let Some(filename) = filename {
            self.filename = filename;
        }
    }
}

/// Pinned locations for every physical line of a (possibly continued)
/// directive, taken before the cursor advances past it.
#[derive(Debug)]
struct DirectiveCursor {
    locations: Vec<SourceLocation>,
}

impl DirectiveCursor {
    fn new(cursor: &LogicalCursor, count: usize) -> Self {
        DirectiveCursor {
            locations: (0..count)
                .map(|index| SourceLocation {
                    filename: cursor.filename.clone(),
                    line: cursor.line + index,
                })
                .collect(),
        }
    }

    fn line_location(&self, index: usize) -> &SourceLocation {
        &self.locations[index]
    }

    fn first_location(&self) -> &SourceLocation {
        &self.locations[0]
    }
}

#[derive(Debug)]
struct ConditionalFrame {
    parent_active: bool,
    active: bool,
    branch_taken: bool,
    saw_else: bool,
}

fn is_active(stack: &[ConditionalFrame]) -> bool {
    stack.iter().all(|frame| frame.active)
}

fn blank_line(line: &str) -> &'static str {
    if line.ends_with('\n') { "\n" } else { "" }
}

fn directive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*#\s*([A-Za-z_][A-Za-z0-9_]*)(.*)$").expect("directive pattern")
    })
}

fn defined_paren_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bdefined\s*\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*\)").expect("defined() pattern")
    })
}

fn defined_bare_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bdefined\s+([A-Za-z_][A-Za-z0-9_]*)").expect("defined pattern")
    })
}

fn line_directive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^([0-9]+)(?:\s+("(?:[^"\n]|\\.)*"))?\s*$"#).expect("#line pattern")
    })
}

fn asm_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:__asm__|__asm|asm)\b").expect("asm prefix pattern"))
}

fn asm_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:__asm__|__asm|asm)\s*\([^;\n]*\)").expect("asm label pattern")
    })
}

fn parse_directive(line: &str) -> Option<(String, String)> {
    if !line.trim_start().starts_with('#') {
        return None;
    }
    let trimmed = line.strip_suffix('\n').unwrap_or(line);
    let captures = directive_re().captures(trimmed)?;
    Some((captures[1].to_string(), captures[2].to_string()))
}

/// Run the preprocessor over one source buffer.
pub fn preprocess_source(
    source: &str,
    filename: &str,
    options: &FrontendOptions,
) -> Result<PreprocessResult, PreprocessorError> {
    let mut processor = Preprocessor::new(options)?;
    let processed = processor.process(source, filename)?;
    let stripped = if options.std.is_gnu() {
        strip_gnu_asm_extensions(&processed.source)
    } else {
        reject_gnu_asm_extensions(&processed.source, &processed.line_map)?;
        processed.source
    };
    let mut table_entries: Vec<(String, String)> = processor
        .macros
        .values()
        .map(|macro_def| (macro_def.name.clone(), macro_table_line(macro_def)))
        .collect();
    table_entries.sort();
    Ok(PreprocessResult {
        source: stripped,
        line_map: processed.line_map,
        include_trace: processor.include_trace,
        macro_table: table_entries.into_iter().map(|(_, line)| line).collect(),
    })
}

struct Preprocessor<'a> {
    options: &'a FrontendOptions,
    macros: HashMap<String, Macro>,
    pragma_once_files: HashSet<String>,
    include_trace: Vec<String>,
}

impl<'a> Preprocessor<'a> {
    fn new(options: &'a FrontendOptions) -> Result<Self, PreprocessorError> {
        let mut macros = HashMap::new();
        for define in PREDEFINED_MACROS {
            let macro_def = parse_cli_define(define)?;
            macros.insert(macro_def.name.clone(), macro_def);
        }
        if !options.hosted {
            let hosted = parse_cli_define("__STDC_HOSTED__=0")?;
            macros.insert(hosted.name.clone(), hosted);
        }
        let (date, time) = translation_start_date_time();
        macros.insert(
            "__DATE__".to_string(),
            Macro::object_like(
                "__DATE__",
                vec![MacroToken::new(
                    TokenKind::StringLiteral,
                    quote_string_literal(&date),
                )],
            ),
        );
        macros.insert(
            "__TIME__".to_string(),
            Macro::object_like(
                "__TIME__",
                vec![MacroToken::new(
                    TokenKind::StringLiteral,
                    quote_string_literal(&time),
                )],
            ),
        );
        for define in &options.defines {
            let macro_def = parse_cli_define(define).map_err(|_| {
                PreprocessorError::bare(
                    format!("Invalid macro definition: {}", define),
                    PP_INVALID_MACRO,
                )
            })?;
            macros.insert(macro_def.name.clone(), macro_def);
        }
        for name in &options.undefs {
            if !is_identifier(name) {
                return Err(PreprocessorError::bare(
                    format!("Invalid macro name in -U: {}", name),
                    PP_INVALID_MACRO,
                ));
            }
            macros.remove(name);
        }
        Ok(Preprocessor {
            options,
            macros,
            pragma_once_files: HashSet::new(),
            include_trace: Vec::new(),
        })
    }

    fn process(&mut self, source: &str, filename: &str) -> Result<ProcessedText, PreprocessorError> {
        let options = self.options;
        let mut out = OutputBuilder::new();
        for path in &options.macro_includes {
            let name = path.to_string_lossy().to_string();
            let text = read_include_file(path, &name)?;
            debug!(file = %name, "processing macro include");
            self.process_text(&text, &name, &name, path.parent(), &[name.clone()])?;
        }
        for path in &options.forced_includes {
            let name = path.to_string_lossy().to_string();
            let text = read_include_file(path, &name)?;
            debug!(file = %name, "processing forced include");
            let processed = self.process_text(&text, &name, &name, path.parent(), &[name.clone()])?;
            out.extend_processed(processed);
        }
        let translated = translate_source(source);
        let base_dir = source_dir(filename);
        let processed = self.process_text(
            &translated,
            filename,
            filename,
            base_dir.as_deref(),
            &[filename.to_string()],
        )?;
        out.extend_processed(processed);
        Ok(out.build())
    }

    fn process_text(
        &mut self,
        source: &str,
        filename: &str,
        source_id: &str,
        base_dir: Option<&Path>,
        include_stack: &[String],
    ) -> Result<ProcessedText, PreprocessorError> {
        let lines: Vec<&str> = source.split_inclusive('\n').collect();
        if lines.is_empty() {
            return Ok(ProcessedText {
                source: source.to_string(),
                line_map: Vec::new(),
            });
        }
        let mut out = OutputBuilder::new();
        let mut cursor = LogicalCursor::new(filename);
        let mut stack: Vec<ConditionalFrame> = Vec::new();
        let mut line_index = 0;
        while line_index < lines.len() {
            let line = lines[line_index];
            if parse_directive(line).is_none() {
                let location = cursor.current();
                if is_active(&stack) {
                    let expanded = self.expand_line(line, &location)?;
                    out.append(&expanded, &location);
                } else {
                    out.append(blank_line(line), &location);
                }
                cursor.advance(1);
                line_index += 1;
                continue;
            }
            let mut directive_lines = vec![line];
            while directive_lines
                .last()
                .expect("at least one directive line")
                .trim_end()
                .ends_with('\\')
                && line_index + 1 < lines.len()
            {
                line_index += 1;
                directive_lines.push(lines[line_index]);
            }
            let directive_cursor = DirectiveCursor::new(&cursor, directive_lines.len());
            let directive_text: String = directive_lines.concat();
            let (name, body) = match parse_directive(&directive_text) {
                Some(parsed) => parsed,
                None => {
                    append_blank_lines(&mut out, &directive_lines, &directive_cursor);
                    cursor.advance(directive_lines.len());
                    line_index += 1;
                    continue;
                }
            };
            if self.handle_conditional(
                &name,
                &body,
                directive_cursor.first_location(),
                &mut stack,
                base_dir,
            )? {
                append_blank_lines(&mut out, &directive_lines, &directive_cursor);
                cursor.advance(directive_lines.len());
                line_index += 1;
                continue;
            }
            if !is_active(&stack) {
                append_blank_lines(&mut out, &directive_lines, &directive_cursor);
                cursor.advance(directive_lines.len());
                line_index += 1;
                continue;
            }
            match name.as_str() {
                "define" => {
                    self.handle_define(&body);
                    append_blank_lines(&mut out, &directive_lines, &directive_cursor);
                }
                "undef" => {
                    self.handle_undef(&body, directive_cursor.first_location())?;
                    append_blank_lines(&mut out, &directive_lines, &directive_cursor);
                }
                "include" | "include_next" => {
                    if name == "include_next" && !self.options.std.is_gnu() {
                        return Err(PreprocessorError::at(
                            "Unknown preprocessor directive: #include_next",
                            directive_cursor.first_location(),
                            PP_UNKNOWN_DIRECTIVE,
                        ));
                    }
                    let processed = self.handle_include(
                        &body,
                        directive_cursor.first_location(),
                        base_dir,
                        include_stack,
                        name == "include_next",
                    )?;
                    out.extend_processed(processed);
                    for (index, chunk) in directive_lines.iter().enumerate().skip(1) {
                        out.append(blank_line(chunk), directive_cursor.line_location(index));
                    }
                }
                "error" => {
                    let message = body.trim();
                    let message = if message.is_empty() { "#error" } else { message };
                    return Err(PreprocessorError::at(
                        message,
                        directive_cursor.first_location(),
                        PP_INVALID_DIRECTIVE,
                    ));
                }
                "line" => {
                    let (line_value, filename_value) =
                        self.parse_line_directive(&body, directive_cursor.first_location())?;
                    append_blank_lines(&mut out, &directive_lines, &directive_cursor);
                    cursor.rebase(line_value, filename_value);
                    line_index += 1;
                    continue;
                }
                "pragma" => {
                    if body.trim() == "once" {
                        self.pragma_once_files.insert(source_id.to_string());
                    }
                    append_blank_lines(&mut out, &directive_lines, &directive_cursor);
                }
                _ => {
                    if !self.options.std.is_gnu() {
                        return Err(PreprocessorError::at(
                            format!("Unknown preprocessor directive: #{}", name),
                            directive_cursor.first_location(),
                            PP_UNKNOWN_DIRECTIVE,
                        ));
                    }
                    warn!(directive = %name, "ignoring unknown preprocessor directive");
                    if self.options.warn_as_error {
                        return Err(PreprocessorError::at(
                            format!("Unknown preprocessor directive: #{}", name),
                            directive_cursor.first_location(),
                            PP_UNKNOWN_DIRECTIVE,
                        ));
                    }
                    append_blank_lines(&mut out, &directive_lines, &directive_cursor);
                }
            }
            cursor.advance(directive_lines.len());
            line_index += 1;
        }
        if !stack.is_empty() {
            let location = cursor.current();
            return Err(PreprocessorError::at(
                "Unterminated conditional directive",
                &location,
                PP_INVALID_DIRECTIVE,
            ));
        }
        Ok(out.build())
    }

    fn handle_conditional(
        &mut self,
        name: &str,
        body: &str,
        location: &SourceLocation,
        stack: &mut Vec<ConditionalFrame>,
        base_dir: Option<&Path>,
    ) -> Result<bool, PreprocessorError> {
        match name {
            "if" => {
                let parent_active = is_active(stack);
                let condition = if parent_active {
                    self.eval_condition(body, location, base_dir)?
                } else {
                    false
                };
                stack.push(ConditionalFrame {
                    parent_active,
                    active: condition,
                    branch_taken: condition,
                    saw_else: false,
                });
                Ok(true)
            }
            "ifdef" | "ifndef" => {
                let parent_active = is_active(stack);
                let macro_name = self.require_macro_name(body, location)?;
                let defined = self.macros.contains_key(&macro_name);
                let condition = parent_active && if name == "ifdef" { defined } else { !defined };
                stack.push(ConditionalFrame {
                    parent_active,
                    active: condition,
                    branch_taken: condition,
                    saw_else: false,
                });
                Ok(true)
            }
            "elif" => {
                if stack.is_empty() {
                    return Err(PreprocessorError::at(
                        "Unexpected #elif",
                        location,
                        PP_INVALID_DIRECTIVE,
                    ));
                }
                if stack.last().expect("non-empty stack").saw_else {
                    return Err(PreprocessorError::at(
                        "#elif after #else",
                        location,
                        PP_INVALID_DIRECTIVE,
                    ));
                }
                let eligible = {
                    let frame = stack.last().expect("non-empty stack");
                    frame.parent_active && !frame.branch_taken
                };
                if !eligible {
                    stack.last_mut().expect("non-empty stack").active = false;
                    return Ok(true);
                }
                let condition = self.eval_condition(body, location, base_dir)?;
                let frame = stack.last_mut().expect("non-empty stack");
                frame.active = condition;
                frame.branch_taken = frame.branch_taken || condition;
                Ok(true)
            }
            "else" => {
                if stack.is_empty() {
                    return Err(PreprocessorError::at(
                        "Unexpected #else",
                        location,
                        PP_INVALID_DIRECTIVE,
                    ));
                }
                let frame = stack.last_mut().expect("non-empty stack");
                if frame.saw_else {
                    return Err(PreprocessorError::at(
                        "Duplicate #else",
                        location,
                        PP_INVALID_DIRECTIVE,
                    ));
                }
                frame.saw_else = true;
                frame.active = frame.parent_active && !frame.branch_taken;
                frame.branch_taken = true;
                Ok(true)
            }
            "endif" => {
                if stack.is_empty() {
                    return Err(PreprocessorError::at(
                        "Unexpected #endif",
                        location,
                        PP_INVALID_DIRECTIVE,
                    ));
                }
                stack.pop();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn handle_define(&mut self, body: &str) {
        if let Some(macro_def) = self.parse_define(body) {
            debug!(name = %macro_def.name, "defining macro");
            self.macros.insert(macro_def.name.clone(), macro_def);
        }
    }

    /// Parse a `#define` body. `None` means the define is malformed and is
    /// silently ignored.
    fn parse_define(&self, body: &str) -> Option<Macro> {
        let define_body = body.trim_start();
        if define_body.is_empty() {
            return None;
        }
        let name_len = identifier_prefix_len(define_body);
        if name_len == 0 {
            return None;
        }
        let name = &define_body[..name_len];
        let tail = &define_body[name_len..];
        if let Some(param_tail) = tail.strip_prefix('(') {
            let close_index = param_tail.find(')')?;
            let params_text = param_tail[..close_index].trim();
            let replacement = param_tail[close_index + 1..].trim();
            let (parameters, is_variadic) = parse_macro_parameters(params_text)?;
            return Some(Macro {
                name: name.to_string(),
                replacement: tokenize_macro_replacement(replacement),
                parameters: Some(parameters),
                is_variadic,
            });
        }
        Some(Macro::object_like(
            name,
            tokenize_macro_replacement(tail.trim()),
        ))
    }

    fn handle_undef(
        &mut self,
        body: &str,
        location: &SourceLocation,
    ) -> Result<(), PreprocessorError> {
        let macro_name = self.require_macro_name(body, location)?;
        self.macros.remove(&macro_name);
        Ok(())
    }

    fn require_macro_name(
        &self,
        body: &str,
        location: &SourceLocation,
    ) -> Result<String, PreprocessorError> {
        let macro_name = body.trim();
        if !is_identifier(macro_name) {
            return Err(PreprocessorError::at(
                "Expected macro name",
                location,
                PP_INVALID_DIRECTIVE,
            ));
        }
        Ok(macro_name.to_string())
    }

    fn handle_include(
        &mut self,
        body: &str,
        location: &SourceLocation,
        base_dir: Option<&Path>,
        include_stack: &[String],
        include_next: bool,
    ) -> Result<ProcessedText, PreprocessorError> {
        let (include_name, is_angled) = self.parse_header_name_operand(body.trim(), location)?;
        let include_path = resolve_include(
            self.options,
            &include_name,
            is_angled,
            base_dir,
            if include_next { base_dir } else { None },
        );
        let include_path = match include_path {
            Some(include_path) => include_path,
            None => {
                return Err(PreprocessorError::at(
                    format!(
                        "Include not found: {}",
                        format_include_reference(&include_name, is_angled)
                    ),
                    location,
                    PP_INCLUDE_NOT_FOUND,
                ));
            }
        };
        let include_path_text = include_path.to_string_lossy().to_string();
        if self.pragma_once_files.contains(&include_path_text) {
            return Ok(ProcessedText {
                source: String::new(),
                line_map: Vec::new(),
            });
        }
        let includer = include_stack
            .last()
            .map(String::as_str)
            .unwrap_or("<input>");
        self.include_trace.push(format_include_trace(
            includer,
            location.line,
            &include_name,
            &include_path_text,
            is_angled,
        ));
        debug!(header = %include_name, path = %include_path_text, "resolved include");
        if include_stack.contains(&include_path_text) {
            return Err(PreprocessorError::at(
                "Circular include detected",
                location,
                PP_INCLUDE_CYCLE,
            ));
        }
        let include_source = fs::read_to_string(&include_path).map_err(|error| {
            PreprocessorError::at(
                format!("Unable to read include: {}: {}", include_name, error),
                location,
                PP_INCLUDE_READ_ERROR,
            )
        })?;
        let translated = translate_source(&include_source);
        let mut next_stack = include_stack.to_vec();
        next_stack.push(include_path_text.clone());
        self.process_text(
            &translated,
            &include_path_text,
            &include_path_text,
            include_path.parent(),
            &next_stack,
        )
    }

    /// Parse an `#include`/`__has_include` operand: a literal header name, or
    /// macro text expanding to one.
    fn parse_header_name_operand(
        &self,
        operand: &str,
        location: &SourceLocation,
    ) -> Result<(String, bool), PreprocessorError> {
        if let Some(direct) = parse_direct_header(operand) {
            return Ok(direct);
        }
        let expanded = self.expand_macro_text(operand, location)?;
        let expanded = expanded.trim();
        let invalid = || {
            PreprocessorError::at("Invalid #include directive", location, PP_INVALID_DIRECTIVE)
        };
        let tokens = tokenize_macro_text(expanded).ok_or_else(invalid)?;
        if tokens.len() == 1 && tokens[0].kind == TokenKind::StringLiteral {
            let literal = &tokens[0].text;
            return Ok((literal[1..literal.len() - 1].to_string(), false));
        }
        if tokens.len() >= 3
            && tokens[0].kind == TokenKind::Punctuator
            && tokens[tokens.len() - 1].kind == TokenKind::Punctuator
            && tokens[0].text == "<"
            && tokens[tokens.len() - 1].text == ">"
        {
            let name: String = tokens[1..tokens.len() - 1]
                .iter()
                .map(|token| token.text.as_str())
                .collect();
            return Ok((name, true));
        }
        Err(invalid())
    }

    fn eval_condition(
        &self,
        body: &str,
        location: &SourceLocation,
        base_dir: Option<&Path>,
    ) -> Result<bool, PreprocessorError> {
        let condition = strip_condition_comments(body);
        let condition = self.replace_defined(&condition);
        let condition = self.replace_has_include_operators(&condition, location, base_dir)?;
        let expanded = self.expand_macro_text(&condition, location)?;
        let invalid =
            || PreprocessorError::at("Invalid #if expression", location, PP_INVALID_IF_EXPR);
        let tokens = tokenize_expr(&expanded).map_err(|_| invalid())?;
        let tokens = collapse_function_invocations(tokens).map_err(|_| invalid())?;
        let value = evaluate_condition_tokens(&tokens).map_err(|_| invalid())?;
        Ok(value != 0)
    }

    /// Replace `defined X` and `defined(X)` before macro expansion.
    fn replace_defined(&self, condition: &str) -> String {
        let replace = |captures: &regex::Captures| -> String {
            if self.macros.contains_key(&captures[1]) {
                "1".to_string()
            } else {
                "0".to_string()
            }
        };
        let pass_one = defined_paren_re().replace_all(condition, replace);
        defined_bare_re().replace_all(&pass_one, replace).into_owned()
    }

    fn replace_has_include_operators(
        &self,
        expr: &str,
        location: &SourceLocation,
        base_dir: Option<&Path>,
    ) -> Result<String, PreprocessorError> {
        const MARKER: &str = "__has_include";
        let invalid = || {
            PreprocessorError::at(
                "Invalid __has_include expression",
                location,
                PP_INVALID_IF_EXPR,
            )
        };
        let chars: Vec<char> = expr.chars().collect();
        let marker: Vec<char> = MARKER.chars().collect();
        let mut out = String::new();
        let mut index = 0;
        loop {
            let found = match find_subsequence(&chars, &marker, index) {
                Some(found) => found,
                None => {
                    out.extend(chars[index..].iter());
                    return Ok(out);
                }
            };
            let prev_is_word = found > 0 && is_word_char(chars[found - 1]);
            let next_pos = found + marker.len();
            let next_is_word = chars.get(next_pos).copied().is_some_and(is_word_char);
            if prev_is_word || next_is_word {
                out.extend(chars[index..next_pos].iter());
                index = next_pos;
                continue;
            }
            out.extend(chars[index..found].iter());
            let mut cursor = next_pos;
            while cursor < chars.len() && chars[cursor].is_whitespace() {
                cursor += 1;
            }
            if cursor >= chars.len() || chars[cursor] != '(' {
                return Err(invalid());
            }
            let close_paren = find_matching_close(&chars, cursor).ok_or_else(invalid)?;
            let operand: String = chars[cursor + 1..close_paren].iter().collect();
            let operand = operand.trim();
            if operand.is_empty() {
                return Err(invalid());
            }
            let (include_name, is_angled) = self
                .parse_header_name_operand(operand, location)
                .map_err(|_| invalid())?;
            let present =
                resolve_include(self.options, &include_name, is_angled, base_dir, None).is_some();
            out.push(if present { '1' } else { '0' });
            index = close_paren + 1;
        }
    }

    fn parse_line_directive(
        &self,
        body: &str,
        location: &SourceLocation,
    ) -> Result<(usize, Option<String>), PreprocessorError> {
        let invalid =
            || PreprocessorError::at("Invalid #line directive", location, PP_INVALID_DIRECTIVE);
        let expanded = self.expand_macro_text(body, location)?;
        let expanded = expanded.trim();
        let captures = line_directive_re().captures(expanded).ok_or_else(invalid)?;
        let line: usize = captures[1].parse().map_err(|_| invalid())?;
        if line == 0 {
            return Err(invalid());
        }
        let filename = match captures.get(2) {
            None => None,
            Some(literal) => Some(unescape_string_literal(literal.as_str())),
        };
        Ok((line, filename))
    }

    /// Expand one non-directive line. Lines whose identifiers name no defined
    /// macro pass through verbatim.
    fn expand_line(
        &self,
        line: &str,
        location: &SourceLocation,
    ) -> Result<String, PreprocessorError> {
        if self.macros.is_empty() {
            return Ok(line.to_string());
        }
        let (text, newline) = match line.strip_suffix('\n') {
            Some(text) => (text, "\n"),
            None => (line, ""),
        };
        let tokens = match tokenize_macro_text(text) {
            Some(tokens) => tokens,
            None => return Ok(line.to_string()),
        };
        let needs_expansion = tokens
            .iter()
            .any(|token| token.kind == TokenKind::Ident && self.macros.contains_key(&token.text));
        if !needs_expansion {
            return Ok(line.to_string());
        }
        let expanded = expand_macro_tokens(
            &tokens,
            &self.macros,
            self.options.std,
            location,
            &HashSet::new(),
        )?;
        Ok(format!("{}{}", render_macro_tokens(&expanded), newline))
    }

    fn expand_macro_text(
        &self,
        text: &str,
        location: &SourceLocation,
    ) -> Result<String, PreprocessorError> {
        let tokens = match tokenize_macro_text(text) {
            Some(tokens) => tokens,
            None => return Ok(text.to_string()),
        };
        let expanded = expand_macro_tokens(
            &tokens,
            &self.macros,
            self.options.std,
            location,
            &HashSet::new(),
        )?;
        Ok(render_macro_tokens(&expanded))
    }
}

fn append_blank_lines(
    out: &mut OutputBuilder,
    directive_lines: &[&str],
    directive_cursor: &DirectiveCursor,
) {
    for (index, chunk) in directive_lines.iter().enumerate() {
        out.append(blank_line(chunk), directive_cursor.line_location(index));
    }
}

fn read_include_file(path: &PathBuf, name: &str) -> Result<String, PreprocessorError> {
    let text = fs::read_to_string(path).map_err(|error| {
        PreprocessorError::bare(
            format!("Unable to read include: {}: {}", name, error),
            PP_INCLUDE_READ_ERROR,
        )
    })?;
    Ok(translate_source(&text))
}

fn source_dir(filename: &str) -> Option<PathBuf> {
    if filename == "<input>" || filename == "<stdin>" {
        return None;
    }
    let absolute = std::path::absolute(filename).ok()?;
    absolute.parent().map(Path::to_path_buf)
}

fn parse_cli_define(define: &str) -> Result<Macro, PreprocessorError> {
    let (name, replacement) = match define.split_once('=') {
        Some((name, replacement)) => (name, replacement),
        None => (define, "1"),
    };
    if !is_identifier(name) {
        return Err(PreprocessorError::bare(
            format!("Invalid macro definition: {}", define),
            PP_INVALID_MACRO,
        ));
    }
    Ok(Macro::object_like(
        name,
        tokenize_macro_replacement(replacement.trim()),
    ))
}

fn identifier_prefix_len(text: &str) -> usize {
    let mut len = 0;
    for (index, ch) in text.char_indices() {
        let valid = if index == 0 {
            ch == '_' || ch.is_ascii_alphabetic()
        } else {
            ch == '_' || ch.is_ascii_alphanumeric()
        };
        if !valid {
            break;
        }
        len = index + ch.len_utf8();
    }
    len
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn find_subsequence(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&start| haystack[start..start + needle.len()] == *needle)
}

fn find_matching_close(chars: &[char], open_paren: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (index, ch) in chars.iter().enumerate().skip(open_paren) {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

fn unescape_string_literal(literal: &str) -> String {
    let inner = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn format_include_reference(include_name: &str, is_angled: bool) -> String {
    if is_angled {
        format!("<{}>", include_name)
    } else {
        format!("\"{}\"", include_name)
    }
}

fn format_include_trace(
    source: &str,
    line: usize,
    include_name: &str,
    include_path: &str,
    is_angled: bool,
) -> String {
    format!(
        "{}:{}: #include {} -> {}",
        source,
        line,
        format_include_reference(include_name, is_angled),
        include_path
    )
}

fn strip_gnu_asm_extensions(source: &str) -> String {
    let lines: Vec<&str> = source.split_inclusive('\n').collect();
    if lines.is_empty() {
        return source.to_string();
    }
    let mut out = String::with_capacity(source.len());
    let mut in_asm_statement = false;
    for line in lines {
        if in_asm_statement {
            out.push_str(blank_line(line));
            if line.contains(';') {
                in_asm_statement = false;
            }
            continue;
        }
        if asm_prefix_re().is_match(line) {
            out.push_str(blank_line(line));
            in_asm_statement = !line.contains(';');
            continue;
        }
        out.push_str(&asm_label_re().replace_all(line, ""));
    }
    out
}

fn reject_gnu_asm_extensions(
    source: &str,
    line_map: &[(String, usize)],
) -> Result<(), PreprocessorError> {
    for (index, line) in source.lines().enumerate() {
        if asm_prefix_re().is_match(line) || asm_label_re().is_match(line) {
            let (filename, mapped_line) = line_map
                .get(index)
                .cloned()
                .unwrap_or_else(|| ("<input>".to_string(), index + 1));
            return Err(PreprocessorError {
                message: "GNU asm extension is not allowed in c11".to_string(),
                line: Some(mapped_line),
                column: Some(1),
                filename: Some(filename),
                code: PP_GNU_EXTENSION,
            });
        }
    }
    Ok(())
}

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// `__DATE__`/`__TIME__` values, read from the wall clock exactly once per
/// compilation at translation start (UTC).
fn translation_start_date_time() -> (String, String) {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or(0);
    let days = secs.div_euclid(86400);
    let time_of_day = secs.rem_euclid(86400);
    let (year, month, day) = civil_from_days(days);
    let date = format!("{} {:2} {:04}", MONTH_NAMES[(month - 1) as usize], day, year);
    let time = format!(
        "{:02}:{:02}:{:02}",
        time_of_day / 3600,
        (time_of_day % 3600) / 60,
        time_of_day % 60
    );
    (date, time)
}

/// Days-since-epoch to (year, month, day), proleptic Gregorian.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (if month <= 2 { year + 1 } else { year }, month, day)
}
