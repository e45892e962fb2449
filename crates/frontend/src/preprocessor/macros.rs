//! Macro table entries and the expansion engine.
//!
//! Expansion works on pp-token sequences. Each nested expansion carries a
//! disabled-name set that is extended, never mutated, so a macro can never
//! re-expand itself, even through indirect references. Function-like
//! substitution keeps both the raw and the expanded view of every argument:
//! stringize and paste consume the raw view, everything else the expanded one.

use std::collections::{HashMap, HashSet};

use crate::lexer::{TokenKind, lex_pp};
use crate::options::Std;

use super::{PP_INVALID_MACRO, PreprocessorError, SourceLocation};

/// A preprocessor token reduced to its kind and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MacroToken {
    pub kind: TokenKind,
    pub text: String,
}

impl MacroToken {
    pub(crate) fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        MacroToken {
            kind,
            text: text.into(),
        }
    }

    fn empty() -> Self {
        MacroToken::new(TokenKind::Punctuator, "")
    }

    fn comma() -> Self {
        MacroToken::new(TokenKind::Punctuator, ",")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Macro {
    pub name: String,
    pub replacement: Vec<MacroToken>,
    /// `None` for object-like macros, `Some(vec![])` for `NAME()`.
    pub parameters: Option<Vec<String>>,
    pub is_variadic: bool,
}

impl Macro {
    pub(crate) fn object_like(name: impl Into<String>, replacement: Vec<MacroToken>) -> Self {
        Macro {
            name: name.into(),
            replacement,
            parameters: None,
            is_variadic: false,
        }
    }
}

/// Macros whose replacement is computed at the point of use.
pub(crate) const DYNAMIC_MACROS: &[&str] = &["__FILE__", "__LINE__"];

pub(crate) fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(ch) if ch == '_' || ch.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|ch| ch == '_' || ch.is_ascii_alphanumeric())
}

pub(crate) fn quote_string_literal(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Tokenize macro replacement text; a body the pp-lexer rejects is kept as a
/// single opaque token so `#define` never fails on it.
pub(crate) fn tokenize_macro_replacement(text: &str) -> Vec<MacroToken> {
    if text.is_empty() {
        return Vec::new();
    }
    match tokenize_macro_text(text) {
        Some(tokens) => tokens,
        None => vec![MacroToken::new(TokenKind::Ident, text)],
    }
}

pub(crate) fn tokenize_macro_text(text: &str) -> Option<Vec<MacroToken>> {
    if text.is_empty() {
        return Some(Vec::new());
    }
    let tokens = lex_pp(text, false).ok()?;
    Some(
        tokens
            .into_iter()
            .filter(|token| token.kind != TokenKind::Eof)
            .map(|token| {
                let text = token.lexeme.expect("non-EOF token has a lexeme");
                MacroToken::new(token.kind, text)
            })
            .collect(),
    )
}

pub(crate) fn render_macro_tokens(tokens: &[MacroToken]) -> String {
    let mut out = String::new();
    for token in tokens {
        if token.text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&token.text);
    }
    out
}

/// Parse `(params)` of a function-like define. `None` means the parameter
/// list is malformed and the whole define is ignored.
pub(crate) fn parse_macro_parameters(text: &str) -> Option<(Vec<String>, bool)> {
    if text.is_empty() {
        return Some((Vec::new(), false));
    }
    let items: Vec<&str> = text.split(',').map(str::trim).collect();
    let mut params: Vec<String> = Vec::new();
    let mut is_variadic = false;
    for (index, item) in items.iter().enumerate() {
        if *item == "..." {
            if index != items.len() - 1 {
                return None;
            }
            is_variadic = true;
            break;
        }
        if !is_identifier(item) || params.iter().any(|param| param == item) {
            return None;
        }
        params.push((*item).to_string());
    }
    Some((params, is_variadic))
}

pub(crate) fn expand_macro_tokens(
    tokens: &[MacroToken],
    macros: &HashMap<String, Macro>,
    std: Std,
    location: &SourceLocation,
    disabled: &HashSet<String>,
) -> Result<Vec<MacroToken>, PreprocessorError> {
    let mut expanded = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        let token = &tokens[index];
        if token.kind != TokenKind::Ident {
            expanded.push(token.clone());
            index += 1;
            continue;
        }
        if DYNAMIC_MACROS.contains(&token.text.as_str()) && macros.contains_key(&token.text) {
            if token.text == "__LINE__" {
                expanded.push(MacroToken::new(
                    TokenKind::IntConst,
                    location.line.to_string(),
                ));
            } else {
                expanded.push(MacroToken::new(
                    TokenKind::StringLiteral,
                    quote_string_literal(&location.filename),
                ));
            }
            index += 1;
            continue;
        }
        let macro_def = match macros.get(&token.text) {
            Some(macro_def) if !disabled.contains(&macro_def.name) => macro_def,
            _ => {
                expanded.push(token.clone());
                index += 1;
                continue;
            }
        };
        let mut next_disabled = disabled.clone();
        next_disabled.insert(macro_def.name.clone());
        if macro_def.parameters.is_none() {
            let replacement =
                expand_macro_tokens(&macro_def.replacement, macros, std, location, &next_disabled)?;
            expanded.extend(replacement);
            index += 1;
            continue;
        }
        let parsed = parse_macro_invocation(tokens, index + 1, location)?;
        let (args, next_index) = match parsed {
            Some(parsed) => parsed,
            None => {
                expanded.push(token.clone());
                index += 1;
                continue;
            }
        };
        let replacement =
            expand_function_like_macro(macro_def, &args, macros, std, location, &next_disabled)?;
        let replacement =
            expand_macro_tokens(&replacement, macros, std, location, &next_disabled)?;
        expanded.extend(replacement);
        index = next_index;
    }
    Ok(expanded)
}

/// Collect the arguments of a function-like invocation starting after the
/// macro name. `None` means no `(` follows and the name stays unexpanded.
fn parse_macro_invocation(
    tokens: &[MacroToken],
    mut index: usize,
    location: &SourceLocation,
) -> Result<Option<(Vec<Vec<MacroToken>>, usize)>, PreprocessorError> {
    if index >= tokens.len() || tokens[index].text != "(" {
        return Ok(None);
    }
    if index + 1 < tokens.len() && tokens[index + 1].text == ")" {
        return Ok(Some((Vec::new(), index + 2)));
    }
    let mut args: Vec<Vec<MacroToken>> = Vec::new();
    let mut current: Vec<MacroToken> = Vec::new();
    let mut depth = 1usize;
    index += 1;
    while index < tokens.len() {
        let token = &tokens[index];
        if token.text == "(" {
            depth += 1;
            current.push(token.clone());
        } else if token.text == ")" {
            depth -= 1;
            if depth == 0 {
                args.push(current);
                return Ok(Some((args, index + 1)));
            }
            current.push(token.clone());
        } else if token.text == "," && depth == 1 {
            args.push(current);
            current = Vec::new();
        } else {
            current.push(token.clone());
        }
        index += 1;
    }
    Err(PreprocessorError::at(
        "Unterminated macro invocation",
        location,
        PP_INVALID_MACRO,
    ))
}

fn expand_function_like_macro(
    macro_def: &Macro,
    args: &[Vec<MacroToken>],
    macros: &HashMap<String, Macro>,
    std: Std,
    location: &SourceLocation,
    disabled: &HashSet<String>,
) -> Result<Vec<MacroToken>, PreprocessorError> {
    let parameters = macro_def
        .parameters
        .as_ref()
        .expect("function-like macro has parameters");
    let expected = parameters.len();
    if macro_def.is_variadic {
        if args.len() < expected {
            return Err(PreprocessorError::at(
                "Insufficient macro arguments",
                location,
                PP_INVALID_MACRO,
            ));
        }
    } else if args.len() != expected {
        return Err(PreprocessorError::at(
            "Macro argument count mismatch",
            location,
            PP_INVALID_MACRO,
        ));
    }
    let mut raw_named_args: HashMap<&str, &[MacroToken]> = HashMap::new();
    let mut expanded_named_args: HashMap<&str, Vec<MacroToken>> = HashMap::new();
    for (index, name) in parameters.iter().enumerate() {
        raw_named_args.insert(name.as_str(), &args[index]);
        expanded_named_args.insert(
            name.as_str(),
            expand_macro_tokens(&args[index], macros, std, location, disabled)?,
        );
    }
    let mut raw_var_args: Vec<MacroToken> = Vec::new();
    let mut expanded_var_args: Vec<MacroToken> = Vec::new();
    if macro_def.is_variadic {
        let variadic_args = &args[expected..];
        raw_var_args = join_macro_arguments(variadic_args.iter().map(|arg| arg.as_slice()));
        let expanded: Vec<Vec<MacroToken>> = variadic_args
            .iter()
            .map(|arg| expand_macro_tokens(arg, macros, std, location, disabled))
            .collect::<Result<_, _>>()?;
        expanded_var_args = join_macro_arguments(expanded.iter().map(|arg| arg.as_slice()));
    }
    let lookup = |name: &str, want_raw: bool| -> Option<Vec<MacroToken>> {
        if let Some(raw) = raw_named_args.get(name) {
            return Some(if want_raw {
                raw.to_vec()
            } else {
                expanded_named_args[name].clone()
            });
        }
        if macro_def.is_variadic && name == "__VA_ARGS__" {
            return Some(if want_raw {
                raw_var_args.clone()
            } else {
                expanded_var_args.clone()
            });
        }
        None
    };

    let replacement = &macro_def.replacement;
    let mut pieces: Vec<MacroToken> = Vec::new();
    let mut index = 0;
    while index < replacement.len() {
        let token = &replacement[index];
        if token.text == "#" && index + 1 < replacement.len() {
            let target = &replacement[index + 1].text;
            if let Some(target_tokens) = lookup(target, true) {
                pieces.push(MacroToken::new(
                    TokenKind::StringLiteral,
                    stringize_tokens(&target_tokens),
                ));
                index += 2;
                continue;
            }
        }
        let is_paste_context = (index > 0 && replacement[index - 1].text == "##")
            || (index + 1 < replacement.len() && replacement[index + 1].text == "##");
        if let Some(target_tokens) = lookup(&token.text, is_paste_context) {
            if !target_tokens.is_empty() {
                pieces.extend(target_tokens);
            } else if is_paste_context {
                // An empty argument must stay visible so paste can consume it.
                pieces.push(MacroToken::empty());
            }
            index += 1;
            continue;
        }
        pieces.push(token.clone());
        index += 1;
    }
    apply_token_paste(pieces, std, location)
}

fn join_macro_arguments<'a>(args: impl Iterator<Item = &'a [MacroToken]>) -> Vec<MacroToken> {
    let mut out: Vec<MacroToken> = Vec::new();
    for (index, arg) in args.enumerate() {
        if index > 0 {
            out.push(MacroToken::comma());
        }
        out.extend_from_slice(arg);
    }
    out
}

fn stringize_tokens(tokens: &[MacroToken]) -> String {
    quote_string_literal(&render_macro_tokens(tokens))
}

fn apply_token_paste(
    tokens: Vec<MacroToken>,
    std: Std,
    location: &SourceLocation,
) -> Result<Vec<MacroToken>, PreprocessorError> {
    let mut out = tokens;
    let mut index = 0;
    while index < out.len() {
        if out[index].text != "##" {
            index += 1;
            continue;
        }
        if index == 0 || index + 1 >= out.len() {
            return Err(PreprocessorError::at(
                "Invalid token paste",
                location,
                PP_INVALID_MACRO,
            ));
        }
        let left = out[index - 1].clone();
        let right = out[index + 1].clone();
        let pasted = paste_token_pair(&left, &right, std, location)?;
        out.splice(index - 1..=index + 1, pasted);
        index = index.saturating_sub(1);
    }
    Ok(out.into_iter().filter(|token| !token.text.is_empty()).collect())
}

pub(crate) fn paste_token_pair(
    left: &MacroToken,
    right: &MacroToken,
    std: Std,
    location: &SourceLocation,
) -> Result<Vec<MacroToken>, PreprocessorError> {
    if left.text.is_empty() && right.text.is_empty() {
        return Ok(Vec::new());
    }
    if left.text.is_empty() {
        return Ok(vec![right.clone()]);
    }
    if right.text.is_empty() {
        // GNU comma swallow: `, ## __VA_ARGS__` with no variadic arguments
        // drops the comma.
        if std.is_gnu() && left.text == "," {
            return Ok(Vec::new());
        }
        return Ok(vec![left.clone()]);
    }
    let pasted = tokenize_macro_text(&format!("{}{}", left.text, right.text));
    match pasted {
        Some(tokens) if tokens.len() == 1 => Ok(tokens),
        _ => Err(PreprocessorError::at(
            "Invalid token paste result",
            location,
            PP_INVALID_MACRO,
        )),
    }
}

/// Render one macro table entry as `NAME=body` or `NAME(params)=body`.
pub(crate) fn macro_table_line(macro_def: &Macro) -> String {
    let signature = match &macro_def.parameters {
        None => macro_def.name.clone(),
        Some(parameters) => {
            let mut params = parameters.clone();
            if macro_def.is_variadic {
                params.push("...".to_string());
            }
            format!("{}({})", macro_def.name, params.join(","))
        }
    };
    format!("{}={}", signature, render_macro_tokens(&macro_def.replacement))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation {
            filename: "main.c".to_string(),
            line: 1,
        }
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("FOO"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1BAD"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("A-B"));
    }

    #[test]
    fn test_parse_macro_parameters() {
        assert_eq!(parse_macro_parameters(""), Some((vec![], false)));
        assert_eq!(
            parse_macro_parameters("x, ..."),
            Some((vec!["x".to_string()], true))
        );
        assert_eq!(parse_macro_parameters("x, ..., y"), None);
        assert_eq!(parse_macro_parameters("x, x"), None);
    }

    #[test]
    fn test_tokenize_macro_replacement_fallback() {
        assert_eq!(tokenize_macro_replacement(""), vec![]);
        let tokens = tokenize_macro_replacement("@");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "@");
    }

    #[test]
    fn test_render_skips_empty_tokens() {
        let tokens = vec![
            MacroToken::new(TokenKind::Ident, "a"),
            MacroToken::empty(),
            MacroToken::new(TokenKind::Ident, "b"),
        ];
        assert_eq!(render_macro_tokens(&tokens), "a b");
    }

    #[test]
    fn test_paste_token_pair_invalid_result() {
        let left = MacroToken::new(TokenKind::Ident, "x");
        let right = MacroToken::new(TokenKind::Punctuator, "+");
        let err = paste_token_pair(&left, &right, Std::C11, &loc()).unwrap_err();
        assert_eq!(err.code, PP_INVALID_MACRO);
    }

    #[test]
    fn test_paste_token_pair_comma_swallow() {
        let left = MacroToken::comma();
        let right = MacroToken::empty();
        let gnu = paste_token_pair(&left, &right, Std::Gnu11, &loc()).unwrap();
        assert!(gnu.is_empty());
        let c11 = paste_token_pair(&left, &right, Std::C11, &loc()).unwrap();
        assert_eq!(c11, vec![MacroToken::comma()]);
    }

    #[test]
    fn test_macro_table_line() {
        let object = Macro::object_like("A", tokenize_macro_replacement("1"));
        assert_eq!(macro_table_line(&object), "A=1");
        let function = Macro {
            name: "LOG".to_string(),
            replacement: tokenize_macro_replacement("printf(fmt)"),
            parameters: Some(vec!["fmt".to_string()]),
            is_variadic: true,
        };
        assert_eq!(macro_table_line(&function), "LOG(fmt,...)=printf ( fmt )");
    }

    #[test]
    fn test_recursive_macro_is_suppressed() {
        let mut macros = HashMap::new();
        macros.insert(
            "A".to_string(),
            Macro::object_like("A", tokenize_macro_replacement("B")),
        );
        macros.insert(
            "B".to_string(),
            Macro::object_like("B", tokenize_macro_replacement("A")),
        );
        let tokens = tokenize_macro_text("A").unwrap();
        let expanded =
            expand_macro_tokens(&tokens, &macros, Std::C11, &loc(), &HashSet::new()).unwrap();
        assert_eq!(render_macro_tokens(&expanded), "A");
    }
}
