//! `#if`/`#elif` expression evaluation.
//!
//! A dedicated tokenizer feeds a small precedence-climbing parser; the
//! resulting tree is evaluated with two numeric kinds. Where either operand
//! is unsigned both promote to unsigned and arithmetic wraps modulo 2^64.
//! `&&`, `||`, and `!` short-circuit, so a dead `1/0` is never evaluated;
//! a live division or modulo by zero is an error.

use regex::Regex;
use std::sync::OnceLock;

use super::macros::is_identifier;

/// Marker for any malformed or unevaluable condition; the driver reports all
/// of them as one invalid-`#if`-expression diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExprError;

fn pp_int_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:0[xX][0-9A-Fa-f]+|[0-9]+)(?:[uU](?:ll|LL|[lL])?|(?:ll|LL|[lL])[uU]?)?$",
        )
        .expect("pp integer pattern")
    })
}

fn number_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:0[xX][0-9A-Fa-f]+|[0-9]+)(?:[uU](?:ll|LL|[lL])?|(?:ll|LL|[lL])[uU]?)?",
        )
        .expect("number prefix pattern")
    })
}

fn ident_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").expect("identifier prefix pattern"))
}

const TWO_CHAR_OPS: &[&str] = &["||", "&&", "==", "!=", "<=", ">=", "<<", ">>"];
const ONE_CHAR_OPS: &[char] = &[
    '(', ')', '!', '~', '+', '-', '*', '/', '%', '<', '>', '&', '^', '|',
];

/// Strip comments from a condition: block comments become a space, a line
/// comment truncates the remainder.
pub(crate) fn strip_condition_comments(expr: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let block = RE.get_or_init(|| Regex::new(r"/\*.*?\*/").expect("block comment pattern"));
    let without_block = block.replace_all(expr, " ");
    match without_block.split_once("//") {
        Some((head, _)) => head.to_string(),
        None => without_block.into_owned(),
    }
}

/// Split a condition into expression tokens: integer literals with C
/// suffixes, identifiers, and the `#if` operator set.
pub(crate) fn tokenize_expr(expr: &str) -> Result<Vec<String>, ExprError> {
    let mut tokens = Vec::new();
    let mut rest = expr;
    while !rest.is_empty() {
        let ch = rest.chars().next().expect("non-empty rest");
        if ch.is_whitespace() {
            rest = &rest[ch.len_utf8()..];
            continue;
        }
        if let Some(found) = number_prefix_re().find(rest) {
            tokens.push(found.as_str().to_string());
            rest = &rest[found.end()..];
            continue;
        }
        if let Some(found) = ident_prefix_re().find(rest) {
            tokens.push(found.as_str().to_string());
            rest = &rest[found.end()..];
            continue;
        }
        if let Some(op) = TWO_CHAR_OPS.iter().find(|op| rest.starts_with(**op)) {
            tokens.push((*op).to_string());
            rest = &rest[op.len()..];
            continue;
        }
        if ONE_CHAR_OPS.contains(&ch) {
            tokens.push(ch.to_string());
            rest = &rest[ch.len_utf8()..];
            continue;
        }
        return Err(ExprError);
    }
    Ok(tokens)
}

/// Collapse `ident(…balanced…)` calls that survived macro expansion (e.g.
/// `__has_attribute(x)`) to the literal `0`. Unbalanced parens are an error.
pub(crate) fn collapse_function_invocations(tokens: Vec<String>) -> Result<Vec<String>, ExprError> {
    let mut collapsed = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        let token = &tokens[index];
        if is_identifier(token) && index + 1 < tokens.len() && tokens[index + 1] == "(" {
            let mut depth = 0usize;
            index += 1;
            let mut closed = false;
            while index < tokens.len() {
                match tokens[index].as_str() {
                    "(" => depth += 1,
                    ")" => {
                        depth -= 1;
                        if depth == 0 {
                            index += 1;
                            closed = true;
                            break;
                        }
                    }
                    _ => {}
                }
                index += 1;
            }
            if !closed {
                return Err(ExprError);
            }
            collapsed.push("0".to_string());
            continue;
        }
        collapsed.push(token.clone());
        index += 1;
    }
    Ok(collapsed)
}

/// Parse a pp integer literal to its value, masked to 64 bits.
pub(crate) fn parse_pp_integer_literal(token: &str) -> Option<u64> {
    if !pp_int_re().is_match(token) {
        return None;
    }
    let digits = token.trim_end_matches(|ch| matches!(ch, 'u' | 'U' | 'l' | 'L'));
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        u128::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        if digits.bytes().any(|b| !(b'0'..=b'7').contains(&b)) {
            return None;
        }
        u128::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<u128>().ok()?
    };
    Some(value as u64)
}

pub(crate) fn is_unsigned_pp_integer(token: &str) -> bool {
    pp_int_re().is_match(token) && token.chars().any(|ch| matches!(ch, 'u' | 'U'))
}

/// Evaluation value: 64-bit payload plus the unsigned flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PPValue {
    pub value: i64,
    pub is_unsigned: bool,
}

impl PPValue {
    fn signed(value: i64) -> Self {
        PPValue {
            value,
            is_unsigned: false,
        }
    }

    fn unsigned(value: u64) -> Self {
        PPValue {
            value: value as i64,
            is_unsigned: true,
        }
    }

    fn from_bool(value: bool) -> Self {
        PPValue::signed(if value { 1 } else { 0 })
    }

    fn as_unsigned(self) -> u64 {
        self.value as u64
    }

    fn is_truthy(self) -> bool {
        self.value != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitOr,
    BitAnd,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug)]
enum PPExpr {
    Num(PPValue),
    Not(Box<PPExpr>),
    Pos(Box<PPExpr>),
    Neg(Box<PPExpr>),
    Invert(Box<PPExpr>),
    And(Box<PPExpr>, Box<PPExpr>),
    Or(Box<PPExpr>, Box<PPExpr>),
    Bin(BinOp, Box<PPExpr>, Box<PPExpr>),
}

/// Evaluate a collapsed token sequence; the result is the `#if` controlling
/// value (non-zero means active).
pub(crate) fn evaluate_condition_tokens(tokens: &[String]) -> Result<i64, ExprError> {
    let mut parser = ExprParser { tokens, index: 0 };
    let expr = parser.parse_or()?;
    if parser.index != tokens.len() {
        return Err(ExprError);
    }
    Ok(eval(&expr)?.value)
}

struct ExprParser<'a> {
    tokens: &'a [String],
    index: usize,
}

impl ExprParser<'_> {
    fn current(&self) -> Option<&str> {
        self.tokens.get(self.index).map(String::as_str)
    }

    fn accept(&mut self, op: &str) -> bool {
        if self.current() == Some(op) {
            self.index += 1;
            return true;
        }
        false
    }

    fn parse_or(&mut self) -> Result<PPExpr, ExprError> {
        let mut expr = self.parse_and()?;
        while self.accept("||") {
            let right = self.parse_and()?;
            expr = PPExpr::Or(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<PPExpr, ExprError> {
        let mut expr = self.parse_bit_or()?;
        while self.accept("&&") {
            let right = self.parse_bit_or()?;
            expr = PPExpr::And(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_bit_or(&mut self) -> Result<PPExpr, ExprError> {
        let mut expr = self.parse_bit_xor()?;
        while self.accept("|") {
            let right = self.parse_bit_xor()?;
            expr = PPExpr::Bin(BinOp::BitOr, Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_bit_xor(&mut self) -> Result<PPExpr, ExprError> {
        let mut expr = self.parse_bit_and()?;
        while self.accept("^") {
            let right = self.parse_bit_and()?;
            expr = PPExpr::Bin(BinOp::BitXor, Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_bit_and(&mut self) -> Result<PPExpr, ExprError> {
        let mut expr = self.parse_equality()?;
        while self.accept("&") {
            let right = self.parse_equality()?;
            expr = PPExpr::Bin(BinOp::BitAnd, Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<PPExpr, ExprError> {
        let mut expr = self.parse_relational()?;
        loop {
            let op = match self.current() {
                Some("==") => BinOp::Eq,
                Some("!=") => BinOp::Ne,
                _ => return Ok(expr),
            };
            self.index += 1;
            let right = self.parse_relational()?;
            expr = PPExpr::Bin(op, Box::new(expr), Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> Result<PPExpr, ExprError> {
        let mut expr = self.parse_shift()?;
        loop {
            let op = match self.current() {
                Some("<") => BinOp::Lt,
                Some("<=") => BinOp::Le,
                Some(">") => BinOp::Gt,
                Some(">=") => BinOp::Ge,
                _ => return Ok(expr),
            };
            self.index += 1;
            let right = self.parse_shift()?;
            expr = PPExpr::Bin(op, Box::new(expr), Box::new(right));
        }
    }

    fn parse_shift(&mut self) -> Result<PPExpr, ExprError> {
        let mut expr = self.parse_additive()?;
        loop {
            let op = match self.current() {
                Some("<<") => BinOp::Shl,
                Some(">>") => BinOp::Shr,
                _ => return Ok(expr),
            };
            self.index += 1;
            let right = self.parse_additive()?;
            expr = PPExpr::Bin(op, Box::new(expr), Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> Result<PPExpr, ExprError> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                Some("+") => BinOp::Add,
                Some("-") => BinOp::Sub,
                _ => return Ok(expr),
            };
            self.index += 1;
            let right = self.parse_multiplicative()?;
            expr = PPExpr::Bin(op, Box::new(expr), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<PPExpr, ExprError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Some("*") => BinOp::Mul,
                Some("/") => BinOp::Div,
                Some("%") => BinOp::Mod,
                _ => return Ok(expr),
            };
            self.index += 1;
            let right = self.parse_unary()?;
            expr = PPExpr::Bin(op, Box::new(expr), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<PPExpr, ExprError> {
        if self.accept("!") {
            return Ok(PPExpr::Not(Box::new(self.parse_unary()?)));
        }
        if self.accept("+") {
            return Ok(PPExpr::Pos(Box::new(self.parse_unary()?)));
        }
        if self.accept("-") {
            return Ok(PPExpr::Neg(Box::new(self.parse_unary()?)));
        }
        if self.accept("~") {
            return Ok(PPExpr::Invert(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<PPExpr, ExprError> {
        if self.accept("(") {
            let expr = self.parse_or()?;
            if !self.accept(")") {
                return Err(ExprError);
            }
            return Ok(expr);
        }
        let token = self.current().ok_or(ExprError)?;
        if let Some(value) = parse_pp_integer_literal(token) {
            let result = if is_unsigned_pp_integer(token) {
                PPValue::unsigned(value)
            } else {
                PPValue::signed(value as i64)
            };
            self.index += 1;
            return Ok(PPExpr::Num(result));
        }
        if is_identifier(token) {
            // Identifiers left after macro expansion evaluate as 0.
            self.index += 1;
            return Ok(PPExpr::Num(PPValue::signed(0)));
        }
        Err(ExprError)
    }
}

fn eval(expr: &PPExpr) -> Result<PPValue, ExprError> {
    match expr {
        PPExpr::Num(value) => Ok(*value),
        PPExpr::Not(operand) => Ok(PPValue::from_bool(!eval(operand)?.is_truthy())),
        PPExpr::Pos(operand) => eval(operand),
        PPExpr::Neg(operand) => {
            let value = eval(operand)?;
            if value.is_unsigned {
                Ok(PPValue::unsigned(value.as_unsigned().wrapping_neg()))
            } else {
                Ok(PPValue::signed(value.value.wrapping_neg()))
            }
        }
        PPExpr::Invert(operand) => {
            let value = eval(operand)?;
            if value.is_unsigned {
                Ok(PPValue::unsigned(!value.as_unsigned()))
            } else {
                Ok(PPValue::signed(!value.value))
            }
        }
        PPExpr::And(left, right) => {
            if !eval(left)?.is_truthy() {
                return Ok(PPValue::signed(0));
            }
            Ok(PPValue::from_bool(eval(right)?.is_truthy()))
        }
        PPExpr::Or(left, right) => {
            if eval(left)?.is_truthy() {
                return Ok(PPValue::signed(1));
            }
            Ok(PPValue::from_bool(eval(right)?.is_truthy()))
        }
        PPExpr::Bin(op, left, right) => {
            let left = eval(left)?;
            let right = eval(right)?;
            eval_binary(*op, left, right)
        }
    }
}

fn eval_binary(op: BinOp, left: PPValue, right: PPValue) -> Result<PPValue, ExprError> {
    let is_unsigned = left.is_unsigned || right.is_unsigned;
    match op {
        BinOp::Eq => return Ok(PPValue::from_bool(compare(left, right, is_unsigned) == 0)),
        BinOp::Ne => return Ok(PPValue::from_bool(compare(left, right, is_unsigned) != 0)),
        BinOp::Lt => return Ok(PPValue::from_bool(compare(left, right, is_unsigned) < 0)),
        BinOp::Le => return Ok(PPValue::from_bool(compare(left, right, is_unsigned) <= 0)),
        BinOp::Gt => return Ok(PPValue::from_bool(compare(left, right, is_unsigned) > 0)),
        BinOp::Ge => return Ok(PPValue::from_bool(compare(left, right, is_unsigned) >= 0)),
        _ => {}
    }
    if is_unsigned {
        let lhs = left.as_unsigned();
        let rhs = right.as_unsigned();
        let value = match op {
            BinOp::Add => lhs.wrapping_add(rhs),
            BinOp::Sub => lhs.wrapping_sub(rhs),
            BinOp::Mul => lhs.wrapping_mul(rhs),
            BinOp::Div => {
                if rhs == 0 {
                    return Err(ExprError);
                }
                lhs / rhs
            }
            BinOp::Mod => {
                if rhs == 0 {
                    return Err(ExprError);
                }
                lhs % rhs
            }
            BinOp::Shl => shift_amount(right).map(|n| checked_shl_u64(lhs, n)).ok_or(ExprError)?,
            BinOp::Shr => shift_amount(right).map(|n| checked_shr_u64(lhs, n)).ok_or(ExprError)?,
            BinOp::BitOr => lhs | rhs,
            BinOp::BitAnd => lhs & rhs,
            BinOp::BitXor => lhs ^ rhs,
            _ => unreachable!("comparisons handled above"),
        };
        return Ok(PPValue::unsigned(value));
    }
    let lhs = left.value;
    let rhs = right.value;
    let value = match op {
        BinOp::Add => lhs.wrapping_add(rhs),
        BinOp::Sub => lhs.wrapping_sub(rhs),
        BinOp::Mul => lhs.wrapping_mul(rhs),
        BinOp::Div => {
            if rhs == 0 {
                return Err(ExprError);
            }
            lhs.wrapping_div(rhs)
        }
        BinOp::Mod => {
            if rhs == 0 {
                return Err(ExprError);
            }
            lhs.wrapping_rem(rhs)
        }
        BinOp::Shl => shift_amount(right)
            .map(|n| if n >= 64 { 0 } else { lhs.wrapping_shl(n) })
            .ok_or(ExprError)?,
        BinOp::Shr => shift_amount(right)
            .map(|n| {
                if n >= 64 {
                    if lhs < 0 { -1 } else { 0 }
                } else {
                    lhs.wrapping_shr(n)
                }
            })
            .ok_or(ExprError)?,
        BinOp::BitOr => lhs | rhs,
        BinOp::BitAnd => lhs & rhs,
        BinOp::BitXor => lhs ^ rhs,
        _ => unreachable!("comparisons handled above"),
    };
    Ok(PPValue::signed(value))
}

fn compare(left: PPValue, right: PPValue, is_unsigned: bool) -> i32 {
    if is_unsigned {
        match left.as_unsigned().cmp(&right.as_unsigned()) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }
    } else {
        match left.value.cmp(&right.value) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }
    }
}

/// Shift counts must be non-negative; a negative count is an error.
fn shift_amount(value: PPValue) -> Option<u32> {
    if value.is_unsigned {
        return Some(value.as_unsigned().min(u32::MAX as u64) as u32);
    }
    if value.value < 0 {
        return None;
    }
    Some(value.value.min(u32::MAX as i64) as u32)
}

fn checked_shl_u64(value: u64, amount: u32) -> u64 {
    if amount >= 64 { 0 } else { value << amount }
}

fn checked_shr_u64(value: u64, amount: u32) -> u64 {
    if amount >= 64 { 0 } else { value >> amount }
}
