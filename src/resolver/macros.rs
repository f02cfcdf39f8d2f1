//! Preprocessor-style macro evaluation for version headers.
//!
//! Version headers rarely hold plain literals. They build values out of
//! other macros (`#define FOO_VERSION (FOO_MAJOR * 100 + FOO_MINOR)`),
//! wrap them in parentheses and decorate them with integer suffixes. The
//! [`MacroTable`] collects the object-like `#define`s of a header and
//! evaluates a macro the way the preprocessor would in `#if`, or as a string
//! literal when that is what it expands to.

use std::collections::{HashMap, HashSet};

/// Maximum macro nesting followed while expanding.
const MAX_DEPTH: usize = 32;

/// The value a macro evaluates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroValue {
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Int(i64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

/// Object-like macro definitions collected from header text.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    defines: HashMap<String, String>,
}

impl MacroTable {
    /// Collect the object-like `#define`s in `text`.
    ///
    /// Function-like macros, conditionals and includes are ignored; a later
    /// definition replaces an earlier one.
    pub fn parse(text: &str) -> Self {
        let mut table = MacroTable::default();
        let joined = text.replace("\\\r\n", " ").replace("\\\n", " ");
        let stripped = strip_comments(&joined);

        for line in stripped.lines() {
            let Some(rest) = line.trim_start().strip_prefix('#') else {
                continue;
            };
            let Some(rest) = rest.trim_start().strip_prefix("define") else {
                continue;
            };
            if !rest.starts_with([' ', '\t']) {
                continue;
            }
            let rest = rest.trim_start();
            let name_len = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if name_len == 0 {
                continue;
            }
            let (name, body) = rest.split_at(name_len);
            if body.starts_with('(') {
                continue;
            }
            table.insert(name, body.trim());
        }

        table
    }

    /// Define `name` as `body`.
    pub fn insert(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.defines.insert(name.into(), body.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defines.contains_key(name)
    }

    /// Evaluate the macro `name`.
    pub fn evaluate(&self, name: &str) -> Option<MacroValue> {
        if !self.contains(name) {
            return None;
        }
        self.evaluate_text(name)
    }

    /// Expand and evaluate arbitrary expression text against this table.
    pub fn evaluate_text(&self, text: &str) -> Option<MacroValue> {
        let tokens = tokenize(text)?;
        let mut visiting = HashSet::new();
        let expanded = self.expand(tokens, 0, &mut visiting)?;
        evaluate_tokens(&expanded)
    }

    fn expand(
        &self,
        tokens: Vec<Token>,
        depth: usize,
        visiting: &mut HashSet<String>,
    ) -> Option<Vec<Token>> {
        if depth > MAX_DEPTH {
            return None;
        }

        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            match token {
                Token::Ident(ref name) => {
                    let body = self.defines.get(name)?;
                    if !visiting.insert(name.clone()) {
                        return None;
                    }
                    let inner = self.expand(tokenize(body)?, depth + 1, visiting)?;
                    visiting.remove(name);
                    out.extend(inner);
                }
                other => out.push(other),
            }
        }
        Some(out)
    }
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

fn tokenize(text: &str) -> Option<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::Int(parse_int(&text[start..i])?));
        } else if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::Ident(text[start..i].to_string()));
        } else if c == b'"' {
            i += 1;
            let mut value = String::new();
            loop {
                let &b = bytes.get(i)?;
                i += 1;
                match b {
                    b'"' => break,
                    b'\\' => {
                        let &escaped = bytes.get(i)?;
                        i += 1;
                        value.push(escaped as char);
                    }
                    _ => value.push(b as char),
                }
            }
            tokens.push(Token::Str(value));
        } else {
            let two = text.get(i..i + 2).unwrap_or("");
            let punct = match two {
                "<<" => Some("<<"),
                ">>" => Some(">>"),
                _ => None,
            };
            if let Some(p) = punct {
                tokens.push(Token::Punct(p));
                i += 2;
                continue;
            }
            let p = match c {
                b'+' => "+",
                b'-' => "-",
                b'*' => "*",
                b'/' => "/",
                b'%' => "%",
                b'(' => "(",
                b')' => ")",
                b'~' => "~",
                _ => return None,
            };
            tokens.push(Token::Punct(p));
            i += 1;
        }
    }

    Some(tokens)
}

/// Parse a C integer literal: decimal, `0x` hex or leading-zero octal, with
/// optional `u`/`l` suffixes.
fn parse_int(literal: &str) -> Option<i64> {
    let digits = literal.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse().ok()
    }
}

fn evaluate_tokens(tokens: &[Token]) -> Option<MacroValue> {
    if !tokens.is_empty() && tokens.iter().all(|t| matches!(t, Token::Str(_))) {
        let joined: String = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Str(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        return Some(MacroValue::Str(joined));
    }

    let mut parser = ExprParser { tokens, pos: 0 };
    let value = parser.shift()?;
    if parser.pos != tokens.len() {
        return None;
    }
    Some(MacroValue::Int(value))
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl ExprParser<'_> {
    fn peek_punct(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(Token::Punct(p)) => Some(*p),
            _ => None,
        }
    }

    fn shift(&mut self) -> Option<i64> {
        let mut lhs = self.additive()?;
        while let Some(op @ ("<<" | ">>")) = self.peek_punct() {
            self.pos += 1;
            let rhs = u32::try_from(self.additive()?).ok()?;
            lhs = match op {
                "<<" => lhs.checked_shl(rhs)?,
                _ => lhs.checked_shr(rhs)?,
            };
        }
        Some(lhs)
    }

    fn additive(&mut self) -> Option<i64> {
        let mut lhs = self.multiplicative()?;
        while let Some(op @ ("+" | "-")) = self.peek_punct() {
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = match op {
                "+" => lhs.checked_add(rhs)?,
                _ => lhs.checked_sub(rhs)?,
            };
        }
        Some(lhs)
    }

    fn multiplicative(&mut self) -> Option<i64> {
        let mut lhs = self.unary()?;
        while let Some(op @ ("*" | "/" | "%")) = self.peek_punct() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = match op {
                "*" => lhs.checked_mul(rhs)?,
                "/" => lhs.checked_div(rhs)?,
                _ => lhs.checked_rem(rhs)?,
            };
        }
        Some(lhs)
    }

    fn unary(&mut self) -> Option<i64> {
        match self.peek_punct() {
            Some("-") => {
                self.pos += 1;
                self.unary()?.checked_neg()
            }
            Some("+") => {
                self.pos += 1;
                self.unary()
            }
            Some("~") => {
                self.pos += 1;
                Some(!self.unary()?)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Option<i64> {
        match self.tokens.get(self.pos)? {
            Token::Int(v) => {
                self.pos += 1;
                Some(*v)
            }
            Token::Punct("(") => {
                self.pos += 1;
                let v = self.shift()?;
                if self.peek_punct() != Some(")") {
                    return None;
                }
                self.pos += 1;
                Some(v)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_integer_macros() {
        let table = MacroTable::parse(
            "#ifndef V_H\n#define V_H\n#define ROCM_VERSION_MAJOR   6\n# define ROCM_VERSION_MINOR 2 /* minor */\n#endif\n",
        );
        assert_eq!(table.evaluate("ROCM_VERSION_MAJOR"), Some(MacroValue::Int(6)));
        assert_eq!(table.evaluate("ROCM_VERSION_MINOR"), Some(MacroValue::Int(2)));
        assert_eq!(table.evaluate("ROCM_VERSION_PATCH"), None);
    }

    #[test]
    fn test_transitive_expansion_and_arithmetic() {
        let table = MacroTable::parse(
            "#define BASE 5\n\
             #define OFFSET (BASE * 2)\n\
             #define PACKED ((OFFSET << 8) + 0x10U)\n",
        );
        assert_eq!(table.evaluate("OFFSET"), Some(MacroValue::Int(10)));
        assert_eq!(table.evaluate("PACKED"), Some(MacroValue::Int((10 << 8) + 16)));
    }

    #[test]
    fn test_string_macro() {
        let table = MacroTable::parse("#define PNG_LIBPNG_VER_STRING \"1.6.47\"\n");
        assert_eq!(
            table.evaluate("PNG_LIBPNG_VER_STRING"),
            Some(MacroValue::Str("1.6.47".to_string()))
        );
    }

    #[test]
    fn test_line_continuation_and_function_like_macros() {
        let table = MacroTable::parse(
            "#define LONG_VALUE \\\n  (3 + \\\n   4)\n#define F(x) ((x) + 1)\n",
        );
        assert_eq!(table.evaluate("LONG_VALUE"), Some(MacroValue::Int(7)));
        assert!(!table.contains("F"));
    }

    #[test]
    fn test_cycles_and_unknowns_fail() {
        let mut table = MacroTable::default();
        table.insert("A", "B + 1");
        table.insert("B", "A + 1");
        table.insert("C", "UNDEFINED_THING");
        assert_eq!(table.evaluate("A"), None);
        assert_eq!(table.evaluate("C"), None);
    }

    #[test]
    fn test_literal_forms() {
        let table = MacroTable::default();
        assert_eq!(table.evaluate_text("010"), Some(MacroValue::Int(8)));
        assert_eq!(table.evaluate_text("0x1F"), Some(MacroValue::Int(31)));
        assert_eq!(table.evaluate_text("42UL"), Some(MacroValue::Int(42)));
        assert_eq!(table.evaluate_text("-(2 - 5) % 2"), Some(MacroValue::Int(1)));
        assert_eq!(table.evaluate_text("1 / 0"), None);
        assert_eq!(table.evaluate_text("(1"), None);
    }
}
