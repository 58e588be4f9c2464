//! Parser for Python literal syntax (`{'key': 'value', 'flag': True}`).
//!
//! Upstream systems sometimes serialise nested payloads with `repr()` instead of
//! JSON. This covers the subset those payloads use: dicts, lists, tuples,
//! strings (single, double or triple quoted, with optional `r`/`u` prefix),
//! integers, floats, `True`, `False` and `None`. Output is mapped onto
//! `serde_json::Value`; tuples become arrays and non-string dict keys are
//! stringified.

use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("unexpected character {found:?} at offset {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),

    #[error("unknown name {0:?}")]
    UnknownName(String),

    #[error("containers nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Same limit serde_json applies before giving up on a document.
pub const MAX_DEPTH: usize = 128;

pub fn parse(input: &str) -> Result<Value, LiteralError> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_trivia();
    match parser.peek() {
        None => Ok(value),
        Some(found) => Err(LiteralError::Unexpected {
            found,
            offset: parser.pos,
        }),
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Result<char, LiteralError> {
        let c = self.peek().ok_or(LiteralError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(c)
    }

    fn expect(&mut self, wanted: char) -> Result<(), LiteralError> {
        let offset = self.pos;
        match self.bump()? {
            c if c == wanted => Ok(()),
            found => Err(LiteralError::Unexpected { found, offset }),
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.skip_trivia();
        let offset = self.pos;
        match self.peek().ok_or(LiteralError::UnexpectedEnd)? {
            '{' | '[' | '(' => self.container(),
            '\'' | '"' => self.strings(false),
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            c if c.is_alphabetic() || c == '_' => self.name(),
            found => Err(LiteralError::Unexpected { found, offset }),
        }
    }

    fn dict(&mut self) -> Result<Value, LiteralError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(key) => key,
                other => other.to_string(),
            };
            self.skip_trivia();
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_trivia();
            let offset = self.pos;
            match self.bump()? {
                ',' => continue,
                '}' => return Ok(Value::Object(map)),
                found => return Err(LiteralError::Unexpected { found, offset }),
            }
        }
    }

    fn container(&mut self) -> Result<Value, LiteralError> {
        if self.depth == MAX_DEPTH {
            return Err(LiteralError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let value = match self.peek() {
            Some('{') => self.dict(),
            Some('[') => self.sequence('[', ']'),
            _ => self.paren(),
        };
        self.depth -= 1;
        value
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Value, LiteralError> {
        self.expect(open)?;
        self.items(close, Vec::new())
    }

    /// Continue a sequence whose opening bracket (and any `items`) were already consumed.
    fn items(&mut self, close: char, mut items: Vec<Value>) -> Result<Value, LiteralError> {
        loop {
            self.skip_trivia();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_trivia();
            let offset = self.pos;
            match self.bump()? {
                ',' => continue,
                c if c == close => return Ok(Value::Array(items)),
                found => return Err(LiteralError::Unexpected { found, offset }),
            }
        }
    }

    /// `(x)` is just `x`; `()` and `(x,)` are tuples.
    fn paren(&mut self) -> Result<Value, LiteralError> {
        self.expect('(')?;
        self.skip_trivia();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(Value::Array(Vec::new()));
        }
        let first = self.value()?;
        self.skip_trivia();
        let offset = self.pos;
        match self.bump()? {
            ')' => Ok(first),
            ',' => self.items(')', vec![first]),
            found => Err(LiteralError::Unexpected { found, offset }),
        }
    }

    fn name(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            "None" => Ok(Value::Null),
            prefix if matches!(self.peek(), Some('\'' | '"')) => {
                let lower = prefix.to_ascii_lowercase();
                match lower.as_str() {
                    "u" => self.strings(false),
                    "r" => self.strings(true),
                    _ => Err(LiteralError::UnknownName(word.clone())),
                }
            }
            _ => Err(LiteralError::UnknownName(word.clone())),
        }
    }

    /// Adjacent string literals concatenate, as they do in Python source.
    fn strings(&mut self, raw: bool) -> Result<Value, LiteralError> {
        let mut out = self.string(raw)?;
        loop {
            let resume = self.pos;
            self.skip_trivia();
            match self.peek() {
                Some('\'' | '"') => out.push_str(&self.string(false)?),
                Some('r' | 'R') if matches!(self.peek_at(1), Some('\'' | '"')) => {
                    self.pos += 1;
                    out.push_str(&self.string(true)?);
                }
                Some('u' | 'U') if matches!(self.peek_at(1), Some('\'' | '"')) => {
                    self.pos += 1;
                    out.push_str(&self.string(false)?);
                }
                _ => {
                    self.pos = resume;
                    return Ok(Value::String(out));
                }
            }
        }
    }

    fn string(&mut self, raw: bool) -> Result<String, LiteralError> {
        let quote = self.bump()?;
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.pos += 2;
        }
        let mut out = String::new();
        loop {
            let offset = self.pos;
            let c = self.bump()?;
            if c == quote {
                if !triple {
                    return Ok(out);
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.pos += 2;
                    return Ok(out);
                }
                out.push(c);
            } else if c == '\n' && !triple {
                return Err(LiteralError::Unexpected { found: c, offset });
            } else if c == '\\' {
                if raw {
                    out.push(c);
                    out.push(self.bump()?);
                } else {
                    self.escape(&mut out, offset)?;
                }
            } else {
                out.push(c);
            }
        }
    }

    fn escape(&mut self, out: &mut String, offset: usize) -> Result<(), LiteralError> {
        let c = self.bump()?;
        match c {
            '\n' => {}
            '\\' | '\'' | '"' => out.push(c),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            'x' => out.push(self.hex_char(2, offset)?),
            'u' => out.push(self.hex_char(4, offset)?),
            'U' => out.push(self.hex_char(8, offset)?),
            '0'..='7' => {
                let mut code = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(digit) => {
                            code = code * 8 + digit;
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(code).ok_or(LiteralError::InvalidEscape(offset))?);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn hex_char(&mut self, digits: usize, offset: usize) -> Result<char, LiteralError> {
        let mut code = 0u32;
        for _ in 0..digits {
            let digit = self
                .bump()?
                .to_digit(16)
                .ok_or(LiteralError::InvalidEscape(offset))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or(LiteralError::InvalidEscape(offset))
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        let negative = match self.peek() {
            Some('-') => {
                self.pos += 1;
                true
            }
            Some('+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };
        self.skip_trivia();
        let body_start = self.pos;
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '-' || c == '+')
                && matches!(self.chars.get(self.pos.wrapping_sub(1)), Some('e' | 'E'))
                && !self.is_radix_literal(body_start);
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[body_start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let invalid = || LiteralError::InvalidNumber(self.chars[start..self.pos].iter().collect());
        if text.is_empty() {
            return Err(invalid());
        }

        let radix = match text.get(..2).map(|p| p.to_ascii_lowercase()) {
            Some(p) if p == "0x" => Some(16),
            Some(p) if p == "0o" => Some(8),
            Some(p) if p == "0b" => Some(2),
            _ => None,
        };
        if let Some(radix) = radix {
            let magnitude = i64::from_str_radix(&text[2..], radix).map_err(|_| invalid())?;
            return Ok(Value::Number(Number::from(if negative {
                -magnitude
            } else {
                magnitude
            })));
        }

        if text.chars().all(|c| c.is_ascii_digit()) {
            let signed = if negative { format!("-{text}") } else { text.clone() };
            if let Ok(int) = signed.parse::<i64>() {
                return Ok(Value::Number(Number::from(int)));
            }
        }
        let float: f64 = text.parse().map_err(|_| invalid())?;
        let float = if negative { -float } else { float };
        Number::from_f64(float).map(Value::Number).ok_or_else(invalid)
    }

    fn is_radix_literal(&self, body_start: usize) -> bool {
        self.chars.get(body_start) == Some(&'0')
            && matches!(
                self.chars.get(body_start + 1),
                Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')
            )
    }
}
