//! Field tokenizer for AT response lines.
//!
//! A line such as `+CREG: 2,1,"00C3","0000A13B",2` is consumed left to right:
//! [`Tokenizer::start`] skips past the `:` and every `next_*` call pops one
//! comma separated field. Quoted fields may contain commas.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("line has no `:` prefix separator: {0}")]
    MissingPrefix(String),
    #[error("no more tokens")]
    Exhausted,
    #[error("not an integer: {0:?}")]
    NotAnInteger(String),
    #[error("unbalanced brackets")]
    UnbalancedBracket,
}

#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    rest: Option<&'a str>,
}

impl<'a> Tokenizer<'a> {
    /// Positions the tokenizer right after the first `:` of `line`.
    pub fn start(line: &'a str) -> Result<Self, TokenError> {
        let (_, rest) = line
            .split_once(':')
            .ok_or_else(|| TokenError::MissingPrefix(line.to_owned()))?;

        Ok(Self { rest: Some(rest) })
    }

    /// Tokenizes `fields` as is, without looking for a prefix.
    pub fn raw(fields: &'a str) -> Self {
        Self { rest: Some(fields) }
    }

    pub fn has_more(&self) -> bool {
        self.rest.is_some_and(|rest| !rest.is_empty())
    }

    /// What has not been consumed yet.
    pub fn remainder(&self) -> &'a str {
        self.rest.unwrap_or_default()
    }

    pub fn next_str(&mut self) -> Result<&'a str, TokenError> {
        let cur = self.rest.ok_or(TokenError::Exhausted)?.trim_start();

        if let Some(quoted) = cur.strip_prefix('"') {
            let Some(end) = quoted.find('"') else {
                self.rest = None;
                return Ok(quoted);
            };
            let after = &quoted[end + 1..];
            self.rest = Some(after.split_once(',').map_or("", |(_, rest)| rest));

            return Ok(&quoted[..end]);
        }

        match cur.split_once(',') {
            Some((tok, rest)) => {
                self.rest = Some(rest);
                Ok(tok)
            }
            None => {
                self.rest = None;
                Ok(cur)
            }
        }
    }

    pub fn next_int(&mut self) -> Result<i32, TokenError> {
        let tok = self.next_str()?;
        parse_leading_int(tok, 10)
    }

    pub fn next_hex_int(&mut self) -> Result<i32, TokenError> {
        let tok = self.next_str()?;
        parse_leading_int(tok, 16)
    }

    pub fn next_bool(&mut self) -> Result<bool, TokenError> {
        match self.next_int()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(TokenError::NotAnInteger(other.to_string())),
        }
    }

    /// Pops the contents of the next `( ... )` group and skips the comma after
    /// it. Brackets inside quoted strings do not count.
    pub fn next_bracket(&mut self) -> Result<&'a str, TokenError> {
        let cur = self.rest.ok_or(TokenError::Exhausted)?;
        let mut brackets = unquoted(cur).filter(|(_, c)| matches!(c, '(' | ')'));
        let open = match brackets.next() {
            Some((at, '(')) => at,
            Some(_) => return Err(TokenError::UnbalancedBracket),
            None => return Err(TokenError::Exhausted),
        };
        let close = match brackets.next() {
            Some((at, ')')) => at,
            _ => return Err(TokenError::UnbalancedBracket),
        };

        let inner = &cur[open + 1..close];
        let after = &cur[close + 1..];
        self.rest = Some(after.strip_prefix(',').unwrap_or(after));

        Ok(inner)
    }

    /// Counts the `( ... )` groups left on the line.
    pub fn bracket_count(&self) -> usize {
        unquoted(self.remainder())
            .filter(|(_, c)| *c == '(')
            .count()
    }
}

/// The characters of `s` that are outside double quotes, with their offsets.
fn unquoted(s: &str) -> impl Iterator<Item = (usize, char)> + '_ {
    let mut quoted = false;
    s.char_indices().filter(move |(_, c)| {
        if *c == '"' {
            quoted = !quoted;
        }
        !quoted && *c != '"'
    })
}

/// Parses the leading integer of `tok` the way `strtol` would: surrounding
/// whitespace and trailing garbage are ignored, but at least one digit is
/// required.
fn parse_leading_int(tok: &str, radix: u32) -> Result<i32, TokenError> {
    let trimmed = tok.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(digits.len());
    if end == 0 {
        return Err(TokenError::NotAnInteger(tok.to_owned()));
    }

    let value = i64::from_str_radix(&digits[..end], radix)
        .map_err(|_| TokenError::NotAnInteger(tok.to_owned()))?;
    let value = if negative { -value } else { value };

    i32::try_from(value).map_err(|_| TokenError::NotAnInteger(tok.to_owned()))
}

/// `atoi` semantics: whatever leading integer there is, zero otherwise.
pub fn atoi(s: &str) -> i32 {
    parse_leading_int(s, 10).unwrap_or(0)
}
