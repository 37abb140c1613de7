//! Unit string parsing.
//!
//! Unit strings are products of symbols raised to integer powers:
//!
//! ```text
//! expr    = term (('/' | 'per') term)*
//! term    = factor (('*' | '·' | ' ') factor)*
//! factor  = ( symbol | '(' expr ')' ) (('^' | '**')? exponent)?
//! symbol  = [A-Za-z_][A-Za-z0-9_]* | '%'
//! ```
//!
//! `degK s^-1`, `degK/s` and `degK per s` all parse to `{degK: 1, s: -1}`.
//! The empty string, `1` and `dimensionless` are dimensionless.

use super::dimension::Dimension;
use super::registry::{UnitInfo, UNIT_REGISTRY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    UnknownUnit(String),
    InvalidExponent(String),
    UnexpectedChar(char),
    ParseFailed(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownUnit(u) => write!(f, "unknown unit: '{u}'"),
            Self::InvalidExponent(e) => write!(f, "invalid exponent: '{e}'"),
            Self::UnexpectedChar(c) => write!(f, "unexpected character: '{c}'"),
            Self::ParseFailed(msg) => write!(f, "parse failed: {msg}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// A unit as a product of registered symbols with integer exponents.
///
/// `W/m^2` is `{W: 1, m: -2}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedUnit {
    components: BTreeMap<String, i32>,
}

impl ParsedUnit {
    #[must_use]
    pub fn dimensionless() -> Self {
        Self {
            components: BTreeMap::new(),
        }
    }

    fn symbol(symbol: String, exp: i32) -> Self {
        Self::from_components([(symbol, exp)].into_iter().collect())
    }

    #[must_use]
    pub fn from_components(components: BTreeMap<String, i32>) -> Self {
        Self {
            components: components.into_iter().filter(|(_, e)| *e != 0).collect(),
        }
    }

    /// Parses a unit string, checking every symbol against the registry.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let input = input.trim();
        if input.is_empty() || input == "1" || input.eq_ignore_ascii_case("dimensionless") {
            return Ok(Self::dimensionless());
        }
        let mut parser = UnitParser { input, pos: 0 };
        let parsed = parser.expression()?;
        parser.skip_whitespace();
        if let Some(c) = parser.peek() {
            return Err(ParseError::UnexpectedChar(c));
        }
        for symbol in parsed.components.keys() {
            lookup(symbol)?;
        }
        Ok(parsed)
    }

    #[must_use]
    pub fn components(&self) -> &BTreeMap<String, i32> {
        &self.components
    }

    pub fn dimension(&self) -> Result<Dimension, ParseError> {
        self.components
            .iter()
            .try_fold(Dimension::dimensionless(), |acc, (symbol, &exp)| {
                Ok(acc * lookup(symbol)?.dimension.pow(exp as i8))
            })
    }

    /// Multiplier converting a value in this unit to SI base units.
    pub fn to_si_factor(&self) -> Result<f64, ParseError> {
        self.components
            .iter()
            .try_fold(1.0, |acc, (symbol, &exp)| {
                Ok(acc * lookup(symbol)?.to_si_factor.powi(exp))
            })
    }

    /// Offset added after scaling to SI.
    ///
    /// Non-zero only for a lone absolute temperature scale such as `degC`;
    /// inside a compound unit the symbol denotes a difference.
    pub fn to_si_offset(&self) -> Result<f64, ParseError> {
        match self.components.iter().next() {
            Some((symbol, &1)) if self.components.len() == 1 => Ok(lookup(symbol)?.to_si_offset),
            _ => Ok(0.0),
        }
    }

    #[must_use]
    pub fn multiply(&self, other: &Self) -> Self {
        let mut components = self.components.clone();
        for (symbol, exp) in &other.components {
            *components.entry(symbol.clone()).or_insert(0) += exp;
        }
        Self::from_components(components)
    }

    #[must_use]
    pub fn divide(&self, other: &Self) -> Self {
        self.multiply(&other.pow(-1))
    }

    #[must_use]
    pub fn pow(&self, exp: i32) -> Self {
        Self::from_components(
            self.components
                .iter()
                .map(|(k, v)| (k.clone(), v * exp))
                .collect(),
        )
    }

    /// Canonical form using exponent notation, e.g. `degK s^-1`.
    #[must_use]
    pub fn normalized(&self) -> String {
        if self.components.is_empty() {
            return "1".to_string();
        }
        let mut positive: Vec<_> = self.components.iter().filter(|(_, e)| **e > 0).collect();
        let negative: Vec<_> = self.components.iter().filter(|(_, e)| **e < 0).collect();
        positive.extend(negative);
        positive
            .into_iter()
            .map(|(s, &e)| if e == 1 { s.clone() } else { format!("{s}^{e}") })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ParsedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized())
    }
}

fn lookup(symbol: &str) -> Result<UnitInfo, ParseError> {
    UNIT_REGISTRY
        .lookup(symbol)
        .ok_or_else(|| ParseError::UnknownUnit(symbol.to_string()))
}

struct UnitParser<'a> {
    input: &'a str,
    pos: usize,
}

impl UnitParser<'_> {
    fn expression(&mut self) -> Result<ParsedUnit, ParseError> {
        let mut result = self.term()?;
        loop {
            self.skip_whitespace();
            if self.eat('/') || self.eat_keyword("per") {
                result = result.divide(&self.term()?);
            } else {
                return Ok(result);
            }
        }
    }

    fn term(&mut self) -> Result<ParsedUnit, ParseError> {
        let mut result = self.factor()?;
        loop {
            self.skip_whitespace();
            if self.eat('*') || self.eat('\u{00B7}') {
                result = result.multiply(&self.factor()?);
                continue;
            }
            match self.peek() {
                Some(c) if starts_factor(c) && !self.at_keyword("per") => {
                    result = result.multiply(&self.factor()?);
                }
                _ => return Ok(result),
            }
        }
    }

    fn factor(&mut self) -> Result<ParsedUnit, ParseError> {
        self.skip_whitespace();
        let base = if self.eat('(') {
            let inner = self.expression()?;
            self.skip_whitespace();
            if !self.eat(')') {
                return Err(ParseError::ParseFailed("missing closing parenthesis".into()));
            }
            inner
        } else {
            ParsedUnit::symbol(self.symbol()?, 1)
        };
        Ok(base.pow(self.exponent()?))
    }

    fn symbol(&mut self) -> Result<String, ParseError> {
        if self.eat('%') {
            return Ok("percent".to_string());
        }
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.bump(),
            Some(c) => return Err(ParseError::UnexpectedChar(c)),
            None => return Err(ParseError::ParseFailed("expected unit symbol".into())),
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        let word = &self.input[start..self.pos];

        // Trailing digits are an implicit exponent (`m2`) unless the whole
        // word is a registered symbol.
        let letters = word.trim_end_matches(|c: char| c.is_ascii_digit());
        if letters.len() < word.len() && UNIT_REGISTRY.lookup(word).is_none() {
            self.pos = start + letters.len();
            return Ok(letters.to_string());
        }
        Ok(word.to_string())
    }

    fn exponent(&mut self) -> Result<i32, ParseError> {
        let explicit = if self.input[self.pos..].starts_with("**") {
            self.pos += 2;
            true
        } else {
            self.eat('^')
        };
        if explicit {
            self.skip_whitespace();
        }
        let start = self.pos;
        if matches!(self.peek(), Some('-')) && explicit {
            self.bump();
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        let digits = &self.input[start..self.pos];
        if digits.is_empty() {
            return if explicit {
                Err(ParseError::InvalidExponent(String::new()))
            } else {
                Ok(1)
            };
        }
        digits
            .parse()
            .map_err(|_| ParseError::InvalidExponent(digits.to_string()))
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        let rest = &self.input[self.pos..];
        rest.starts_with(keyword)
            && !matches!(rest[keyword.len()..].chars().next(), Some(c) if c.is_ascii_alphanumeric())
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }
}

fn starts_factor(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '(' || c == '%'
}
