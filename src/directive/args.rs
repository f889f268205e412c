//! Positional-argument access for directive routing.

use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use regex::Regex;

use crate::error::{DirectiveError, DirectiveResult};
use crate::expression::Expression;

/// Borrowed view over a directive's positional arguments, carrying enough context to build
/// [`DirectiveError`]s.
pub(crate) struct Args<'a> {
    line: usize,
    directive: &'static str,
    args: &'a [String],
}

impl<'a> Args<'a> {
    pub(crate) fn new(line: usize, directive: &'static str, args: &'a [String]) -> Self {
        Self {
            line,
            directive,
            args,
        }
    }

    pub(crate) fn missing(&self, argument: &'static str) -> DirectiveError {
        DirectiveError::MissingArgument {
            line: self.line,
            directive: self.directive,
            argument,
        }
    }

    pub(crate) fn invalid(
        &self,
        argument: &'static str,
        raw: &str,
        message: impl Into<String>,
    ) -> DirectiveError {
        DirectiveError::InvalidArgument {
            line: self.line,
            directive: self.directive,
            argument,
            raw: raw.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn optional(&self, idx: usize) -> Option<&'a str> {
        self.args
            .get(idx)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub(crate) fn required(&self, idx: usize, argument: &'static str) -> DirectiveResult<&'a str> {
        self.optional(idx).ok_or_else(|| self.missing(argument))
    }

    pub(crate) fn string(&self, idx: usize, argument: &'static str) -> DirectiveResult<String> {
        self.required(idx, argument).map(str::to_string)
    }

    /// Everything from `idx` on, joined with single spaces.
    pub(crate) fn rest(&self, idx: usize, argument: &'static str) -> DirectiveResult<String> {
        let tail = self.args.get(idx..).unwrap_or_default();
        let joined = tail.join(" ");
        if joined.trim().is_empty() {
            return Err(self.missing(argument));
        }
        Ok(joined)
    }

    /// Comma-separated column list, which may also be spread across several arguments.
    pub(crate) fn columns(
        &self,
        idx: usize,
        argument: &'static str,
    ) -> DirectiveResult<Vec<String>> {
        let columns: Vec<String> = self
            .args
            .get(idx..)
            .unwrap_or_default()
            .iter()
            .flat_map(|a| a.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if columns.is_empty() {
            return Err(self.missing(argument));
        }
        Ok(columns)
    }

    pub(crate) fn parse<T>(&self, idx: usize, argument: &'static str) -> DirectiveResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.required(idx, argument)?;
        raw.trim()
            .parse::<T>()
            .map_err(|e| self.invalid(argument, raw, e.to_string()))
    }

    pub(crate) fn parse_optional<T>(
        &self,
        idx: usize,
        argument: &'static str,
    ) -> DirectiveResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(idx) {
            Some(_) => self.parse(idx, argument).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn flag(
        &self,
        idx: usize,
        argument: &'static str,
        default: bool,
    ) -> DirectiveResult<bool> {
        match self.optional(idx) {
            None => Ok(default),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" | "force" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(self.invalid(argument, raw, "expected true or false")),
            },
        }
    }

    pub(crate) fn regex(&self, raw: &str, argument: &'static str) -> DirectiveResult<Regex> {
        Regex::new(raw).map_err(|e| self.invalid(argument, raw, e.to_string()))
    }

    /// A regex that must match the whole value.
    pub(crate) fn full_match_regex(
        &self,
        raw: &str,
        argument: &'static str,
    ) -> DirectiveResult<Regex> {
        Regex::new(&format!("^(?:{raw})$")).map_err(|e| self.invalid(argument, raw, e.to_string()))
    }

    /// A chrono strftime pattern taken from the rest of the arguments.
    pub(crate) fn strftime(&self, idx: usize, argument: &'static str) -> DirectiveResult<String> {
        let raw = self.rest(idx, argument)?;
        if StrftimeItems::new(&raw).any(|item| matches!(item, Item::Error)) {
            return Err(self.invalid(argument, &raw, "not a valid strftime pattern"));
        }
        Ok(raw)
    }

    pub(crate) fn expression(
        &self,
        idx: usize,
        argument: &'static str,
    ) -> DirectiveResult<Expression> {
        let raw = self.rest(idx, argument)?;
        Expression::parse(&raw).map_err(|e| self.invalid(argument, &raw, e.to_string()))
    }
}

/// Interpret the common escaped spellings of single-character delimiters.
pub(crate) fn unescape_delimiter(raw: &str) -> String {
    match raw {
        "\\t" | "\\\\t" | "tab" => "\t".to_string(),
        "\\n" | "\\\\n" => "\n".to_string(),
        "\\s" | "space" => " ".to_string(),
        "\\|" | "pipe" => "|".to_string(),
        "comma" => ",".to_string(),
        other => other.to_string(),
    }
}
