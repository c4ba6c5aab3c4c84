//! Identifier codec.
//!
//! A Testomat.io identifier is the token `@T` followed by exactly eight ASCII
//! alphanumeric characters, embedded in a test's display name and separated
//! from the rest of the name by whitespace:
//!
//! ```text
//! Test Addition @T96c700e6
//! ```
//!
//! All functions here are pure string transformations.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Prefix every identifier token starts with.
pub const ID_PREFIX: &str = "@T";

/// Number of alphanumeric characters following the prefix.
pub const ID_BODY_LEN: usize = 8;

/// A complete identifier token, capturing its body.
static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"^{}([A-Za-z0-9]{{{}}})$", regex::escape(ID_PREFIX), ID_BODY_LEN);
    Regex::new(&pattern).expect("identifier pattern is valid")
});

/// Whitespace-delimited words of a display name.
static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+").expect("word pattern is valid"));

/// Error returned when a string is not a valid identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid test identifier: {0:?}")]
pub struct InvalidTestId(pub String);

/// A canonical test identifier such as `@T96c700e6`.
///
/// Only the eight-character body is stored; [`fmt::Display`] renders the
/// canonical token including the prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestId(String);

impl TestId {
    /// Parses a canonical token (`@T` + body).
    pub fn parse(token: &str) -> Result<Self, InvalidTestId> {
        ID_PATTERN
            .captures(token)
            .and_then(|caps| caps.get(1))
            .map(|body| TestId(body.as_str().to_string()))
            .ok_or_else(|| InvalidTestId(token.to_string()))
    }

    /// Builds an identifier from its eight-character body.
    pub fn from_body(body: &str) -> Result<Self, InvalidTestId> {
        if is_valid_body(body) {
            Ok(TestId(body.to_string()))
        } else {
            Err(InvalidTestId(body.to_string()))
        }
    }

    /// Parses the forms the service uses in responses: `@Txxxxxxxx`,
    /// `Txxxxxxxx` or the bare body.
    pub fn parse_lenient(raw: &str) -> Result<Self, InvalidTestId> {
        let raw = raw.trim();
        if raw.starts_with(ID_PREFIX) {
            return Self::parse(raw);
        }
        match raw.strip_prefix('T') {
            Some(body) if raw.len() == ID_BODY_LEN + 1 => Self::from_body(body),
            _ => Self::from_body(raw),
        }
    }

    /// The eight-character body without the prefix.
    pub fn body(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ID_PREFIX, self.0)
    }
}

impl FromStr for TestId {
    type Err = InvalidTestId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s)
    }
}

impl Serialize for TestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TestId::parse_lenient(&raw).map_err(serde::de::Error::custom)
    }
}

fn is_valid_body(body: &str) -> bool {
    body.len() == ID_BODY_LEN && body.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Byte span of the last whitespace-delimited identifier token in `name`.
fn find_token(name: &str) -> Option<(usize, usize, TestId)> {
    WORD_PATTERN
        .find_iter(name)
        .filter_map(|word| {
            TestId::parse(word.as_str())
                .ok()
                .map(|id| (word.start(), word.end(), id))
        })
        .last()
}

/// Splits a display name into its base name and identifier.
///
/// The last identifier token wins when several are present. The base name
/// has the token and the whitespace around it collapsed to a single space.
pub fn extract(display_name: &str) -> (String, Option<TestId>) {
    match find_token(display_name) {
        Some((start, end, id)) => (join_around(display_name, start, end), Some(id)),
        None => (display_name.trim_end().to_string(), None),
    }
}

/// Appends `id` to `base_name`, separated by a single space.
pub fn inject(base_name: &str, id: &TestId) -> String {
    let base = base_name.trim_end();
    if base.is_empty() {
        id.to_string()
    } else {
        format!("{} {}", base, id)
    }
}

/// Removes every identifier token from a display name.
pub fn strip(display_name: &str) -> String {
    let mut name = display_name.to_string();
    while let Some((start, end, _)) = find_token(&name) {
        name = join_around(&name, start, end);
    }
    name.trim_end().to_string()
}

/// Replaces any identifier in `display_name` with `id`.
pub fn replace(display_name: &str, id: &TestId) -> String {
    inject(&strip(display_name), id)
}

fn join_around(name: &str, start: usize, end: usize) -> String {
    let before = name[..start].trim_end();
    let after = name[end..].trim_start();
    match (before.is_empty(), after.is_empty()) {
        (true, _) => after.trim_end().to_string(),
        (false, true) => before.to_string(),
        (false, false) => format!("{} {}", before, after.trim_end()),
    }
}
