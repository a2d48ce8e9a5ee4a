//! Pattern rules and their ranking
//!
//! A rule pattern is written against the pattern key (VIN positions 4-8
//! followed by 10-17). Each position is a literal, a wildcard (`*` or `?`) or
//! a character class (`[A-C]`). Specificity is the number of constrained
//! positions. All backends rank candidates with [`compare_rank`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::vin::segments::PATTERN_KEY_LENGTH;

/// Number of VDS positions in the pattern key
const VDS_LENGTH: usize = 5;

/// Errors from parsing a stored pattern
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("Pattern '{0}' is longer than 13 positions")]
    TooLong(String),

    #[error("Pattern '{0}' has more than 5 positions before '|'")]
    VdsTooLong(String),

    #[error("Pattern '{0}' has an unterminated character class")]
    UnterminatedClass(String),

    #[error("Pattern '{0}' has an empty character class")]
    EmptyClass(String),

    #[error("Pattern '{0}' contains more than one '|'")]
    MultipleSeparators(String),
}

/// One position of a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    Any,
    Literal(char),
    Class(Vec<char>),
}

impl Position {
    fn matches(&self, c: char) -> bool {
        match self {
            Position::Any => true,
            Position::Literal(l) => *l == c,
            Position::Class(members) => members.contains(&c),
        }
    }

    fn is_constrained(&self) -> bool {
        !matches!(self, Position::Any)
    }
}

/// A parsed match pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    positions: Vec<Position>,
    specificity: usize,
}

impl Pattern {
    /// Parse a stored pattern
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        let mut positions = Vec::new();
        let mut chars = source.trim().chars().map(|c| c.to_ascii_uppercase()).peekable();
        let mut separated = false;

        while let Some(c) = chars.next() {
            match c {
                '|' => {
                    if separated {
                        return Err(PatternError::MultipleSeparators(source.to_string()));
                    }
                    if positions.len() > VDS_LENGTH {
                        return Err(PatternError::VdsTooLong(source.to_string()));
                    }
                    positions.resize(VDS_LENGTH, Position::Any);
                    separated = true;
                }
                '*' | '?' => positions.push(Position::Any),
                '[' => {
                    let mut members = Vec::new();
                    let mut closed = false;
                    while let Some(m) = chars.next() {
                        if m == ']' {
                            closed = true;
                            break;
                        }
                        // Range such as A-C
                        if chars.peek() == Some(&'-') {
                            chars.next();
                            match chars.next() {
                                Some(']') | None => {
                                    members.push(m);
                                    members.push('-');
                                    closed = true;
                                    break;
                                }
                                Some(end) => members.extend(m..=end),
                            }
                        } else {
                            members.push(m);
                        }
                    }
                    if !closed {
                        return Err(PatternError::UnterminatedClass(source.to_string()));
                    }
                    members.sort_unstable();
                    members.dedup();
                    if members.is_empty() {
                        return Err(PatternError::EmptyClass(source.to_string()));
                    }
                    positions.push(Position::Class(members));
                }
                other => positions.push(Position::Literal(other)),
            }
        }

        if positions.len() > PATTERN_KEY_LENGTH {
            return Err(PatternError::TooLong(source.to_string()));
        }

        let specificity = positions.iter().filter(|p| p.is_constrained()).count();
        Ok(Self {
            source: source.trim().to_string(),
            positions,
            specificity,
        })
    }

    /// Match against a pattern key; positions past the end of the pattern are wildcards
    pub fn matches(&self, key: &str) -> bool {
        let mut key_chars = key.chars();
        self.positions.iter().all(|position| match key_chars.next() {
            Some(c) => position.matches(c),
            None => !position.is_constrained(),
        })
    }

    /// Count of constrained positions
    pub fn specificity(&self) -> usize {
        self.specificity
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A dataset rule: when `pattern` matches, `element` takes `value`
#[derive(Debug, Clone, PartialEq)]
pub struct PatternRule {
    /// Insertion order in the dataset; the last tie-break
    pub id: i64,
    pub wmi: String,
    pub element: String,
    pub pattern: Pattern,
    pub value: String,
    pub value_id: Option<String>,
    /// Explicit tie-break, higher wins
    pub priority: i32,
    pub year_from: Option<u16>,
    pub year_to: Option<u16>,
}

impl PatternRule {
    /// Create a rule with default priority and no applicability window
    pub fn new(
        id: i64,
        wmi: impl Into<String>,
        element: impl Into<String>,
        pattern: &str,
        value: impl Into<String>,
    ) -> Result<Self, PatternError> {
        Ok(Self {
            id,
            wmi: wmi.into().to_ascii_uppercase(),
            element: element.into(),
            pattern: Pattern::parse(pattern)?,
            value: value.into(),
            value_id: None,
            priority: 0,
            year_from: None,
            year_to: None,
        })
    }

    /// Builder method: set the priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Builder method: set the applicability window (inclusive, either end open)
    pub fn with_years(mut self, from: Option<u16>, to: Option<u16>) -> Self {
        self.year_from = from;
        self.year_to = to;
        self
    }

    /// Builder method: set the value identifier
    pub fn with_value_id(mut self, value_id: impl Into<String>) -> Self {
        self.value_id = Some(value_id.into());
        self
    }

    pub fn specificity(&self) -> usize {
        self.pattern.specificity()
    }

    pub fn matches(&self, key: &str) -> bool {
        self.pattern.matches(key)
    }

    /// True if the rule carries an applicability window
    pub fn has_window(&self) -> bool {
        self.year_from.is_some() || self.year_to.is_some()
    }

    /// True if the rule applies to the model year; unwindowed rules apply to every year
    pub fn applies_to(&self, year: u16) -> bool {
        self.year_from.map_or(true, |from| year >= from) && self.year_to.map_or(true, |to| year <= to)
    }

    /// Precomputed ordering key, see [`compare_rank`]
    pub fn rank_key(&self) -> RankKey {
        RankKey {
            specificity: self.specificity(),
            priority: self.priority,
            window_end: self.year_to.unwrap_or(u16::MAX),
            window_start: self.year_from.unwrap_or(0),
            id: self.id,
        }
    }
}

/// Ordering key for candidate rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankKey {
    pub specificity: usize,
    pub priority: i32,
    pub window_end: u16,
    pub window_start: u16,
    pub id: i64,
}

impl Ord for RankKey {
    /// `Less` means ranked first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .specificity
            .cmp(&self.specificity)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.window_end.cmp(&self.window_end))
            .then_with(|| other.window_start.cmp(&self.window_start))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Rank two rules: more specific, then higher priority, then the most recent
/// window (open-ended counts as most recent), then insertion order
pub fn compare_rank(a: &PatternRule, b: &PatternRule) -> Ordering {
    a.rank_key().cmp(&b.rank_key())
}

/// Sort candidates into rank order
pub fn sort_ranked(rules: &mut [PatternRule]) {
    rules.sort_by(compare_rank);
}
