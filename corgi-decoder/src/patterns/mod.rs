//! Rule patterns and resolution
//!
//! `rule` holds the pattern syntax and the single rank comparator every
//! backend shares; `resolver` picks winners per element.

pub mod resolver;
pub mod rule;

pub use resolver::{CandidateSet, Resolution, ResolvedElement};
pub use rule::{compare_rank, Pattern, PatternError, PatternRule, RankKey};
