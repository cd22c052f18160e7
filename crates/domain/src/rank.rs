//! Fractional-indexing rank codec and engine.
//!
//! A rank is a short string key (one letter `a`..`z` followed by two decimal
//! digits) whose lexicographic order equals its numeric order over the range
//! `0..=2599`. Items in an ordering scope carry unique ranks; new items are
//! placed by computing a rank before, after, or between existing neighbors.
//! When adjacent ranks leave no room, the scope is rebalanced with evenly
//! spaced ranks to restore insertion headroom.

use std::fmt::{Display, Formatter};

use lattice_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Largest encodable rank value, `"z99"`.
pub const MAX_RANK_VALUE: u16 = 2599;

/// Default gap used when stepping before the first or after the last rank.
pub const DEFAULT_GAP: u16 = 100;

/// Minimum adjacent gap below which a scope is considered too tight.
pub const REBALANCE_THRESHOLD: u16 = 100;

/// Gap between regenerated ranks during a scope rebalance.
pub const REBALANCE_GAP: u16 = 1000;

/// Opaque short-string total-order key for an item within an ordered scope.
///
/// String comparison and numeric comparison agree by construction, so `Ord`
/// is derived over the underlying string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rank(String);

impl Rank {
    /// Parses a rank string, validating the `letter + two digits` format.
    pub fn parse(value: &str) -> AppResult<Self> {
        let bytes = value.as_bytes();
        let valid = bytes.len() == 3
            && bytes[0].is_ascii_lowercase()
            && bytes[1].is_ascii_digit()
            && bytes[2].is_ascii_digit();

        if !valid {
            return Err(AppError::Validation(format!(
                "invalid rank '{value}': expected one letter 'a'-'z' followed by two digits"
            )));
        }

        Ok(Self(value.to_owned()))
    }

    /// Encodes a numeric value in `0..=2599` as a rank.
    pub fn from_value(value: u16) -> AppResult<Self> {
        if value > MAX_RANK_VALUE {
            return Err(AppError::Validation(format!(
                "rank value {value} exceeds maximum {MAX_RANK_VALUE}"
            )));
        }

        Ok(Self(encode(value)))
    }

    /// Returns the fixed rank assigned to the first item of an empty scope.
    #[must_use]
    pub fn initial() -> Self {
        Self(encode(0))
    }

    /// Decodes this rank into its numeric value.
    #[must_use]
    pub fn value(&self) -> u16 {
        let bytes = self.0.as_bytes();
        let letter = u16::from(bytes[0] - b'a');
        let tens = u16::from(bytes[1] - b'0');
        let ones = u16::from(bytes[2] - b'0');
        letter * 100 + tens * 10 + ones
    }

    /// Returns the underlying rank string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for Rank {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

fn encode(value: u16) -> String {
    let letter = b'a' + u8::try_from(value / 100).unwrap_or(0);
    let remainder = value % 100;
    format!("{}{}{}", letter as char, remainder / 10, remainder % 10)
}

/// Computes the floor midpoint between two ranks.
///
/// Callers must pass `before < after`. Fails with
/// [`AppError::RankExhausted`] when the midpoint does not strictly exceed
/// `before`, i.e. the two ranks are numerically adjacent.
pub fn middle(before: &Rank, after: &Rank) -> AppResult<Rank> {
    let midpoint = (before.value() + after.value()) / 2;

    if midpoint <= before.value() {
        return Err(AppError::RankExhausted(format!(
            "no room between ranks '{before}' and '{after}'"
        )));
    }

    Rank::from_value(midpoint)
}

/// Computes a rank `gap` steps before `first`, saturating at the minimum.
#[must_use]
pub fn before(first: &Rank, gap: u16) -> Rank {
    Rank(encode(first.value().saturating_sub(gap)))
}

/// Computes a rank `gap` steps after `last`, clamped at the maximum.
#[must_use]
pub fn after(last: &Rank, gap: u16) -> Rank {
    Rank(encode((last.value() + gap).min(MAX_RANK_VALUE)))
}

/// Returns whether any adjacent pair in an ascending rank sequence has a gap
/// below `threshold`. Sequences shorter than two never need rebalancing.
#[must_use]
pub fn needs_rebalancing(ranks: &[Rank], threshold: u16) -> bool {
    ranks
        .windows(2)
        .any(|pair| pair[1].value() - pair[0].value() < threshold)
}

/// Generates `count` strictly increasing, evenly spaced ranks starting at
/// `start`.
///
/// When `start + (count - 1) * gap` would exceed the encodable range, the gap
/// shrinks to the largest spacing that fits. Fails with
/// [`AppError::RankExhausted`] only when `count` ranks cannot fit above
/// `start` even at unit spacing.
pub fn evenly_spaced(count: usize, start: &Rank, gap: u16) -> AppResult<Vec<Rank>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let start_value = u32::from(start.value());
    let room = u32::from(MAX_RANK_VALUE) - start_value;
    let steps = u32::try_from(count - 1)
        .ok()
        .filter(|steps| *steps <= room)
        .ok_or_else(|| {
            AppError::RankExhausted(format!("cannot fit {count} ranks above '{start}'"))
        })?;

    let fitted_gap = if steps == 0 {
        u32::from(gap)
    } else {
        u32::from(gap).min(room / steps)
    };

    Ok((0..u32::try_from(count).unwrap_or(u32::MAX))
        .map(|index| {
            let value = start_value + index * fitted_gap;
            Rank(encode(u16::try_from(value).unwrap_or(MAX_RANK_VALUE)))
        })
        .collect())
}
