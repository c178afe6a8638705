use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A shard id, `s<decimal>` (spec §6).
///
/// `Ord` implements the "version sort" used throughout the agency and
/// the repair engine: shards compare by the *numeric value* of the
/// digit run that follows the leading `s`, then lexicographically by
/// whatever text follows the digits. The numeric comparison is done on
/// the digit strings themselves (length-then-lexicographic, after
/// stripping leading zeros) rather than by parsing into a fixed-width
/// integer, so it can't silently wrap around at an `i8`/`u8` boundary
/// the way a naive cast-and-compare would.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(String);

impl ShardId {
    pub fn new(numeric: u64) -> Self {
        ShardId(format!("s{numeric}"))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        ShardId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the id into its digit run and trailing suffix, stripping
    /// the leading `s` if present. Tolerant of malformed input (no
    /// digits at all, or digits embedded past other text) since the
    /// comparator must never panic on arbitrary agency content.
    fn digits_and_suffix(&self) -> (&str, &str) {
        let body = self.0.strip_prefix('s').unwrap_or(&self.0);
        let digit_len = body.find(|c: char| !c.is_ascii_digit()).unwrap_or(body.len());
        body.split_at(digit_len)
    }
}

/// Compares two digit runs by value without parsing them into a
/// fixed-width integer: strip leading zeros, then compare by length
/// and lexicographically. Two digit strings of equal length compare
/// the same way numerically as they do lexicographically, so this is
/// an exact, overflow-free stand-in for numeric comparison.
fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

impl Ord for ShardId {
    fn cmp(&self, other: &Self) -> Ordering {
        let (da, sa) = self.digits_and_suffix();
        let (db, sb) = other.digits_and_suffix();
        compare_digit_runs(da, db).then_with(|| sa.cmp(sb))
    }
}

impl PartialOrd for ShardId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for ShardId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShardId {
    fn from(s: &str) -> Self {
        ShardId(s.to_string())
    }
}
