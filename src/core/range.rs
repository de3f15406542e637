//! Voucher and barcode number ranges.
//!
//! Ranges are closed intervals. Lists built with [`merge_range`] never hold
//! two ranges that overlap or sit next to each other.

use std::{collections::HashSet, fmt, ops::RangeInclusive, str::FromStr};

use anyhow::{Context, Result};
use itertools::Itertools;
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cli::{AppContext, OutputFormat, RangesArgs};
use crate::core::loader::read_range_csv;

/// Runs shorter than this stay as singleton ranges
const MIN_RUN_LEN: usize = 3;

/// Anything with inclusive integer bounds.
pub trait RangeDescriptor
{
    fn min(&self) -> i64;

    fn max(&self) -> i64;

    fn set_min(
        &mut self,
        min: i64,
    );

    fn set_max(
        &mut self,
        max: i64,
    );

    /// Inclusive on both ends.
    fn contains(
        &self,
        value: i64,
    ) -> bool
    {
        self.min() <= value && value <= self.max()
    }

    /// True when the two ranges overlap or are adjacent.
    fn touches<O: RangeDescriptor + ?Sized>(
        &self,
        other: &O,
    ) -> bool
    {
        other.min() <= self.max().saturating_add(1) && other.max() >= self.min().saturating_sub(1)
    }
}

/// Closed interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range
{
    pub min: i64,
    pub max: i64,
}

impl Range
{
    /// Bounds may come in either order.
    pub fn new(
        a: i64,
        b: i64,
    ) -> Self
    {
        Self { min: a.min(b), max: a.max(b) }
    }

    pub fn single(value: i64) -> Self
    {
        Self { min: value, max: value }
    }

    /// Count of numbers covered, saturating at `u64::MAX`
    pub fn len(&self) -> u64
    {
        let count = (i128::from(self.max) - i128::from(self.min) + 1).max(0);
        u64::try_from(count).unwrap_or(u64::MAX)
    }

    pub fn is_empty(&self) -> bool
    {
        self.max < self.min
    }

    pub fn values(&self) -> RangeInclusive<i64>
    {
        self.min..=self.max
    }
}

impl RangeDescriptor for Range
{
    fn min(&self) -> i64
    {
        self.min
    }

    fn max(&self) -> i64
    {
        self.max
    }

    fn set_min(
        &mut self,
        min: i64,
    )
    {
        self.min = min;
    }

    fn set_max(
        &mut self,
        max: i64,
    )
    {
        self.max = max;
    }
}

impl fmt::Display for Range
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RangeParseError
{
    #[error("empty range")]
    Empty,

    #[error("invalid range bound '{0}'")]
    InvalidBound(String),
}

impl FromStr for Range
{
    type Err = RangeParseError;

    /// Accepts `MIN-MAX` or a single `N`.
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let s = s.trim();
        if s.is_empty()
        {
            return Err(RangeParseError::Empty);
        }

        let bound = |text: &str| {
            let text = text.trim();
            text.parse::<i64>()
                .map_err(|_| RangeParseError::InvalidBound(text.to_owned()))
        };

        // Skip the first char so a leading sign is not read as the separator
        let separator = s
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '-')
            .map(|(pos, _)| pos);

        match separator
        {
            Some(pos) => Ok(Range::new(bound(&s[..pos])?, bound(&s[pos + 1..])?)),
            None => bound(s).map(Range::single),
        }
    }
}

/// Add `range` to `ranges`, absorbing every range it touches.
///
/// The widened range takes the slot of the first range it absorbed, or goes
/// to the end when nothing touched. Returns its index.
pub fn merge_range<T: RangeDescriptor>(
    mut range: T,
    ranges: &mut Vec<T>,
) -> usize
{
    let mut slot: Option<usize> = None;

    // Widening can bring ranges that were out of reach into contact
    while let Some(idx) = ranges
        .iter()
        .position(|r| r.touches(&range))
    {
        let absorbed = ranges.remove(idx);
        range.set_min(range.min().min(absorbed.min()));
        range.set_max(range.max().max(absorbed.max()));
        slot = Some(slot.map_or(idx, |s| s.min(idx)));
    }

    let idx = slot.unwrap_or(ranges.len());
    ranges.insert(idx, range);
    idx
}

/// Merge every range into a disjoint list.
pub fn coalesce<T: RangeDescriptor>(ranges: impl IntoIterator<Item = T>) -> Vec<T>
{
    let mut merged = Vec::new();

    for range in ranges
    {
        merge_range(range, &mut merged);
    }

    merged
}

/// Group numbers into ranges.
///
/// Values are sorted and de-duplicated first. Runs of consecutive numbers
/// longer than two become one range; shorter runs become singletons.
pub fn ranges_from_values(values: &[i64]) -> Vec<Range>
{
    let sorted: Vec<i64> = values
        .iter()
        .copied()
        .sorted_unstable()
        .dedup()
        .collect();

    let mut ranges = Vec::new();
    let mut start = 0;

    while start < sorted.len()
    {
        let mut end = start + 1;
        while end < sorted.len() && sorted[end - 1].checked_add(1) == Some(sorted[end])
        {
            end += 1;
        }

        let run = &sorted[start..end];
        if run.len() >= MIN_RUN_LEN
        {
            ranges.push(Range::new(run[0], run[run.len() - 1]));
        }
        else
        {
            ranges.extend(
                run.iter()
                    .copied()
                    .map(Range::single),
            );
        }

        start = end;
    }

    ranges
}

/// How many numbers a range list can hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity
{
    /// No ranges configured: numbering is not restricted
    Unbounded,
    Limited(u64),
}

impl Capacity
{
    pub fn limit(self) -> Option<u64>
    {
        match self
        {
            Capacity::Unbounded => None,
            Capacity::Limited(n) => Some(n),
        }
    }
}

impl fmt::Display for Capacity
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        match self
        {
            Capacity::Unbounded => write!(f, "unbounded"),
            Capacity::Limited(n) => write!(f, "{n}"),
        }
    }
}

/// Total count of numbers covered; an empty list is unbounded.
pub fn capacity<T: RangeDescriptor>(ranges: &[T]) -> Capacity
{
    if ranges.is_empty()
    {
        return Capacity::Unbounded;
    }

    Capacity::Limited(
        ranges
            .iter()
            .map(|r| Range::new(r.min(), r.max()).len())
            .fold(0u64, u64::saturating_add),
    )
}

/// Every number covered, range by range.
pub fn values<T: RangeDescriptor>(ranges: &[T]) -> impl Iterator<Item = i64> + '_
{
    ranges
        .iter()
        .flat_map(|r| r.min()..=r.max())
}

/// First candidate not already used.
pub fn next_available<I>(
    candidates: &mut I,
    used: &HashSet<i64>,
) -> Option<i64>
where
    I: Iterator<Item = i64>,
{
    candidates.find(|candidate| !used.contains(candidate))
}

/// `rsetup ranges`: group the numbers of a range CSV and merge extra ranges.
pub fn run(
    args: RangesArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let numbers = read_range_csv(&args.input)
        .with_context(|| format!("Failed to read range file {}", args.input.display()))?;

    let mut ranges = ranges_from_values(&numbers);
    for extra in args.add
    {
        merge_range(extra, &mut ranges);
    }
    ranges.sort_by_key(|r| r.min);

    let total = capacity(&ranges);

    match args.format
    {
        OutputFormat::Json =>
        {
            let out = json!({
                "ranges": ranges,
                "capacity": total.limit(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text =>
        {
            for range in &ranges
            {
                if ctx.no_color
                {
                    println!("{range}");
                }
                else
                {
                    println!("{}", range.cyan());
                }
            }

            if !ctx.quiet
            {
                println!("capacity: {total}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn r(
        min: i64,
        max: i64,
    ) -> Range
    {
        Range::new(min, max)
    }

    #[test]
    fn disjoint_range_is_appended()
    {
        let mut ranges = vec![r(5, 7)];

        let idx = merge_range(r(1, 3), &mut ranges);

        assert_eq!(idx, 1);
        assert_eq!(ranges, vec![r(5, 7), r(1, 3)]);
    }

    #[test]
    fn adjacent_range_is_absorbed_in_place()
    {
        let mut ranges = vec![r(1, 3), r(8, 10)];

        let idx = merge_range(r(4, 6), &mut ranges);

        assert_eq!(idx, 0);
        assert_eq!(ranges, vec![r(1, 6), r(8, 10)]);
    }

    #[test]
    fn bridging_range_joins_both_neighbours()
    {
        let mut ranges = vec![r(20, 30), r(1, 3), r(5, 9)];

        merge_range(r(4, 4), &mut ranges);

        assert_eq!(ranges, vec![r(20, 30), r(1, 9)]);
    }

    #[test]
    fn gap_of_one_is_not_adjacent()
    {
        let mut ranges = vec![r(1, 3)];

        merge_range(r(5, 6), &mut ranges);

        assert_eq!(ranges, vec![r(1, 3), r(5, 6)]);
    }

    #[test]
    fn runs_shorter_than_three_stay_singletons()
    {
        assert_eq!(
            ranges_from_values(&[1, 2, 3, 5, 6, 9]),
            vec![r(1, 3), r(5, 5), r(6, 6), r(9, 9)]
        );
    }

    #[test]
    fn values_are_sorted_and_deduplicated_before_grouping()
    {
        assert_eq!(ranges_from_values(&[12, 10, 11, 11, 4]), vec![r(4, 4), r(10, 12)]);
        assert!(ranges_from_values(&[]).is_empty());
    }

    #[test]
    fn capacity_counts_numbers_and_empty_is_unbounded()
    {
        assert_eq!(capacity::<Range>(&[]), Capacity::Unbounded);
        assert_eq!(capacity(&[r(1, 3), r(10, 10)]), Capacity::Limited(4));
        assert_eq!(Capacity::Limited(4).to_string(), "4");
    }

    #[test]
    fn capacity_saturates_for_the_full_i64_span()
    {
        let full = Range::new(i64::MIN, i64::MAX);

        assert_eq!(full.len(), u64::MAX);
        assert_eq!(capacity(&[full]), Capacity::Limited(u64::MAX));
        assert_eq!(capacity(&[full, r(0, 0)]), Capacity::Limited(u64::MAX));
    }

    #[test]
    fn next_available_skips_used_numbers()
    {
        let ranges = [r(1, 3), r(7, 8)];
        let used: HashSet<i64> = [1, 2, 3, 7].into_iter().collect();
        let mut candidates = values(&ranges);

        assert_eq!(next_available(&mut candidates, &used), Some(8));
        assert_eq!(next_available(&mut candidates, &used), None);
    }

    #[test]
    fn display_and_parse_agree()
    {
        let range = r(100, 250);

        assert_eq!(range.to_string(), "100-250");
        assert_eq!("100-250".parse::<Range>(), Ok(range));
        assert_eq!("250-100".parse::<Range>(), Ok(range));
        assert_eq!("42".parse::<Range>(), Ok(Range::single(42)));
        assert_eq!("-5-3".parse::<Range>(), Ok(r(-5, 3)));
        assert_eq!(
            "a-b".parse::<Range>(),
            Err(RangeParseError::InvalidBound("a".into()))
        );
        assert_eq!("".parse::<Range>(), Err(RangeParseError::Empty));
    }

    #[test]
    fn contains_is_inclusive()
    {
        let range = r(10, 12);

        assert!(range.contains(10));
        assert!(range.contains(12));
        assert!(!range.contains(13));
    }
}
