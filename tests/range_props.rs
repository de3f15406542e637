//! Invariants of range merging over arbitrary inputs

use std::collections::BTreeSet;

use proptest::prelude::*;
use relief_setup::core::range::{
    Capacity, Range, RangeDescriptor, capacity, coalesce, ranges_from_values, values,
};

fn small_range() -> impl Strategy<Value = Range>
{
    (-50i64..50, 0i64..8).prop_map(|(min, len)| Range::new(min, min + len))
}

proptest! {
    #[test]
    fn merged_ranges_never_touch(input in prop::collection::vec(small_range(), 0..20))
    {
        let merged = coalesce(input);

        for (i, a) in merged.iter().enumerate()
        {
            for b in merged.iter().skip(i + 1)
            {
                prop_assert!(!a.touches(b), "{a} touches {b}");
            }
        }
    }

    #[test]
    fn merging_preserves_coverage(input in prop::collection::vec(small_range(), 1..20))
    {
        let expected: BTreeSet<i64> = values(&input).collect();
        let merged = coalesce(input);
        let covered: BTreeSet<i64> = values(&merged).collect();

        prop_assert_eq!(&covered, &expected);
        prop_assert_eq!(capacity(&merged), Capacity::Limited(expected.len() as u64));
    }

    #[test]
    fn grouping_covers_each_distinct_value_once(input in prop::collection::vec(-100i64..100, 0..40))
    {
        let distinct: BTreeSet<i64> = input.iter().copied().collect();
        let grouped = ranges_from_values(&input);
        let listed: Vec<i64> = values(&grouped).collect();

        prop_assert_eq!(listed, distinct.into_iter().collect::<Vec<_>>());
    }
}
