use std::collections::BTreeSet;

use chrono::NaiveDate;

/// Default ceiling on how many days in a row one person may hold a
/// rotation before the scheduler must rotate them out.
pub const DEFAULT_CONSECUTIVE_LIMIT: u32 = 7;

/// How many calendar days in a row, ending at `as_of`, the person was on
/// call. Walks backwards day by day; a gap stops the count, and an
/// `as_of` with no coverage counts zero. Duplicate rotations on one day
/// still count it once.
pub fn consecutive_on_call_days(days: &BTreeSet<NaiveDate>, as_of: NaiveDate) -> u32 {
    let mut count = 0;
    let mut cursor = as_of;
    while days.contains(&cursor) {
        count += 1;
        match cursor.pred_opt() {
            Some(previous) => cursor = previous,
            None => break,
        }
    }
    count
}

pub fn exceeds_consecutive_limit(
    days: &BTreeSet<NaiveDate>,
    as_of: NaiveDate,
    limit: u32,
) -> bool {
    consecutive_on_call_days(days, as_of) > limit
}
