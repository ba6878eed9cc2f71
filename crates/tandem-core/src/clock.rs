// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Calendar-day helpers. A "day" is always a local calendar day.

use std::time::Duration;

use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::types::format_timestamp;

/// Today's local calendar date.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// The instant `day` begins in `tz`. Falls forward past DST gaps.
pub fn start_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> DateTime<Utc> {
    let mut naive = day.and_time(NaiveTime::MIN);
    for _ in 0..4 {
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => return t.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => naive += chrono::Duration::minutes(30),
        }
    }
    naive.and_utc()
}

/// Half-open UTC bounds `[start, end)` of a local day, in the persisted
/// timestamp layout.
pub fn day_bounds(day: NaiveDate) -> (String, String) {
    let next = day.succ_opt().unwrap_or(day);
    (
        format_timestamp(start_of_day(&Local, day)),
        format_timestamp(start_of_day(&Local, next)),
    )
}

/// Time left until the next midnight in `now`'s timezone. Never zero.
pub fn ttl_until_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let tz = now.timezone();
    let tomorrow = now
        .date_naive()
        .succ_opt()
        .unwrap_or_else(|| now.date_naive());
    let remaining = start_of_day(&tz, tomorrow) - now.with_timezone(&Utc);
    remaining
        .to_std()
        .unwrap_or_default()
        .max(Duration::from_secs(1))
}
