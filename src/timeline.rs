// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Day separators and relative date labels for a sorted history.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// How two adjacent messages are judged to fall on the same day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayGrouping {
    /// Full calendar date.
    #[default]
    CalendarDate,
    /// Day-of-month number only. Treats the 30th of two different months as
    /// the same day; kept for compatibility with older clients.
    DayOfMonth,
}

/// One row of a rendered conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineItem<'a> {
    Separator { day: NaiveDate, label: String },
    Message(&'a Message),
}

/// Calendar day of a millisecond timestamp in `tz`.
pub fn message_day<Tz: TimeZone>(timestamp_ms: i64, tz: &Tz) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .with_timezone(tz)
        .date_naive()
}

pub fn same_day(a: NaiveDate, b: NaiveDate, grouping: DayGrouping) -> bool {
    match grouping {
        DayGrouping::CalendarDate => a == b,
        DayGrouping::DayOfMonth => a.day() == b.day(),
    }
}

/// Label for a separator, relative to `today`.
pub fn relative_label(day: NaiveDate, today: NaiveDate) -> String {
    let diff_days = today.signed_duration_since(day).num_days();
    match diff_days {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2 => "Day before yesterday".to_string(),
        3..=6 => format!("{} days ago", diff_days),
        _ => day.format("%d/%m/%Y").to_string(),
    }
}

/// Interleave day separators with `messages`, which must already be sorted.
pub fn timeline<'a, Tz: TimeZone>(
    messages: &'a [Message],
    today: NaiveDate,
    tz: &Tz,
    grouping: DayGrouping,
) -> Vec<TimelineItem<'a>> {
    let mut items = Vec::with_capacity(messages.len() + 1);
    let mut previous: Option<NaiveDate> = None;

    for message in messages {
        let day = message_day(message.timestamp, tz);
        let starts_new_day = match previous {
            Some(prev) => !same_day(prev, day, grouping),
            None => true,
        };

        if starts_new_day {
            items.push(TimelineItem::Separator {
                day,
                label: relative_label(day, today),
            });
        }

        items.push(TimelineItem::Message(message));
        previous = Some(day);
    }

    items
}
