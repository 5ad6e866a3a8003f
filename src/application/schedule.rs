//! Weekly trigger time computation

use std::fmt;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveTime, Offset, TimeZone, Utc, Weekday,
};
use serde::Serialize;

/// Fires once a week on `weekday` at `time` in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeeklySchedule {
    #[serde(serialize_with = "serialize_weekday")]
    weekday: Weekday,
    time: NaiveTime,
    #[serde(serialize_with = "serialize_offset")]
    offset: FixedOffset,
}

fn serialize_weekday<S: serde::Serializer>(weekday: &Weekday, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(weekday)
}

fn serialize_offset<S: serde::Serializer>(offset: &FixedOffset, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(offset)
}

impl WeeklySchedule {
    pub const fn new(weekday: Weekday, time: NaiveTime, offset: FixedOffset) -> Self {
        Self {
            weekday,
            time,
            offset,
        }
    }

    pub const fn weekday(&self) -> Weekday {
        self.weekday
    }

    pub const fn time(&self) -> NaiveTime {
        self.time
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_now = now.with_timezone(&self.offset);
        let days_ahead = (7 + self.weekday.num_days_from_monday()
            - local_now.weekday().num_days_from_monday())
            % 7;
        let date = local_now.date_naive() + Duration::days(i64::from(days_ahead));

        let mut candidate = self.at_local(date.and_time(self.time));
        if candidate <= now {
            candidate += Duration::days(7);
        }
        candidate
    }

    fn at_local(&self, naive: chrono::NaiveDateTime) -> DateTime<Utc> {
        // A fixed offset maps every local time to exactly one instant.
        self.offset
            .from_local_datetime(&naive)
            .single()
            .map_or_else(|| naive.and_utc(), |dt| dt.with_timezone(&Utc))
    }
}

impl Default for WeeklySchedule {
    fn default() -> Self {
        Self::new(
            Weekday::Mon,
            NaiveTime::from_hms_opt(3, 30, 0).unwrap_or_default(),
            Utc.fix(),
        )
    }
}

impl fmt::Display for WeeklySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "every {} at {} (UTC{})",
            self.weekday,
            self.time.format("%H:%M"),
            self.offset
        )
    }
}
