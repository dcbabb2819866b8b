//! Wall-clock zone for naive CSV timestamps
//!
//! Exports write local wall-clock times without an offset. The zone decides
//! how those are pinned to instants, and how instants are bucketed back
//! into days and hours.

use chrono::{
    DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike,
    Utc,
};

/// Zone used to interpret and render wall-clock times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zone {
    /// The host's local time zone
    #[default]
    Local,
    /// A fixed offset from UTC
    Fixed(FixedOffset),
}

impl Zone {
    pub fn utc() -> Self {
        Zone::Fixed(Utc.fix())
    }

    /// Parse `local`, `utc`/`Z`, or a `+HH:MM` / `-HH:MM` / `+HHMM` offset
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        match text.to_lowercase().as_str() {
            "local" | "" => return Some(Zone::Local),
            "utc" | "z" => return Some(Self::utc()),
            _ => {}
        }

        let (sign, rest) = match text.as_bytes().first()? {
            b'+' => (1, &text[1..]),
            b'-' => (-1, &text[1..]),
            _ => return None,
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let hours: i32 = digits[..2].parse().ok()?;
        let minutes: i32 = digits[2..].parse().ok()?;
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).map(Zone::Fixed)
    }

    /// Pin a wall-clock time to an instant
    ///
    /// Ambiguous local times resolve to the earlier instant; times inside a
    /// DST gap are shifted forward by an hour.
    pub fn resolve(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Zone::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .or_else(|| {
                    Local
                        .from_local_datetime(&(naive + Duration::hours(1)))
                        .earliest()
                })
                .map(|dt| dt.with_timezone(&Utc)),
            Zone::Fixed(offset) => offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    /// Wall-clock time of an instant in this zone
    pub fn naive_local(&self, ts: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Zone::Local => ts.with_timezone(&Local).naive_local(),
            Zone::Fixed(offset) => ts.with_timezone(offset).naive_local(),
        }
    }

    /// Hour-of-day of an instant in this zone
    pub fn hour(&self, ts: DateTime<Utc>) -> u32 {
        self.naive_local(ts).hour()
    }

    /// Start-of-day and end-of-day (last millisecond) of `date`
    pub fn day_bounds(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.resolve(date.and_hms_opt(0, 0, 0)?)?;
        let end = self.resolve(date.and_hms_milli_opt(23, 59, 59, 999)?)?;
        Some((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zone() {
        assert_eq!(Zone::parse("local"), Some(Zone::Local));
        assert_eq!(Zone::parse("UTC"), Some(Zone::utc()));
        assert_eq!(
            Zone::parse("+05:30"),
            Some(Zone::Fixed(FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()))
        );
        assert_eq!(
            Zone::parse("-0800"),
            Some(Zone::Fixed(FixedOffset::west_opt(8 * 3600).unwrap()))
        );
        assert_eq!(Zone::parse("Mars/Olympus"), None);
        assert_eq!(Zone::parse("+5"), None);
    }

    #[test]
    fn test_fixed_zone_resolution() {
        let zone = Zone::parse("-05:00").unwrap();
        let naive = NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap();

        let instant = zone.resolve(naive).unwrap();
        assert_eq!(instant.to_rfc3339(), "2025-01-16T04:00:00+00:00");
        assert_eq!(zone.hour(instant), 23);
        assert_eq!(zone.naive_local(instant), naive);
    }

    #[test]
    fn test_day_bounds() {
        let zone = Zone::utc();
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let (start, end) = zone.day_bounds(date).unwrap();

        assert_eq!(start.to_rfc3339(), "2025-01-15T00:00:00+00:00");
        assert_eq!(end - start, Duration::days(1) - Duration::milliseconds(1));
    }
}
