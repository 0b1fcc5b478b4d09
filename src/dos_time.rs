//! The MS-DOS packed date/time format used by ZIP headers.
//!
//! MS-DOS packs a local date and time into 32 bits:
//!
//! ```text
//! bits  0..4    second / 2 (0..29, i.e. 2-second resolution)
//! bits  5..10   minute (0..59)
//! bits 11..15   hour (0..23)
//! bits 16..20   day of month (1..31)
//! bits 21..24   month (1..12)
//! bits 25..31   year - 1980 (0..127)
//! ```
//!
//! On disk the time half comes first; [`DosDateTime`] holds the combined
//! `(date << 16) | time` word that the header codec assembles.

use chrono::offset::LocalResult;
use chrono::{Datelike, Local, NaiveDate, TimeZone, Timelike};

use crate::result::*;

/// A date and time packed in the 32-bit MS-DOS format.
///
/// Representable values run from 1980-01-01 00:00:00 to
/// 2107-12-31 23:59:58, with seconds rounded to a 2-second grid.
/// Conversion to and from Unix time goes through the *local* time zone,
/// since that is what MS-DOS (and every ZIP tool since) stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DosDateTime(u32);

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable date/time
    pub const MIN: DosDateTime = DosDateTime(0x0021_0000);

    /// 2107-12-31 23:59:58, the latest representable date/time
    pub const MAX: DosDateTime = DosDateTime(0xFF9F_BF7D);

    /// Packs the given broken-down local time.
    ///
    /// Every field is validated against its range, including days per
    /// month under Gregorian leap rules. Seconds are truncated to the
    /// 2-second grid.
    pub fn from_fields(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> ZipResult<Self> {
        if !(1980..=2107).contains(&year) {
            return Err(ZipError::InvalidValue("year outside 1980..=2107"));
        }
        if !(1..=12).contains(&month) {
            return Err(ZipError::InvalidValue("month outside 1..=12"));
        }
        if day < 1 || day > days_in_month(year, month) {
            return Err(ZipError::InvalidValue("day outside the given month"));
        }
        if hour > 23 {
            return Err(ZipError::InvalidValue("hour outside 0..=23"));
        }
        if minute > 59 {
            return Err(ZipError::InvalidValue("minute outside 0..=59"));
        }
        if second > 59 {
            return Err(ZipError::InvalidValue("second outside 0..=59"));
        }

        Ok(DosDateTime(
            u32::from(year - 1980) << 25
                | u32::from(month) << 21
                | u32::from(day) << 16
                | u32::from(hour) << 11
                | u32::from(minute) << 5
                | u32::from(second) >> 1,
        ))
    }

    /// Wraps a packed value as-is, without validating its fields.
    ///
    /// Headers carry whatever bits the archiver wrote; use
    /// [`is_valid`](Self::is_valid) before trusting the fields.
    pub fn from_raw(packed: u32) -> Self {
        DosDateTime(packed)
    }

    /// The packed 32-bit value, `(date << 16) | time`
    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn year(self) -> u16 {
        (self.0 >> 25) as u16 + 1980
    }

    pub fn month(self) -> u8 {
        (self.0 >> 21 & 0x0f) as u8
    }

    pub fn day(self) -> u8 {
        (self.0 >> 16 & 0x1f) as u8
    }

    pub fn hour(self) -> u8 {
        (self.0 >> 11 & 0x1f) as u8
    }

    pub fn minute(self) -> u8 {
        (self.0 >> 5 & 0x3f) as u8
    }

    /// Seconds, always even
    pub fn second(self) -> u8 {
        (self.0 & 0x1f) as u8 * 2
    }

    /// Returns true if every packed field is within its range.
    pub fn is_valid(self) -> bool {
        Self::from_fields(
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second(),
        )
        .map(|rebuilt| rebuilt == self)
        .unwrap_or(false)
    }

    /// Converts a Unix timestamp using the local time zone.
    ///
    /// Odd seconds round *up* to the next even second, so
    /// `from_unix(t)?.to_unix()? == (t + 1) & !1` across the whole
    /// representable range. Timestamps outside that range fail with
    /// [`ZipError::InvalidValue`].
    pub fn from_unix(timestamp: i64) -> ZipResult<Self> {
        let rounded = timestamp
            .checked_add(1)
            .ok_or(ZipError::InvalidValue("timestamp out of range"))?
            & !1;
        let local = Local
            .timestamp_opt(rounded, 0)
            .single()
            .ok_or(ZipError::InvalidValue("timestamp out of range"))?;
        let year = local.year();
        if !(1980..=2107).contains(&year) {
            return Err(ZipError::InvalidValue(
                "timestamp outside the DOS range 1980..=2107",
            ));
        }
        Self::from_fields(
            year as u16,
            local.month() as u8,
            local.day() as u8,
            local.hour() as u8,
            local.minute() as u8,
            local.second() as u8,
        )
    }

    /// Reassembles a Unix timestamp using the local time zone.
    ///
    /// Fails with [`ZipError::InvalidValue`] if the packed fields are out
    /// of range or name a nonexistent local time (e.g. inside a DST gap).
    /// An ambiguous local time resolves to its earlier occurrence.
    pub fn to_unix(self) -> ZipResult<i64> {
        let naive = NaiveDate::from_ymd_opt(
            i32::from(self.year()),
            u32::from(self.month()),
            u32::from(self.day()),
        )
        .and_then(|date| {
            date.and_hms_opt(
                u32::from(self.hour()),
                u32::from(self.minute()),
                u32::from(self.second()),
            )
        })
        .ok_or(ZipError::InvalidValue("packed DOS date/time fields out of range"))?;

        match Local.from_local_datetime(&naive) {
            LocalResult::Single(local) => Ok(local.timestamp()),
            LocalResult::Ambiguous(earlier, _later) => Ok(earlier.timestamp()),
            LocalResult::None => Err(ZipError::InvalidValue("nonexistent local time")),
        }
    }
}

fn is_leap_year(year: u16) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn packs_the_well_known_limits() {
        assert_eq!(
            DosDateTime::from_fields(1980, 1, 1, 0, 0, 0).unwrap(),
            DosDateTime::MIN
        );
        assert_eq!(
            DosDateTime::from_fields(2107, 12, 31, 23, 59, 58).unwrap(),
            DosDateTime::MAX
        );
        // 59 lands on the same 2-second slot as 58.
        assert_eq!(
            DosDateTime::from_fields(2107, 12, 31, 23, 59, 59).unwrap(),
            DosDateTime::MAX
        );
    }

    #[test]
    fn fields_round_trip() {
        let t = DosDateTime::from_fields(1999, 12, 31, 23, 59, 48).unwrap();
        assert_eq!(t.year(), 1999);
        assert_eq!(t.month(), 12);
        assert_eq!(t.day(), 31);
        assert_eq!(t.hour(), 23);
        assert_eq!(t.minute(), 59);
        assert_eq!(t.second(), 48);
        assert!(t.is_valid());
    }

    #[test]
    fn odd_seconds_truncate() {
        let t = DosDateTime::from_fields(2001, 2, 3, 4, 5, 7).unwrap();
        assert_eq!(t.second(), 6);
    }

    #[test]
    fn out_of_range_fields_are_rejected() {
        assert!(DosDateTime::from_fields(1979, 12, 31, 0, 0, 0).is_err());
        assert!(DosDateTime::from_fields(2108, 1, 1, 0, 0, 0).is_err());
        assert!(DosDateTime::from_fields(2000, 0, 1, 0, 0, 0).is_err());
        assert!(DosDateTime::from_fields(2000, 13, 1, 0, 0, 0).is_err());
        assert!(DosDateTime::from_fields(2000, 1, 0, 0, 0, 0).is_err());
        assert!(DosDateTime::from_fields(2000, 1, 32, 0, 0, 0).is_err());
        assert!(DosDateTime::from_fields(2000, 4, 31, 0, 0, 0).is_err());
        assert!(DosDateTime::from_fields(2000, 1, 1, 24, 0, 0).is_err());
        assert!(DosDateTime::from_fields(2000, 1, 1, 0, 60, 0).is_err());
        assert!(DosDateTime::from_fields(2000, 1, 1, 0, 0, 60).is_err());
    }

    #[test]
    fn leap_years_follow_gregorian_rules() {
        // 1980 and 2000 are leap years; 1981 and 2100 are not.
        assert!(DosDateTime::from_fields(1980, 2, 29, 0, 0, 0).is_ok());
        assert!(DosDateTime::from_fields(2000, 2, 29, 0, 0, 0).is_ok());
        assert!(DosDateTime::from_fields(1981, 2, 29, 0, 0, 0).is_err());
        assert!(DosDateTime::from_fields(2100, 2, 29, 0, 0, 0).is_err());
        assert!(DosDateTime::from_fields(2000, 2, 30, 0, 0, 0).is_err());
    }

    #[test]
    fn raw_values_report_validity() {
        assert!(DosDateTime::MIN.is_valid());
        assert!(DosDateTime::MAX.is_valid());
        // Month and day of zero: not a real date.
        assert!(!DosDateTime::from_raw(0).is_valid());
    }

    #[test]
    fn unix_round_trip_lands_on_the_even_grid() {
        // Mid-range instants, far from any DST transition in common zones.
        for t in [
            1_000_000_000_i64,
            1_000_000_001,
            1_234_567_890,
            1_600_000_000,
        ] {
            let packed = DosDateTime::from_unix(t).unwrap();
            assert_eq!(packed.to_unix().unwrap(), (t + 1) & !1, "t = {}", t);
        }
    }

    #[test]
    fn unix_conversion_rejects_the_far_past_and_future() {
        // 1970 and a long way past 2107
        assert!(DosDateTime::from_unix(0).is_err());
        assert!(DosDateTime::from_unix(5_000_000_000).is_err());
    }
}
