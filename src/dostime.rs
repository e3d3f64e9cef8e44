//! MS-DOS timestamps, as stored in local and central file headers.
//!
//! The wire format packs a calendar date and wall-clock time into 32 bits:
//!
//! ```text
//! (year - 1980) << 25 | month << 21 | day << 16 |
//! hour << 11          | minute << 5 | second / 2
//! ```
//!
//! Seconds get 2-second granularity, years span 1980-2107, and the value is
//! wall-clock local time with no zone attached. We convert to and from
//! [`NaiveDateTime`] and leave zone policy to the caller.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// The earliest representable DOS timestamp, used when a header carries
/// a nonsense date.
pub fn dos_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1980, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Unpacks a 32-bit DOS timestamp.
///
/// Returns `None` for impossible dates (month 0, day 32, hour 25...).
/// Readers treat those as [`dos_epoch`] rather than failing the entry;
/// plenty of archivers write zeros here.
pub fn dos_to_datetime(dos: u32) -> Option<NaiveDateTime> {
    let time = (dos & 0xFFFF) as u16;
    let date = (dos >> 16) as u16;

    let seconds = (0b0000_0000_0001_1111 & time) as u32 * 2; // 2-second precision
    let minutes = (0b0000_0111_1110_0000 & time) as u32 >> 5;
    let hours = (0b1111_1000_0000_0000 & time) as u32 >> 11;

    let days = (0b0000_0000_0001_1111 & date) as u32;
    let months = (0b0000_0001_1110_0000 & date) as u32 >> 5;
    // Years since 1980; always interpreted as a positive value
    let years = ((0b1111_1110_0000_0000 & date) >> 9) as i32 + 1980;

    NaiveDate::from_ymd_opt(years, months, days)?.and_hms_opt(hours, minutes, seconds)
}

/// Packs a timestamp into the 32-bit DOS layout.
///
/// Times before 1980 clamp to the DOS epoch and times after 2107 to the
/// last representable second; the bottom second bit is dropped either way.
pub fn datetime_to_dos(t: &NaiveDateTime) -> u32 {
    let year = t.year();
    if year < 1980 {
        return 0b0000_0000_0010_0001 << 16; // 1980-01-01 00:00:00
    }
    if year > 2107 {
        // 2107-12-31 23:59:58
        return (0b1111_1111_1001_1111u32 << 16) | 0b1011_1111_0111_1101;
    }

    let date =
        (((year - 1980) as u32) << 9) | (t.month() << 5) | t.day();
    let time = (t.hour() << 11) | (t.minute() << 5) | (t.second() / 2);
    (date << 16) | time
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_value() {
        // 2018-11-17 10:38:30 -> seconds stored as 15 (30 / 2)
        let t = NaiveDate::from_ymd_opt(2018, 11, 17)
            .unwrap()
            .and_hms_opt(10, 38, 30)
            .unwrap();
        let dos = datetime_to_dos(&t);
        assert_eq!(dos_to_datetime(dos).unwrap(), t);
    }

    #[test]
    fn two_second_granularity() {
        let odd = NaiveDate::from_ymd_opt(2001, 2, 3)
            .unwrap()
            .and_hms_opt(4, 5, 7)
            .unwrap();
        let even = NaiveDate::from_ymd_opt(2001, 2, 3)
            .unwrap()
            .and_hms_opt(4, 5, 6)
            .unwrap();
        assert_eq!(datetime_to_dos(&odd), datetime_to_dos(&even));
        assert_eq!(dos_to_datetime(datetime_to_dos(&odd)).unwrap(), even);
    }

    #[test]
    fn clamps_out_of_range_years() {
        let early = NaiveDate::from_ymd_opt(1975, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(dos_to_datetime(datetime_to_dos(&early)).unwrap(), dos_epoch());

        let late = NaiveDate::from_ymd_opt(2200, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let clamped = dos_to_datetime(datetime_to_dos(&late)).unwrap();
        assert_eq!(clamped.year(), 2107);
    }

    #[test]
    fn zeroed_header_is_not_a_date() {
        assert_eq!(dos_to_datetime(0), None);
    }
}
