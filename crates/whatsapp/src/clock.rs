//! Server clock rendered in Western Indonesian Time.

use {
    chrono::{DateTime, Datelike, TimeZone, Utc},
    chrono_tz::Asia::Jakarta,
};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "Mei", "Jun", "Jul", "Agu", "Sep", "Okt", "Nov", "Des",
];

/// Current time in WIB, e.g. `17 Okt 2026, 14.05.09`.
pub fn now_wib() -> String {
    format_wib(Utc::now())
}

pub fn format_wib<Tz: TimeZone>(at: DateTime<Tz>) -> String {
    let local = at.with_timezone(&Jakarta);
    let month = MONTHS[local.month0() as usize];
    format!(
        "{} {month} {}, {}",
        local.day(),
        local.year(),
        local.format("%H.%M.%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_jakarta() {
        let at = Utc.with_ymd_and_hms(2026, 10, 17, 7, 5, 9).unwrap();
        assert_eq!(format_wib(at), "17 Okt 2026, 14.05.09");
    }

    #[test]
    fn crosses_midnight() {
        let at = Utc.with_ymd_and_hms(2025, 12, 31, 20, 0, 0).unwrap();
        assert_eq!(format_wib(at), "1 Jan 2026, 03.00.00");
    }
}
