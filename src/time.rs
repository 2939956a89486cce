//! KST calendar helpers. Every ledger date is a calendar day in
//! Asia/Seoul, matching the authoritative store's day boundaries.

use chrono::{Datelike, Duration, FixedOffset, NaiveDate, Utc};

const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Today's calendar date in KST.
pub fn kst_today() -> NaiveDate {
    let kst = FixedOffset::east_opt(KST_OFFSET_SECS).expect("KST offset is in range");
    Utc::now().with_timezone(&kst).date_naive()
}

/// The calendar day before `date`.
pub fn previous_day(date: NaiveDate) -> NaiveDate {
    date - Duration::days(1)
}

/// Number of days in the given month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).expect("valid month")
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).expect("valid month")
    };
    (next - first).num_days() as u32
}

/// Whether two dates fall in the same calendar month.
pub fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_day_crosses_month_boundary() {
        let first = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(
            previous_day(first),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
    }

    #[test]
    fn days_in_month_handles_leap_years() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2025, 12), 31);
    }

    #[test]
    fn same_month_compares_year_too() {
        let a = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let b = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        assert!(!same_month(a, b));
    }
}
