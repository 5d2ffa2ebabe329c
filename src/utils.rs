use crate::error::{FlashReportError, Result};
use chrono::{Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .ok_or_else(|| FlashReportError::DateError(format!("invalid month {year}-{month}")))
}

pub fn first_day_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| FlashReportError::DateError(format!("invalid month {year}-{month}")))
}

/// Shifts a (year, month) pair by `delta` months.
pub fn add_months(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + delta;
    (index.div_euclid(12), (index.rem_euclid(12) + 1) as u32)
}

/// Rounds half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Sums the present values; missing values contribute nothing.
pub fn sum_present<I>(values: I) -> f64
where
    I: IntoIterator<Item = Option<f64>>,
{
    values.into_iter().flatten().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2024, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            last_day_of_month(2025, 12).unwrap(),
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
        );
        assert!(last_day_of_month(2025, 13).is_err());
    }

    #[test]
    fn test_add_months() {
        assert_eq!(add_months(2025, 11, 2), (2026, 1));
        assert_eq!(add_months(2026, 1, -3), (2025, 10));
        assert_eq!(add_months(2025, 5, 0), (2025, 5));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1005.0), 1005.0);
        assert!((round2(2.345678) - 2.35).abs() < 1e-9);
        assert!((round2(-2.345678) + 2.35).abs() < 1e-9);
    }

    #[test]
    fn test_sum_present() {
        assert_eq!(sum_present([Some(1.5), None, Some(2.0)]), 3.5);
        assert_eq!(sum_present(Vec::<Option<f64>>::new()), 0.0);
    }
}
