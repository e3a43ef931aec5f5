use chrono::NaiveDate;

/// Returns every day in the inclusive date range [start, end].
/// DEX pools trade continuously, so no day is ever excluded.
pub fn days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        dates.push(current);
        match current.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn days_includes_weekends() {
        // Fri Jan 17 through Mon Jan 20, 2025
        let result = days(date(2025, 1, 17), date(2025, 1, 20));
        assert_eq!(
            result,
            vec![
                date(2025, 1, 17),
                date(2025, 1, 18),
                date(2025, 1, 19),
                date(2025, 1, 20),
            ]
        );
    }

    #[test]
    fn days_single_day() {
        let result = days(date(2025, 1, 15), date(2025, 1, 15));
        assert_eq!(result, vec![date(2025, 1, 15)]);
    }

    #[test]
    fn days_start_after_end() {
        let result = days(date(2025, 1, 20), date(2025, 1, 15));
        assert!(result.is_empty());
    }

    #[test]
    fn days_crosses_month_boundary() {
        let result = days(date(2025, 1, 30), date(2025, 2, 2));
        assert_eq!(result.len(), 4);
        assert_eq!(result[2], date(2025, 2, 1));
    }
}
