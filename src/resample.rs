//! Weekly and monthly bars built from daily sessions

use chrono::Datelike;

use crate::{DailyBar, Frequency};

/// Calendar bucket a session belongs to at `frequency`
fn period_key(bar: &DailyBar, frequency: Frequency) -> (i32, u32) {
    let date = bar.trade_date.date();
    match frequency {
        Frequency::Daily => (date.year(), date.ordinal()),
        Frequency::Weekly => {
            let week = date.iso_week();
            (week.year(), week.week())
        }
        Frequency::Monthly => (date.year(), date.month()),
    }
}

/// Collapse ascending daily bars into one bar per period.
///
/// A period bar is dated on its last session. It opens at the first session's
/// open, closes at the last session's close and trades the summed volume. Its
/// pre-close is the previous period's close; the earliest period keeps its
/// first session's pre-close. Moving averages are cleared so the caller can
/// recompute them on period closes.
pub fn resample(bars: &[DailyBar], frequency: Frequency) -> Vec<DailyBar> {
    if frequency == Frequency::Daily {
        return bars.to_vec();
    }

    let mut periods: Vec<DailyBar> = Vec::new();
    let mut current = None;
    for bar in bars {
        let key = period_key(bar, frequency);
        if current == Some(key) {
            if let Some(period) = periods.last_mut() {
                extend_period(period, bar);
            }
            continue;
        }

        let pre_close = periods.last().map_or(bar.pre_close, |prev| prev.close);
        periods.push(DailyBar {
            ts_code: bar.ts_code.clone(),
            trade_date: bar.trade_date,
            open: bar.open,
            close: bar.close,
            pre_close,
            volume: bar.volume,
            moving_averages: Vec::new(),
        });
        current = Some(key);
    }
    periods
}

fn extend_period(period: &mut DailyBar, bar: &DailyBar) {
    period.trade_date = bar.trade_date;
    period.close = bar.close;
    // Sessions without volume add nothing
    period.volume = match (period.volume, bar.volume) {
        (Some(total), Some(v)) => Some(total + v),
        (total, v) => total.or(v),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TradeDate;

    fn bar(month: u32, day: u32, close: f64, volume: Option<f64>) -> DailyBar {
        DailyBar {
            ts_code: "600036.SH".into(),
            trade_date: TradeDate::from_ymd(2024, month, day).unwrap(),
            open: Some(close - 0.5),
            close: Some(close),
            pre_close: Some(close - 0.2),
            volume,
            moving_averages: vec![Some(1.0)],
        }
    }

    #[test]
    fn test_weekly_buckets() {
        // 2024-01-01 is a Monday
        let days = [
            bar(1, 2, 10.0, Some(100.0)),
            bar(1, 3, 10.5, Some(200.0)),
            bar(1, 5, 11.0, None),
            bar(1, 8, 11.5, Some(300.0)),
            bar(1, 12, 12.0, Some(50.0)),
        ];
        let weeks = resample(&days, Frequency::Weekly);

        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].trade_date.to_string(), "20240105");
        assert_eq!(weeks[0].open, Some(9.5));
        assert_eq!(weeks[0].close, Some(11.0));
        assert_eq!(weeks[0].pre_close, days[0].pre_close);
        assert_eq!(weeks[0].volume, Some(300.0));
        assert!(weeks[0].moving_averages.is_empty());

        assert_eq!(weeks[1].trade_date.to_string(), "20240112");
        assert_eq!(weeks[1].open, Some(11.0));
        assert_eq!(weeks[1].pre_close, Some(11.0));
        assert_eq!(weeks[1].volume, Some(350.0));
    }

    #[test]
    fn test_monthly_buckets() {
        let days = [
            bar(1, 30, 10.0, Some(1.0)),
            bar(1, 31, 10.2, Some(2.0)),
            bar(2, 1, 10.4, Some(4.0)),
        ];
        let months = resample(&days, Frequency::Monthly);

        assert_eq!(months.len(), 2);
        assert_eq!(months[0].trade_date.to_string(), "20240131");
        assert_eq!(months[0].volume, Some(3.0));
        assert_eq!(months[1].pre_close, Some(10.2));
        assert_eq!(months[1].close, Some(10.4));
    }

    #[test]
    fn test_year_boundary_week() {
        // ISO week 1 of 2025 starts on Monday 2024-12-30
        let days = [
            bar(12, 27, 10.0, Some(1.0)),
            bar(12, 30, 10.1, Some(1.0)),
            bar(12, 31, 10.2, Some(1.0)),
        ];
        let weeks = resample(&days, Frequency::Weekly);
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[1].volume, Some(2.0));
    }

    #[test]
    fn test_daily_is_unchanged() {
        let days = [bar(3, 4, 10.0, Some(1.0)), bar(3, 5, 10.1, Some(2.0))];
        assert_eq!(resample(&days, Frequency::Daily), days.to_vec());
    }
}
