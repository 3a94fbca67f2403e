//! Moving averages for sources that only store raw closes

use crate::{DailyBar, MaWindow};

/// Trailing simple moving average including the current value.
///
/// Entry `i` is `None` until `window` values are available, or when any value
/// inside the window is missing.
pub fn simple_moving_average(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let sum = slice.iter().try_fold(0.0, |acc, &v| v.map(|v| acc + v))?;
            Some(sum / window as f64)
        })
        .collect()
}

/// Fill `moving_averages` from closes for every bar that has none.
///
/// `bars` must be in ascending date order and should include enough history
/// before the range of interest to warm up the longest window.
pub fn attach_moving_averages(bars: &mut [DailyBar], windows: &[MaWindow]) {
    let closes: Vec<Option<f64>> = bars
        .iter()
        .map(|b| b.close.filter(|c| c.is_finite()))
        .collect();
    let series: Vec<Vec<Option<f64>>> = windows
        .iter()
        .map(|w| simple_moving_average(&closes, w.get()))
        .collect();

    for (i, bar) in bars.iter_mut().enumerate() {
        if bar.moving_averages.is_empty() {
            bar.moving_averages = series.iter().map(|s| s[i]).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TradeDate;

    #[test]
    fn test_sma_warmup_and_values() {
        let values = [Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        assert_eq!(
            simple_moving_average(&values, 2),
            vec![None, Some(1.5), Some(2.5), Some(3.5)]
        );
        assert_eq!(simple_moving_average(&values, 5), vec![None; 4]);
    }

    #[test]
    fn test_sma_gap_poisons_window() {
        let values = [Some(1.0), None, Some(3.0), Some(5.0)];
        assert_eq!(
            simple_moving_average(&values, 2),
            vec![None, None, None, Some(4.0)]
        );
    }

    #[test]
    fn test_attach_keeps_existing() {
        let mk = |day: u32, close: f64, mas: Vec<Option<f64>>| DailyBar {
            ts_code: "000001.SZ".into(),
            trade_date: TradeDate::from_ymd(2024, 1, day).unwrap(),
            open: Some(close),
            close: Some(close),
            pre_close: None,
            volume: Some(1.0),
            moving_averages: mas,
        };
        let mut bars = vec![
            mk(2, 10.0, vec![]),
            mk(3, 12.0, vec![Some(99.0)]),
            mk(4, 14.0, vec![]),
        ];
        attach_moving_averages(&mut bars, &[MaWindow::new(2).unwrap()]);
        assert_eq!(bars[0].moving_averages, vec![None]);
        assert_eq!(bars[1].moving_averages, vec![Some(99.0)]);
        assert_eq!(bars[2].moving_averages, vec![Some(13.0)]);
    }
}
