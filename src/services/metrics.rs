use serde::{Deserialize, Serialize};

use crate::stats::mean;

/// Guard against division blow-ups in MAPE when an actual is exactly zero.
const MAPE_EPSILON: f64 = 1e-10;

/// Forecast accuracy over one evaluation window.
///
/// `wmape` and `bias_pct` are `None` when their denominators vanish (an
/// all-zero actual series) rather than infinities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub wmape: Option<f64>,
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
    pub bias: f64,
    pub bias_pct: Option<f64>,
    pub fva: f64,
}

/// Weighted MAPE in percent, computed over the rows where the actual is
/// non-zero. Returns `None` when the filtered set is empty or its total is 0.
pub fn wmape(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    let mut abs_error = 0.0;
    let mut abs_actual = 0.0;
    for (a, p) in actual.iter().zip(predicted) {
        if *a != 0.0 {
            abs_error += (a - p).abs();
            abs_actual += a.abs();
        }
    }
    if abs_actual == 0.0 {
        return None;
    }
    Some(abs_error / abs_actual * 100.0)
}

pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    (actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64)
        .sqrt()
}

pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| ((a - p) / (a + MAPE_EPSILON)).abs())
        .sum::<f64>()
        / actual.len() as f64
        * 100.0
}

/// Naive lag-1 forecast: each point predicts the previous actual, with the
/// first point back-filled from itself.
fn naive_lag1(actual: &[f64]) -> Vec<f64> {
    let mut naive = Vec::with_capacity(actual.len());
    for (i, value) in actual.iter().enumerate() {
        if i == 0 {
            naive.push(*value);
        } else {
            naive.push(actual[i - 1]);
        }
    }
    naive
}

/// Forecast value added: relative MAE improvement over the naive lag-1
/// forecast, in percent. Defined as 0 when the naive MAE is 0.
pub fn fva(actual: &[f64], predicted: &[f64]) -> f64 {
    let naive = naive_lag1(actual);
    let mae_naive = mae(actual, &naive);
    if mae_naive == 0.0 {
        return 0.0;
    }
    let mae_model = mae(actual, predicted);
    (mae_naive - mae_model) / mae_naive * 100.0
}

/// Computes the full metric set over one evaluation window.
pub fn evaluate(actual: &[f64], predicted: &[f64]) -> AccuracyMetrics {
    let bias = if actual.is_empty() {
        0.0
    } else {
        mean(
            &actual
                .iter()
                .zip(predicted)
                .map(|(a, p)| p - a)
                .collect::<Vec<f64>>(),
        )
    };
    let total_actual: f64 = actual.iter().sum();
    let bias_pct = if total_actual != 0.0 {
        let total_error: f64 = actual.iter().zip(predicted).map(|(a, p)| p - a).sum();
        Some(total_error / total_actual * 100.0)
    } else {
        None
    };
    AccuracyMetrics {
        wmape: wmape(actual, predicted),
        mae: mae(actual, predicted),
        rmse: rmse(actual, predicted),
        mape: mape(actual, predicted),
        bias,
        bias_pct,
        fva: fva(actual, predicted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_forecast_scores_zero_wmape_at_any_scale() {
        for offset in [0.0, 10.0, 1000.0] {
            let actual: Vec<f64> = (1..=12).map(|i| offset + i as f64).collect();
            let predicted = actual.clone();
            assert_eq!(wmape(&actual, &predicted), Some(0.0));
        }
    }

    #[test]
    fn wmape_ignores_zero_actual_rows() {
        let actual = vec![0.0, 100.0, 100.0];
        let predicted = vec![500.0, 90.0, 110.0];
        // The wild miss on the zero row must not count.
        let value = wmape(&actual, &predicted).unwrap();
        assert!((value - 10.0).abs() < 1e-9);
    }

    #[test]
    fn wmape_of_all_zero_actuals_is_undefined() {
        assert_eq!(wmape(&[0.0, 0.0], &[1.0, 2.0]), None);
        assert_eq!(wmape(&[], &[]), None);
    }

    #[test]
    fn mae_rmse_mape_on_known_values() {
        let actual = vec![100.0, 200.0];
        let predicted = vec![110.0, 190.0];
        assert!((mae(&actual, &predicted) - 10.0).abs() < 1e-9);
        assert!((rmse(&actual, &predicted) - 10.0).abs() < 1e-9);
        assert!((mape(&actual, &predicted) - 7.5).abs() < 1e-6);
    }

    #[test]
    fn bias_is_signed() {
        let metrics = evaluate(&[100.0, 100.0], &[110.0, 120.0]);
        assert!((metrics.bias - 15.0).abs() < 1e-9);
        assert!((metrics.bias_pct.unwrap() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn fva_beats_naive_on_a_trending_series() {
        let actual: Vec<f64> = (0..12).map(|i| 100.0 + 10.0 * i as f64).collect();
        let predicted = actual.clone();
        // Naive lag-1 misses the trend by 10 each step; a perfect model gets
        // the full improvement.
        assert!((fva(&actual, &predicted) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn fva_is_zero_when_naive_is_perfect() {
        let actual = vec![50.0; 10];
        let predicted = vec![60.0; 10];
        assert_eq!(fva(&actual, &predicted), 0.0);
    }
}
