use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::errors::ServiceError;
use crate::services::forecasting::ModelAdapter;
use crate::services::metrics;
use crate::timeseries::SeriesPoint;

/// Rolling-origin window sizes, in months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvParams {
    pub initial_window: usize,
    pub horizon: usize,
    pub step: usize,
}

impl Default for CvParams {
    fn default() -> Self {
        Self {
            initial_window: 24,
            horizon: 12,
            step: 3,
        }
    }
}

/// Smaller preset tried once when the series cannot fill the requested
/// window.
pub const FALLBACK_PARAMS: CvParams = CvParams {
    initial_window: 12,
    horizon: 6,
    step: 3,
};

/// Fewest finite observations any validation run can work with.
const MIN_POINTS: usize = 2;

/// One held-out prediction from a CV fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvPrediction {
    pub fold: usize,
    pub period: NaiveDate,
    pub actual: f64,
    pub predicted: f64,
}

/// Accuracy of a single fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub fold: usize,
    pub cutoff: NaiveDate,
    pub train_len: usize,
    pub test_len: usize,
    pub wmape: Option<f64>,
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
}

/// Result of a rolling-origin run: per-fold metrics, the pooled held-out
/// predictions, and fold-mean aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvOutcome {
    pub params: CvParams,
    pub shrunk: bool,
    pub folds: Vec<FoldMetrics>,
    pub predictions: Vec<CvPrediction>,
    pub mean_wmape: Option<f64>,
    pub mean_mae: f64,
    pub mean_rmse: f64,
    pub mean_mape: f64,
}

/// Walk-forward cross-validation: for each fold the adapter is fitted on a
/// strictly-past window and scored on the following months. Window sizes
/// shrink once (to [`FALLBACK_PARAMS`]) when the series is too short; a fold
/// whose fit fails is logged and skipped without aborting the rest.
#[instrument(skip(series, adapter), fields(points = series.len()))]
pub fn rolling_origin(
    series: &[SeriesPoint],
    params: CvParams,
    adapter: &dyn ModelAdapter,
) -> Result<CvOutcome, ServiceError> {
    let mut series: Vec<SeriesPoint> = series
        .iter()
        .filter(|p| p.quantity.is_finite())
        .cloned()
        .collect();
    series.sort_by_key(|p| p.period);

    if series.len() < MIN_POINTS {
        return Err(ServiceError::insufficient_data(format!(
            "validation needs at least {MIN_POINTS} observations, got {}",
            series.len()
        )));
    }

    let (params, shrunk) = if series.len() > params.initial_window {
        (params, false)
    } else if series.len() > FALLBACK_PARAMS.initial_window {
        info!(
            points = series.len(),
            requested = params.initial_window,
            "series too short for the requested window; using the fallback preset"
        );
        (FALLBACK_PARAMS, true)
    } else {
        return Err(ServiceError::insufficient_data(format!(
            "history of {} points cannot fill a {}-month training window even after shrinking",
            series.len(),
            FALLBACK_PARAMS.initial_window
        )));
    };

    let mut folds = Vec::new();
    let mut predictions = Vec::new();
    let mut fold_number = 0usize;
    let mut origin = params.initial_window;
    while origin < series.len() {
        fold_number += 1;
        let test_end = (origin + params.horizon).min(series.len());
        let train = &series[..origin];
        let test = &series[origin..test_end];

        match adapter.fit_predict(train, test.len(), &[]) {
            Ok(output) => {
                let actual: Vec<f64> = test.iter().map(|p| p.quantity).collect();
                // Fold predictions are aligned by horizon position; the
                // adapter forecasts the months right after the cutoff.
                let predicted: Vec<f64> = output
                    .points
                    .iter()
                    .take(test.len())
                    .map(|p| p.point_estimate)
                    .collect();
                if predicted.len() != actual.len() {
                    warn!(fold = fold_number, "fold produced a short forecast; skipped");
                } else {
                    for (point, prediction) in test.iter().zip(&predicted) {
                        predictions.push(CvPrediction {
                            fold: fold_number,
                            period: point.period,
                            actual: point.quantity,
                            predicted: *prediction,
                        });
                    }
                    folds.push(FoldMetrics {
                        fold: fold_number,
                        cutoff: train.last().expect("train is non-empty").period,
                        train_len: train.len(),
                        test_len: test.len(),
                        wmape: metrics::wmape(&actual, &predicted),
                        mae: metrics::mae(&actual, &predicted),
                        rmse: metrics::rmse(&actual, &predicted),
                        mape: metrics::mape(&actual, &predicted),
                    });
                }
            }
            Err(err) => {
                // One bad fold must not sink the run.
                warn!(fold = fold_number, error = %err, "fold fit failed; skipped");
            }
        }
        origin += params.step;
    }

    if folds.is_empty() {
        return Err(ServiceError::insufficient_data(
            "no cross-validation fold could be evaluated",
        ));
    }

    let wmapes: Vec<f64> = folds.iter().filter_map(|f| f.wmape).collect();
    let mean_wmape = if wmapes.is_empty() {
        None
    } else {
        Some(wmapes.iter().sum::<f64>() / wmapes.len() as f64)
    };
    let fold_count = folds.len() as f64;
    Ok(CvOutcome {
        params,
        shrunk,
        mean_wmape,
        mean_mae: folds.iter().map(|f| f.mae).sum::<f64>() / fold_count,
        mean_rmse: folds.iter().map(|f| f.rmse).sum::<f64>() / fold_count,
        mean_mape: folds.iter().map(|f| f.mape).sum::<f64>() / fold_count,
        folds,
        predictions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::forecasting::seasonal::SeasonalAdapter;
    use crate::timeseries::add_months;

    fn series_from(values: &[f64]) -> Vec<SeriesPoint> {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| SeriesPoint {
                period: add_months(start, i as i32),
                quantity: *v,
            })
            .collect()
    }

    #[test]
    fn flat_series_validates_with_near_zero_wmape() {
        let adapter = SeasonalAdapter::default();
        let outcome = rolling_origin(
            &series_from(&vec![100.0; 36]),
            CvParams::default(),
            &adapter,
        )
        .unwrap();
        assert!(!outcome.shrunk);
        assert_eq!(outcome.folds.len(), 4);
        assert!(outcome.mean_wmape.unwrap() < 0.5);
        // Folds never look ahead of their cutoff.
        for prediction in &outcome.predictions {
            let fold = &outcome.folds[prediction.fold - 1];
            assert!(prediction.period > fold.cutoff);
        }
    }

    #[test]
    fn short_series_shrinks_the_window_once() {
        let adapter = SeasonalAdapter::default();
        let outcome = rolling_origin(
            &series_from(&vec![50.0; 18]),
            CvParams::default(),
            &adapter,
        )
        .unwrap();
        assert!(outcome.shrunk);
        assert_eq!(outcome.params, FALLBACK_PARAMS);
        assert!(!outcome.folds.is_empty());
    }

    #[test]
    fn too_short_series_fails_with_insufficient_data() {
        let adapter = SeasonalAdapter::default();
        let err = rolling_origin(
            &series_from(&vec![10.0; 8]),
            CvParams::default(),
            &adapter,
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientData(_)));

        let err = rolling_origin(&series_from(&[10.0]), CvParams::default(), &adapter).unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientData(_)));
    }

    #[test]
    fn fold_metrics_average_by_simple_mean() {
        let adapter = SeasonalAdapter::default();
        let outcome = rolling_origin(
            &series_from(&vec![100.0; 36]),
            CvParams::default(),
            &adapter,
        )
        .unwrap();
        let expected: f64 =
            outcome.folds.iter().map(|f| f.mae).sum::<f64>() / outcome.folds.len() as f64;
        assert!((outcome.mean_mae - expected).abs() < 1e-12);
    }

    #[test]
    fn trailing_partial_fold_is_capped_to_the_series_end() {
        let adapter = SeasonalAdapter::default();
        let outcome = rolling_origin(
            &series_from(&vec![100.0; 30]),
            CvParams::default(),
            &adapter,
        )
        .unwrap();
        // Origins at 24 and 27; the second fold only has 3 months left.
        assert_eq!(outcome.folds.len(), 2);
        assert_eq!(outcome.folds[1].test_len, 3);
    }
}
