//! Gradient-boosted adapter, the secondary model.
//!
//! Works on an engineered feature frame: lag values, rolling statistics over
//! the 1-shifted series (so a row never sees its own target), growth rates,
//! calendar encodings, a holiday flag, a trailing trend slope, and external
//! regressors. Multi-step forecasts are recursive; each future month's
//! features are computed from the actual-then-predicted sequence.

use chrono::{Datelike, NaiveDate};
use serde_json::json;
use tracing::instrument;

use crate::errors::ServiceError;
use crate::services::metrics;
use crate::stats::{mean, sample_std, slope_intercept};
use crate::timeseries::{future_months, quarter_of, SeriesPoint};

use super::gbt::{GbtParams, GradientBoostedTrees};
use super::holidays::month_has_national_holiday;
use super::regressors::MonthlyRegressor;
use super::{forecast_trend, ForecastPoint, ModelAdapter, ModelKind, ModelOutput};

const LAGS: [usize; 4] = [1, 3, 6, 12];
const WINDOWS: [usize; 3] = [3, 6, 12];
const GROWTH_STEPS: [usize; 3] = [1, 3, 6];
const TREND_WINDOW: usize = 6;

#[derive(Debug, Default)]
pub struct BoostedAdapter {
    params: GbtParams,
}

impl BoostedAdapter {
    pub fn new(params: GbtParams) -> Self {
        Self { params }
    }
}

/// Builds one feature row from the values strictly before the target month
/// plus the target month's calendar and regressors. The same builder feeds
/// training rows and the recursive future loop, so the two can never drift.
fn feature_row(
    history: &[f64],
    date: NaiveDate,
    regressors: &[MonthlyRegressor],
    fallbacks: &[f64],
) -> Vec<f64> {
    let n = history.len();
    let mut row = Vec::with_capacity(24 + regressors.len());

    for lag in LAGS {
        row.push(if n >= lag { history[n - lag] } else { 0.0 });
    }
    for window in WINDOWS {
        let tail = &history[n.saturating_sub(window)..];
        row.push(if tail.is_empty() { 0.0 } else { mean(tail) });
        row.push(if tail.len() >= 2 { sample_std(tail) } else { 0.0 });
    }
    for step in GROWTH_STEPS {
        let value = if n >= step + 1 && history[n - 1 - step] != 0.0 {
            (history[n - 1] - history[n - 1 - step]) / history[n - 1 - step]
        } else {
            0.0
        };
        row.push(if value.is_finite() { value } else { 0.0 });
    }

    let month = date.month();
    let quarter = quarter_of(month);
    row.push(date.year() as f64);
    row.push(month as f64);
    row.push(quarter as f64);
    row.push(date.ordinal() as f64);
    row.push(date.iso_week().week() as f64);
    let month_angle = 2.0 * std::f64::consts::PI * month as f64 / 12.0;
    let quarter_angle = 2.0 * std::f64::consts::PI * quarter as f64 / 4.0;
    row.push(month_angle.sin());
    row.push(month_angle.cos());
    row.push(quarter_angle.sin());
    row.push(quarter_angle.cos());
    row.push(if month_has_national_holiday(date) { 1.0 } else { 0.0 });

    let trend_tail = &history[n.saturating_sub(TREND_WINDOW)..];
    row.push(if trend_tail.len() >= 3 {
        slope_intercept(trend_tail).0
    } else {
        0.0
    });

    for (regressor, fallback) in regressors.iter().zip(fallbacks) {
        row.push(regressor.value_on(date).unwrap_or(*fallback));
    }
    row
}

impl ModelAdapter for BoostedAdapter {
    fn kind(&self) -> ModelKind {
        ModelKind::Boosted
    }

    #[instrument(skip(self, series, regressors), fields(points = series.len(), horizon))]
    fn fit_predict(
        &self,
        series: &[SeriesPoint],
        horizon: usize,
        regressors: &[MonthlyRegressor],
    ) -> Result<ModelOutput, ServiceError> {
        if horizon == 0 {
            return Err(ServiceError::invalid("forecast horizon must be at least 1"));
        }
        let mut series: Vec<SeriesPoint> = series.to_vec();
        series.sort_by_key(|p| p.period);
        if series.len() < 2 {
            return Err(ServiceError::insufficient_data(format!(
                "boosted model needs at least 2 observations, got {}",
                series.len()
            )));
        }
        let values: Vec<f64> = series.iter().map(|p| p.quantity).collect();
        if mean(&values) == 0.0 {
            return Err(ServiceError::insufficient_data(
                "series is all zero; nothing to fit",
            ));
        }

        let fallbacks: Vec<f64> = regressors.iter().map(|r| r.mean()).collect();
        let rows: Vec<Vec<f64>> = series
            .iter()
            .enumerate()
            .map(|(i, point)| feature_row(&values[..i], point.period, regressors, &fallbacks))
            .collect();

        // Held-out accuracy on the chronological 80/20 split. The evaluation
        // model is fitted on the early window only and then discarded.
        let split = (series.len() as f64 * 0.8).floor() as usize;
        let holdout = if split >= 2 && split < series.len() {
            let (train_rows, test_rows) = rows.split_at(split);
            let (train_y, test_y) = values.split_at(split);
            let eval_model = GradientBoostedTrees::fit(
                self.params.clone(),
                train_rows,
                train_y,
                Some((test_rows, test_y)),
            );
            let predicted: Vec<f64> = test_rows
                .iter()
                .map(|row| eval_model.predict(row).max(0.0))
                .collect();
            Some(metrics::evaluate(test_y, &predicted))
        } else {
            None
        };

        // Production model: a separate refit on the full history.
        let model = GradientBoostedTrees::fit(self.params.clone(), &rows, &values, None);

        let last = series.last().expect("series checked non-empty").period;
        let mut extended = values.clone();
        let mut points = Vec::with_capacity(horizon);
        for (i, period) in future_months(last, horizon).into_iter().enumerate() {
            let row = feature_row(&extended, period, regressors, &fallbacks);
            let predicted = model.predict(&row).max(0.0);
            points.push(ForecastPoint {
                period,
                point_estimate: predicted,
                lower_bound: None,
                upper_bound: None,
                horizon_index: i + 1,
            });
            // Autoregressive feedback: later horizons build their lag and
            // rolling features on top of this prediction.
            extended.push(predicted);
        }

        let trend = Some(forecast_trend(&points));
        Ok(ModelOutput {
            points,
            holdout,
            hyperparameters: json!({
                "n_estimators": self.params.n_estimators,
                "learning_rate": self.params.learning_rate,
                "max_depth": self.params.max_depth,
                "early_stopping_rounds": self.params.early_stopping_rounds,
                "fitted_trees": model.n_trees(),
            }),
            trend,
        })
    }
}
