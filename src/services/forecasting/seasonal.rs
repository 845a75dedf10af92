//! Seasonal decomposition adapter, the primary model.
//!
//! Multiplicative structure: a least-squares linear trend scaled by yearly
//! Fourier seasonality, a Brazilian-holiday regressor, and optional external
//! monthly regressors. Seasonality is only fitted once the history reaches
//! two full yearly cycles. All estimates are floored at zero since demand
//! cannot be negative.

use std::collections::HashMap;
use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::errors::ServiceError;
use crate::services::metrics;
use crate::stats::{mean, sample_std};
use crate::timeseries::{future_months, months_between, SeriesPoint};

use super::holidays::monthly_coverage;
use super::linalg::least_squares;
use super::regressors::MonthlyRegressor;
use super::{
    forecast_trend, train_test_split, ForecastPoint, ModelAdapter, ModelKind, ModelOutput,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalHyperparameters {
    /// Fourier order of the yearly term.
    pub fourier_order: usize,
    /// Minimum history length before the seasonal term is fitted.
    pub seasonality_threshold: usize,
    /// z multiplier for the prediction interval.
    pub interval_z: f64,
}

impl Default for SeasonalHyperparameters {
    fn default() -> Self {
        Self {
            fourier_order: 3,
            seasonality_threshold: 24,
            interval_z: 1.96,
        }
    }
}

#[derive(Debug, Default)]
pub struct SeasonalAdapter {
    hyper: SeasonalHyperparameters,
}

impl SeasonalAdapter {
    pub fn new(hyper: SeasonalHyperparameters) -> Self {
        Self { hyper }
    }
}

/// Fitted state: trend line, seasonal coefficients, holiday and regressor
/// effects, and the in-sample residual spread.
struct FittedSeasonal {
    origin: NaiveDate,
    slope: f64,
    intercept: f64,
    trend_floor: f64,
    seasonal_coeffs: Vec<f64>,
    fourier_order: usize,
    holiday_coef: f64,
    holiday_mean: f64,
    regressor_effects: Vec<RegressorEffect>,
    sigma: f64,
}

struct RegressorEffect {
    name: String,
    coef: f64,
    mean: f64,
    std: f64,
}

fn fourier_row(month: u32, order: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 * order);
    for k in 1..=order as u32 {
        let angle = 2.0 * PI * k as f64 * month as f64 / 12.0;
        row.push(angle.sin());
        row.push(angle.cos());
    }
    row
}

fn coverage_of(coverage: &HashMap<(i32, u32), f64>, date: NaiveDate) -> f64 {
    coverage
        .get(&(date.year(), date.month()))
        .copied()
        .unwrap_or(0.0)
}

fn fit(
    series: &[SeriesPoint],
    regressors: &[MonthlyRegressor],
    coverage: &HashMap<(i32, u32), f64>,
    hyper: &SeasonalHyperparameters,
) -> Result<FittedSeasonal, ServiceError> {
    if series.len() < 2 {
        return Err(ServiceError::insufficient_data(format!(
            "seasonal model needs at least 2 observations, got {}",
            series.len()
        )));
    }
    let y: Vec<f64> = series.iter().map(|p| p.quantity).collect();
    let y_mean = mean(&y);
    if y_mean == 0.0 {
        return Err(ServiceError::insufficient_data(
            "series is all zero; nothing to fit",
        ));
    }

    let origin = series[0].period;
    let t: Vec<f64> = series
        .iter()
        .map(|p| months_between(origin, p.period) as f64)
        .collect();

    // Linear trend over month offsets (gaps keep their true spacing).
    let trend_rows: Vec<Vec<f64>> = t.iter().map(|&ti| vec![1.0, ti]).collect();
    let beta = least_squares(&trend_rows, &y)
        .ok_or_else(|| ServiceError::InternalError("trend fit failed".into()))?;
    let (intercept, slope) = (beta[0], beta[1]);
    // Ratios blow up where the trend line dips toward zero; floor it at a
    // fraction of the series level.
    let trend_floor = (0.01 * y_mean).max(1e-6);

    let trend_at = |ti: f64| (intercept + slope * ti).max(trend_floor);
    let mut residual: Vec<f64> = y
        .iter()
        .zip(&t)
        .map(|(yi, &ti)| yi / trend_at(ti) - 1.0)
        .collect();

    // Yearly seasonality, only with two full cycles of history.
    let mut seasonal_coeffs = Vec::new();
    if series.len() >= hyper.seasonality_threshold {
        let rows: Vec<Vec<f64>> = series
            .iter()
            .map(|p| fourier_row(p.period.month(), hyper.fourier_order))
            .collect();
        if let Some(coeffs) = least_squares(&rows, &residual) {
            for (res, row) in residual.iter_mut().zip(&rows) {
                let fitted: f64 = row.iter().zip(&coeffs).map(|(x, c)| x * c).sum();
                *res -= fitted;
            }
            seasonal_coeffs = coeffs;
        }
    }

    // Holiday effect on the centered monthly coverage.
    let h: Vec<f64> = series
        .iter()
        .map(|p| coverage_of(coverage, p.period))
        .collect();
    let holiday_mean = mean(&h);
    let h_centered: Vec<f64> = h.iter().map(|v| v - holiday_mean).collect();
    let h_ss: f64 = h_centered.iter().map(|v| v * v).sum();
    let holiday_coef = if h_ss > 0.0 {
        let cross: f64 = residual.iter().zip(&h_centered).map(|(r, h)| r * h).sum();
        cross / h_ss
    } else {
        0.0
    };
    for (res, hc) in residual.iter_mut().zip(&h_centered) {
        *res -= holiday_coef * hc;
    }

    // External regressors, standardized over the sample months; columns with
    // no variance are skipped.
    let mut regressor_effects = Vec::new();
    if !regressors.is_empty() {
        let mut usable: Vec<(&MonthlyRegressor, f64, f64, Vec<f64>)> = Vec::new();
        for regressor in regressors {
            if regressor.is_empty() {
                continue;
            }
            let fallback = regressor.mean();
            let values: Vec<f64> = series
                .iter()
                .map(|p| regressor.value_on(p.period).unwrap_or(fallback))
                .collect();
            let v_mean = mean(&values);
            let v_std = sample_std(&values);
            if v_std > 0.0 {
                usable.push((regressor, v_mean, v_std, values));
            }
        }
        if !usable.is_empty() {
            let rows: Vec<Vec<f64>> = (0..series.len())
                .map(|i| {
                    usable
                        .iter()
                        .map(|(_, v_mean, v_std, values)| (values[i] - v_mean) / v_std)
                        .collect()
                })
                .collect();
            if let Some(coeffs) = least_squares(&rows, &residual) {
                for (i, res) in residual.iter_mut().enumerate() {
                    let fitted: f64 = rows[i].iter().zip(&coeffs).map(|(x, c)| x * c).sum();
                    *res -= fitted;
                }
                for ((regressor, v_mean, v_std, _), coef) in usable.iter().zip(coeffs) {
                    regressor_effects.push(RegressorEffect {
                        name: regressor.name.clone(),
                        coef,
                        mean: *v_mean,
                        std: *v_std,
                    });
                }
            }
        }
    }

    // Residuals are in ratio space; sigma in quantity space comes from the
    // reconstructed fitted values.
    let fitted_model = FittedSeasonal {
        origin,
        slope,
        intercept,
        trend_floor,
        seasonal_coeffs,
        fourier_order: hyper.fourier_order,
        holiday_coef,
        holiday_mean,
        regressor_effects,
        sigma: 0.0,
    };
    let errors: Vec<f64> = series
        .iter()
        .map(|p| p.quantity - predict_raw(&fitted_model, p.period, regressors, coverage))
        .collect();
    let sigma = sample_std(&errors);
    debug!(
        slope,
        intercept,
        sigma,
        seasonal = !fitted_model.seasonal_coeffs.is_empty(),
        "seasonal model fitted"
    );
    Ok(FittedSeasonal {
        sigma,
        ..fitted_model
    })
}

fn predict_raw(
    model: &FittedSeasonal,
    date: NaiveDate,
    regressors: &[MonthlyRegressor],
    coverage: &HashMap<(i32, u32), f64>,
) -> f64 {
    let ti = months_between(model.origin, date) as f64;
    let trend = (model.intercept + model.slope * ti).max(model.trend_floor);

    let mut factor = 1.0;
    if !model.seasonal_coeffs.is_empty() {
        let row = fourier_row(date.month(), model.fourier_order);
        factor += row
            .iter()
            .zip(&model.seasonal_coeffs)
            .map(|(x, c)| x * c)
            .sum::<f64>();
    }
    factor += model.holiday_coef * (coverage_of(coverage, date) - model.holiday_mean);
    for effect in &model.regressor_effects {
        let value = regressors
            .iter()
            .find(|r| r.name == effect.name)
            .and_then(|r| r.value_on(date))
            .unwrap_or(effect.mean);
        factor += effect.coef * (value - effect.mean) / effect.std;
    }
    trend * factor
}

fn predict_points(
    model: &FittedSeasonal,
    periods: &[NaiveDate],
    regressors: &[MonthlyRegressor],
    coverage: &HashMap<(i32, u32), f64>,
    interval_z: f64,
) -> Vec<ForecastPoint> {
    periods
        .iter()
        .enumerate()
        .map(|(i, &period)| {
            let raw = predict_raw(model, period, regressors, coverage);
            let spread = interval_z * model.sigma;
            ForecastPoint {
                period,
                point_estimate: raw.max(0.0),
                lower_bound: Some((raw - spread).max(0.0)),
                upper_bound: Some((raw + spread).max(0.0)),
                horizon_index: i + 1,
            }
        })
        .collect()
}

impl ModelAdapter for SeasonalAdapter {
    fn kind(&self) -> ModelKind {
        ModelKind::Seasonal
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

        let last = series
            .last()
            .ok_or_else(|| ServiceError::insufficient_data("empty series"))?
            .period;
        let coverage = monthly_coverage(
            series[0].period.year(),
            last.year() + horizon as i32 / 12 + 1,
        );

        // Held-out accuracy from the 80/20 chronological split; the fitted
        // evaluation model is discarded afterwards.
        let holdout = match train_test_split(&series) {
            Some((train, test)) if train.len() >= 2 => {
                match fit(train, regressors, &coverage, &self.hyper) {
                    Ok(eval_model) => {
                        let actual: Vec<f64> = test.iter().map(|p| p.quantity).collect();
                        let predicted: Vec<f64> = test
                            .iter()
                            .map(|p| {
                                predict_raw(&eval_model, p.period, regressors, &coverage).max(0.0)
                            })
                            .collect();
                        Some(metrics::evaluate(&actual, &predicted))
                    }
                    Err(_) => None,
                }
            }
            _ => None,
        };

        let model = fit(&series, regressors, &coverage, &self.hyper)?;
        let periods = future_months(last, horizon);
        let points = predict_points(
            &model,
            &periods,
            regressors,
            &coverage,
            self.hyper.interval_z,
        );
        let trend = Some(forecast_trend(&points));

        Ok(ModelOutput {
            points,
            holdout,
            hyperparameters: json!({
                "seasonality_mode": "multiplicative",
                "yearly_seasonality": series.len() >= self.hyper.seasonality_threshold,
                "fourier_order": self.hyper.fourier_order,
                "interval_z": self.hyper.interval_z,
            }),
            trend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::add_months;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn series_from(values: &[f64]) -> Vec<SeriesPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| SeriesPoint {
                period: add_months(d(2022, 1), i as i32),
                quantity: *v,
            })
            .collect()
    }

    fn seasonal_values(cycles: usize) -> Vec<f64> {
        let pattern = [
            80.0, 85.0, 95.0, 110.0, 130.0, 150.0, 150.0, 130.0, 110.0, 95.0, 85.0, 80.0,
        ];
        (0..cycles).flat_map(|_| pattern).collect()
    }

    #[test]
    fn flat_series_forecasts_flat() {
        let adapter = SeasonalAdapter::default();
        let output = adapter
            .fit_predict(&series_from(&vec![100.0; 36]), 12, &[])
            .unwrap();
        assert_eq!(output.points.len(), 12);
        for point in &output.points {
            assert!((point.point_estimate - 100.0).abs() < 1.0);
        }
        let holdout = output.holdout.unwrap();
        assert!(holdout.wmape.unwrap() < 1.0);
    }

    #[test]
    fn forecast_is_never_negative() {
        // Steep decline crossing zero inside the horizon.
        let values: Vec<f64> = (0..24).map(|i| (120.0 - 10.0 * i as f64).max(0.0)).collect();
        let adapter = SeasonalAdapter::default();
        let output = adapter.fit_predict(&series_from(&values), 12, &[]).unwrap();
        for point in &output.points {
            assert!(point.point_estimate >= 0.0);
            assert!(point.lower_bound.unwrap() >= 0.0);
            assert!(point.upper_bound.unwrap() >= point.lower_bound.unwrap());
        }
    }

    #[test]
    fn seasonal_pattern_is_reproduced() {
        let adapter = SeasonalAdapter::default();
        let output = adapter
            .fit_predict(&series_from(&seasonal_values(3)), 12, &[])
            .unwrap();
        let forecast: Vec<f64> = output.points.iter().map(|p| p.point_estimate).collect();
        // June/July peak must come out well above the January trough.
        assert!(forecast[5] > forecast[0] * 1.2);
        assert!(forecast[6] > forecast[11] * 1.2);
    }

    #[test]
    fn short_history_skips_the_seasonal_term() {
        let adapter = SeasonalAdapter::default();
        let output = adapter
            .fit_predict(&series_from(&seasonal_values(1)), 6, &[])
            .unwrap();
        assert_eq!(
            output.hyperparameters["yearly_seasonality"],
            serde_json::Value::Bool(false)
        );
    }

    #[test]
    fn degenerate_series_report_insufficient_data() {
        let adapter = SeasonalAdapter::default();
        assert!(matches!(
            adapter.fit_predict(&series_from(&[5.0]), 12, &[]),
            Err(ServiceError::InsufficientData(_))
        ));
        assert!(matches!(
            adapter.fit_predict(&series_from(&[0.0, 0.0, 0.0]), 12, &[]),
            Err(ServiceError::InsufficientData(_))
        ));
    }

    #[test]
    fn horizon_zero_is_invalid() {
        let adapter = SeasonalAdapter::default();
        assert!(matches!(
            adapter.fit_predict(&series_from(&[1.0, 2.0]), 0, &[]),
            Err(ServiceError::InvalidRequest(_))
        ));
    }

    #[test]
    fn trend_summary_follows_the_forecast() {
        let values: Vec<f64> = (0..24).map(|i| 100.0 + 5.0 * i as f64).collect();
        let adapter = SeasonalAdapter::default();
        let output = adapter.fit_predict(&series_from(&values), 6, &[]).unwrap();
        assert_eq!(output.trend.unwrap().direction, "increasing");
    }
}
