use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::errors::ServiceError;
use crate::stats::{mean, median, quantile, sample_std};
use crate::timeseries::{month_floor, Observation};

/// One raw dataset row as delivered by the query collaborator, before any
/// cleaning. Quantities arrive as text and may be non-numeric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObservation {
    pub family_code: String,
    pub product_code: String,
    pub process_code: String,
    pub period: String,
    pub quantity: String,
}

/// Outlier treatment strategy applied during preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutlierMethod {
    Iqr,
    Mad,
    Percentile,
    Zscore,
    Winsorize,
    None,
}

impl OutlierMethod {
    pub fn parse(value: &str) -> Result<Self, ServiceError> {
        match value.trim().to_lowercase().as_str() {
            "iqr" => Ok(OutlierMethod::Iqr),
            "mad" => Ok(OutlierMethod::Mad),
            "percentile" => Ok(OutlierMethod::Percentile),
            "zscore" => Ok(OutlierMethod::Zscore),
            "winsorize" => Ok(OutlierMethod::Winsorize),
            "none" => Ok(OutlierMethod::None),
            other => Err(ServiceError::invalid(format!(
                "unknown outlier method '{other}'; use iqr, mad, percentile, zscore, winsorize or none"
            ))),
        }
    }

    /// Conventional detection threshold for the method: IQR multiplier for
    /// `iqr`, z cut-off for `zscore`. Unused by the percentile-based methods.
    pub fn default_threshold(self) -> f64 {
        match self {
            OutlierMethod::Zscore => 3.0,
            _ => 1.5,
        }
    }
}

/// Diagnostic summary of one outlier treatment pass. Kept separate from the
/// cleaned series itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierReport {
    pub method: OutlierMethod,
    pub values_altered: usize,
    pub percentage_altered: f64,
}

/// Cleans raw rows into canonical per-SKU monthly observations.
///
/// Steps run in fixed order: period parsing, column normalization, numeric
/// coercion (non-numeric quantities become 0), then the configured outlier
/// treatment. Treatments operate per SKU group when the dataset holds more
/// than one SKU, otherwise on the whole series.
#[derive(Debug, Clone)]
pub struct DataTransformer {
    method: OutlierMethod,
    threshold: f64,
}

impl Default for DataTransformer {
    fn default() -> Self {
        Self::new(OutlierMethod::Iqr, OutlierMethod::Iqr.default_threshold())
    }
}

impl DataTransformer {
    pub fn new(method: OutlierMethod, threshold: f64) -> Self {
        Self { method, threshold }
    }

    /// Less aggressive preset: IQR capping with a wider fence.
    pub fn conservative() -> Self {
        Self::new(OutlierMethod::Iqr, 2.0)
    }

    /// More aggressive preset used by validation flows: winsorization at the
    /// 10th/90th percentiles.
    pub fn aggressive() -> Self {
        Self::new(OutlierMethod::Winsorize, 1.5)
    }

    pub fn method(&self) -> OutlierMethod {
        self.method
    }

    #[instrument(skip(self, rows), fields(rows = rows.len(), method = %self.method))]
    pub fn preprocess(
        &self,
        rows: &[RawObservation],
    ) -> Result<(Vec<Observation>, OutlierReport), ServiceError> {
        let mut observations = Vec::with_capacity(rows.len());
        for row in rows {
            let period = parse_period(&row.period)?;
            let quantity = coerce_quantity(&row.quantity);
            observations.push(Observation {
                sku: row.product_code.trim().to_string(),
                period,
                quantity,
                family: row.family_code.trim().to_string(),
                process: row.process_code.trim().to_string(),
            });
        }

        let report = if self.method == OutlierMethod::None {
            OutlierReport {
                method: OutlierMethod::None,
                values_altered: 0,
                percentage_altered: 0.0,
            }
        } else {
            self.treat_outliers(&mut observations)
        };

        debug!(
            altered = report.values_altered,
            pct = report.percentage_altered,
            "preprocessing complete"
        );
        Ok((observations, report))
    }

    fn treat_outliers(&self, observations: &mut [Observation]) -> OutlierReport {
        let total = observations.len();
        let mut altered = 0usize;
        for group in sku_groups(observations) {
            let mut values: Vec<f64> = group.iter().map(|&i| observations[i].quantity).collect();
            altered += match self.method {
                OutlierMethod::Iqr => treat_iqr(&mut values, self.threshold),
                OutlierMethod::Mad => treat_mad(&mut values),
                OutlierMethod::Percentile => treat_percentile(&mut values, 0.05, 0.90),
                OutlierMethod::Zscore => treat_zscore(&mut values, self.threshold),
                OutlierMethod::Winsorize => treat_percentile(&mut values, 0.10, 0.90),
                OutlierMethod::None => 0,
            };
            for (&index, value) in group.iter().zip(values) {
                observations[index].quantity = value;
            }
        }
        OutlierReport {
            method: self.method,
            values_altered: altered,
            percentage_altered: if total == 0 {
                0.0
            } else {
                altered as f64 / total as f64 * 100.0
            },
        }
    }
}

/// Row indices grouped by SKU when more than one SKU is present, otherwise a
/// single group covering the whole dataset. Group order follows first
/// occurrence so results are a pure function of input order.
fn sku_groups(observations: &[Observation]) -> Vec<Vec<usize>> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, obs) in observations.iter().enumerate() {
        let entry = groups.entry(obs.sku.as_str()).or_insert_with(|| {
            order.push(obs.sku.as_str());
            Vec::new()
        });
        entry.push(i);
    }
    if order.len() <= 1 {
        return vec![(0..observations.len()).collect()];
    }
    order
        .into_iter()
        .map(|sku| groups.remove(sku).unwrap_or_default())
        .collect()
}

fn parse_period(raw: &str) -> Result<NaiveDate, ServiceError> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(month_floor(date));
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d") {
        return Ok(date);
    }
    Err(ServiceError::invalid(format!(
        "period '{trimmed}' is not a valid YYYY-MM-DD or YYYY-MM date"
    )))
}

fn coerce_quantity(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => {
            warn!(value = raw, "non-numeric quantity coerced to 0");
            0.0
        }
    }
}

/// IQR capping: clip into `[max(0, Q1 - k*IQR), Q3 + k*IQR]`. The lower fence
/// is floored at 0 since demand cannot be negative. Returns the number of
/// values changed.
fn treat_iqr(values: &mut [f64], k: f64) -> usize {
    if values.is_empty() {
        return 0;
    }
    let q1 = quantile(values, 0.25);
    let q3 = quantile(values, 0.75);
    let iqr = q3 - q1;
    let lower = (q1 - k * iqr).max(0.0);
    let upper = q3 + k * iqr;
    clip(values, Some(lower), Some(upper))
}

/// Modified z-score via MAD; scores above 2.5 are replaced by the group
/// median. Falls back to capping at the 90th percentile when MAD is 0.
fn treat_mad(values: &mut [f64]) -> usize {
    if values.is_empty() {
        return 0;
    }
    let med = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    let mad = median(&deviations);
    if mad == 0.0 {
        let upper = quantile(values, 0.90);
        return clip(values, None, Some(upper));
    }
    let mut altered = 0;
    for value in values.iter_mut() {
        let modified_z = 0.6745 * (*value - med) / mad;
        if modified_z.abs() > 2.5 && *value != med {
            *value = med;
            altered += 1;
        }
    }
    altered
}

fn treat_percentile(values: &mut [f64], lower_q: f64, upper_q: f64) -> usize {
    if values.is_empty() {
        return 0;
    }
    let lower = quantile(values, lower_q);
    let upper = quantile(values, upper_q);
    clip(values, Some(lower), Some(upper))
}

/// Standard z-score replacement by the median. No-op when the group standard
/// deviation is 0.
fn treat_zscore(values: &mut [f64], threshold: f64) -> usize {
    let m = mean(values);
    let std = sample_std(values);
    if std == 0.0 {
        return 0;
    }
    let med = median(values);
    let mut altered = 0;
    for value in values.iter_mut() {
        let z = (*value - m) / std;
        if z.abs() > threshold && *value != med {
            *value = med;
            altered += 1;
        }
    }
    altered
}

fn clip(values: &mut [f64], lower: Option<f64>, upper: Option<f64>) -> usize {
    let mut altered = 0;
    for value in values.iter_mut() {
        let mut clipped = *value;
        if let Some(lo) = lower {
            clipped = clipped.max(lo);
        }
        if let Some(hi) = upper {
            clipped = clipped.min(hi);
        }
        if clipped != *value {
            *value = clipped;
            altered += 1;
        }
    }
    altered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::quantile;
    use rstest::rstest;

    fn raw(sku: &str, period: &str, quantity: &str) -> RawObservation {
        RawObservation {
            family_code: "FAM1".into(),
            product_code: sku.into(),
            process_code: "EXT".into(),
            period: period.into(),
            quantity: quantity.into(),
        }
    }

    #[test]
    fn parses_periods_and_coerces_quantities() {
        let transformer = DataTransformer::new(OutlierMethod::None, 1.5);
        let rows = vec![
            raw("A1", "2024-03-15", "10.5"),
            raw("A1", "2024-04", "n/a"),
        ];
        let (obs, report) = transformer.preprocess(&rows).unwrap();
        assert_eq!(obs[0].period, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(obs[1].period, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert_eq!(obs[0].quantity, 10.5);
        assert_eq!(obs[1].quantity, 0.0);
        assert_eq!(report.values_altered, 0);
    }

    #[test]
    fn rejects_unparseable_periods() {
        let transformer = DataTransformer::default();
        let rows = vec![raw("A1", "March 2024", "1")];
        let err = transformer.preprocess(&rows).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }

    #[test]
    fn iqr_keeps_every_value_inside_the_fences() {
        let mut values: Vec<f64> = vec![
            10.0, 12.0, 11.0, 13.0, 9.0, 10.0, 400.0, 12.0, 11.0, 10.0, 13.0, 12.0,
        ];
        let original = values.clone();
        let altered = treat_iqr(&mut values, 1.5);
        let q1 = quantile(&original, 0.25);
        let q3 = quantile(&original, 0.75);
        let iqr = q3 - q1;
        let lower = (q1 - 1.5 * iqr).max(0.0);
        let upper = q3 + 1.5 * iqr;
        assert!(altered >= 1);
        for value in &values {
            assert!(*value >= lower && *value <= upper);
        }
    }

    #[test]
    fn iqr_lower_fence_never_goes_negative() {
        let mut values = vec![0.0, 1.0, 2.0, 100.0];
        treat_iqr(&mut values, 1.5);
        assert!(values.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn iqr_handles_tiny_groups() {
        let mut values = vec![5.0, 5.0];
        let altered = treat_iqr(&mut values, 1.5);
        assert_eq!(altered, 0);
        assert_eq!(values, vec![5.0, 5.0]);
    }

    #[test]
    fn mad_replaces_extremes_with_the_median() {
        let mut values = vec![10.0, 11.0, 10.0, 12.0, 11.0, 10.0, 500.0];
        let altered = treat_mad(&mut values);
        assert_eq!(altered, 1);
        assert_eq!(values[6], 11.0);
    }

    #[test]
    fn mad_zero_falls_back_to_percentile_cap() {
        // Constant series except one spike: MAD is 0.
        let mut values = vec![5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 50.0];
        let altered = treat_mad(&mut values);
        assert_eq!(altered, 1);
        assert!(values[9] < 50.0);
    }

    #[test]
    fn zscore_is_a_noop_on_constant_series() {
        let mut values = vec![7.0; 12];
        assert_eq!(treat_zscore(&mut values, 3.0), 0);
        assert!(values.iter().all(|v| *v == 7.0));
    }

    #[test]
    fn winsorize_clips_to_p10_p90() {
        let mut values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let altered = treat_percentile(&mut values, 0.10, 0.90);
        let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(altered >= 2);
        assert!(lo >= 1.9 - 1e-9);
        assert!(hi <= 9.1 + 1e-9);
    }

    #[test]
    fn multi_sku_datasets_are_treated_per_group() {
        // SKU B's spike is normal for SKU A; per-group treatment must leave
        // SKU A untouched and cap only inside B.
        let mut rows = Vec::new();
        for month in 1..=12u32 {
            rows.push(raw("A", &format!("2024-{month:02}-01"), "1000"));
        }
        for month in 1..=11u32 {
            rows.push(raw("B", &format!("2024-{month:02}-01"), "10"));
        }
        rows.push(raw("B", "2024-12-01", "900"));
        let transformer = DataTransformer::default();
        let (obs, report) = transformer.preprocess(&rows).unwrap();
        let a_max = obs
            .iter()
            .filter(|o| o.sku == "A")
            .map(|o| o.quantity)
            .fold(f64::NEG_INFINITY, f64::max);
        let b_max = obs
            .iter()
            .filter(|o| o.sku == "B")
            .map(|o| o.quantity)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(a_max, 1000.0);
        assert!(b_max < 900.0);
        assert_eq!(report.values_altered, 1);
        assert!(report.percentage_altered > 0.0);
    }

    #[test]
    fn presets_pick_their_documented_methods() {
        assert_eq!(DataTransformer::conservative().method(), OutlierMethod::Iqr);
        assert_eq!(
            DataTransformer::aggressive().method(),
            OutlierMethod::Winsorize
        );
    }

    #[rstest]
    #[case("IQR", OutlierMethod::Iqr)]
    #[case("mad", OutlierMethod::Mad)]
    #[case("percentile", OutlierMethod::Percentile)]
    #[case("ZScore", OutlierMethod::Zscore)]
    #[case(" winsorize ", OutlierMethod::Winsorize)]
    #[case("none", OutlierMethod::None)]
    fn method_names_parse_case_insensitively(
        #[case] raw: &str,
        #[case] expected: OutlierMethod,
    ) {
        assert_eq!(OutlierMethod::parse(raw).unwrap(), expected);
    }

    #[test]
    fn unknown_method_is_an_invalid_request() {
        let err = OutlierMethod::parse("tukey").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }

    #[test]
    fn report_percentage_reflects_dataset_size() {
        let mut rows: Vec<RawObservation> = (1..=9u32)
            .map(|m| raw("A", &format!("2024-{m:02}-01"), "10"))
            .collect();
        rows.push(raw("A", "2024-10-01", "10000"));
        let transformer = DataTransformer::aggressive();
        let (_, report) = transformer.preprocess(&rows).unwrap();
        assert_eq!(report.method, OutlierMethod::Winsorize);
        assert!(report.values_altered >= 1);
        assert!((report.percentage_altered - report.values_altered as f64 * 10.0).abs() < 1e-9);
    }
}
