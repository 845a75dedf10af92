use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::errors::ServiceError;
use crate::stats::{mean, population_variance, sample_std, slope_intercept};
use crate::timeseries::Observation;

/// The five shape metrics of a demand series, computed at validation time and
/// stored next to accuracy for later analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCharacteristics {
    pub mean: f64,
    pub coefficient_of_variation: f64,
    pub trend: f64,
    pub seasonal_strength: f64,
    pub zero_ratio: f64,
}

const SEASONAL_PERIOD: usize = 12;
/// Zero-heavy series get no seasonal reading at all.
const ZERO_RATIO_CUTOFF: f64 = 0.25;
/// Mildly intermittent series have zeros softened before decomposition.
const ZERO_RATIO_ADJUST: f64 = 0.01;
const ZERO_REPLACEMENT: f64 = 0.8;

/// Computes the characteristics of one quantity series.
pub fn for_values(values: &[f64]) -> DataCharacteristics {
    let m = mean(values);
    let zero_ratio = zero_ratio(values);
    let (slope, _) = slope_intercept(values);

    let seasonal_strength = if zero_ratio > ZERO_RATIO_CUTOFF {
        0.0
    } else if zero_ratio > ZERO_RATIO_ADJUST {
        let adjusted: Vec<f64> = values
            .iter()
            .map(|v| if *v == 0.0 { ZERO_REPLACEMENT } else { *v })
            .collect();
        seasonal_strength(&adjusted, SEASONAL_PERIOD)
    } else {
        seasonal_strength(values, SEASONAL_PERIOD)
    };

    DataCharacteristics {
        mean: m,
        coefficient_of_variation: if m != 0.0 { sample_std(values) / m } else { 0.0 },
        trend: slope,
        seasonal_strength,
        zero_ratio,
    }
}

/// Characteristics of a single SKU's series within a dataset.
#[instrument(skip(observations))]
pub fn for_sku(
    observations: &[Observation],
    sku: &str,
) -> Result<DataCharacteristics, ServiceError> {
    let wanted = sku.trim().to_uppercase();
    let values: Vec<f64> = observations
        .iter()
        .filter(|obs| obs.sku.trim().to_uppercase() == wanted)
        .map(|obs| obs.quantity)
        .collect();
    if values.is_empty() {
        return Err(ServiceError::not_found(format!(
            "SKU '{sku}' not present in the dataset"
        )));
    }
    Ok(for_values(&values))
}

/// Characteristics for every SKU in the dataset, in first-occurrence order.
/// SKUs with an all-zero history are skipped (their ratios are undefined).
pub fn for_all_skus(observations: &[Observation]) -> Vec<(String, DataCharacteristics)> {
    let mut order: Vec<&str> = Vec::new();
    let mut grouped: std::collections::HashMap<&str, Vec<f64>> = std::collections::HashMap::new();
    for obs in observations {
        let entry = grouped.entry(obs.sku.as_str()).or_insert_with(|| {
            order.push(obs.sku.as_str());
            Vec::new()
        });
        entry.push(obs.quantity);
    }
    order
        .into_iter()
        .filter_map(|sku| {
            let values = grouped.remove(sku)?;
            if mean(&values) == 0.0 {
                return None;
            }
            Some((sku.to_string(), for_values(&values)))
        })
        .collect()
}

fn zero_ratio(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|v| **v == 0.0).count() as f64 / values.len() as f64
}

/// Strength of the yearly pattern under a multiplicative decomposition:
/// `max(0, 1 - var(remainder) / var(detrended))`. Needs two full cycles;
/// shorter histories read as 0.
fn seasonal_strength(values: &[f64], period: usize) -> f64 {
    let n = values.len();
    if n < 2 * period {
        return 0.0;
    }

    // Centered moving average over one cycle (even window, so the classic
    // 2x(period) average). Defined for indices half..n-half.
    let half = period / 2;
    let mut trend = vec![f64::NAN; n];
    for i in half..n - half {
        let mut window_sum = 0.0;
        for j in (i - half)..(i + half) {
            window_sum += (values[j] + values[j + 1]) / 2.0;
        }
        trend[i] = window_sum / period as f64;
    }

    let mut detrended = vec![f64::NAN; n];
    for i in 0..n {
        if trend[i].is_finite() && trend[i] > 0.0 {
            detrended[i] = values[i] / trend[i];
        }
    }

    // Seasonal index per position in the cycle, normalized to mean 1.
    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for (i, ratio) in detrended.iter().enumerate() {
        if ratio.is_finite() {
            sums[i % period] += ratio;
            counts[i % period] += 1;
        }
    }
    let mut seasonal = vec![1.0; period];
    for i in 0..period {
        if counts[i] > 0 {
            seasonal[i] = sums[i] / counts[i] as f64;
        }
    }
    let seasonal_mean = mean(&seasonal);
    if seasonal_mean > 0.0 {
        for s in seasonal.iter_mut() {
            *s /= seasonal_mean;
        }
    }

    let mut remainder = Vec::new();
    let mut valid_detrended = Vec::new();
    for (i, ratio) in detrended.iter().enumerate() {
        if ratio.is_finite() && seasonal[i % period] > 0.0 {
            valid_detrended.push(*ratio);
            remainder.push(*ratio / seasonal[i % period]);
        }
    }
    let var_detrended = population_variance(&valid_detrended);
    if var_detrended == 0.0 {
        return 0.0;
    }
    (1.0 - population_variance(&remainder) / var_detrended).max(0.0)
}
