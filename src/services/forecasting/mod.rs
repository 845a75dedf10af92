pub mod boosted;
pub mod gbt;
pub mod holidays;
pub mod linalg;
pub mod regressors;
pub mod seasonal;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::services::metrics::AccuracyMetrics;
use crate::stats::slope_intercept;
use crate::timeseries::SeriesPoint;

use self::regressors::MonthlyRegressor;

/// The model families the router can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// Seasonal decomposition model, the primary adapter.
    Seasonal,
    /// Intermittent-demand slot reserved for class-B SKUs. No adapter ships
    /// for it; deployments plug their own in.
    Intermittent,
    /// Gradient-boosted trees over engineered features.
    Boosted,
}

impl ModelKind {
    /// Parses a caller-supplied model name. Accepted names are the public
    /// model labels, case-insensitive.
    pub fn parse(value: &str) -> Result<Self, ServiceError> {
        match value.trim().to_lowercase().as_str() {
            "prophet" | "seasonal" => Ok(ModelKind::Seasonal),
            "tsb" => Ok(ModelKind::Intermittent),
            "xgboost" | "boosted" => Ok(ModelKind::Boosted),
            other => Err(ServiceError::invalid(format!(
                "unknown model '{other}'; use Prophet, TSB or XGBoost"
            ))),
        }
    }

    /// Public label stored with runs and points.
    pub fn label(self) -> &'static str {
        match self {
            ModelKind::Seasonal => "Prophet",
            ModelKind::Intermittent => "TSB",
            ModelKind::Boosted => "XGBoost",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One forecast month produced by an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period: NaiveDate,
    pub point_estimate: f64,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub horizon_index: usize,
}

/// Direction summary of a produced forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub slope: f64,
    pub direction: String,
    pub percentage_change: f64,
    pub first_value: f64,
    pub last_value: f64,
}

/// Everything an adapter hands back: the future points, held-out accuracy
/// from the 80/20 split (when the history allows one), and the fitted
/// hyperparameters for the metrics log.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub points: Vec<ForecastPoint>,
    pub holdout: Option<AccuracyMetrics>,
    pub hyperparameters: serde_json::Value,
    pub trend: Option<TrendSummary>,
}

/// Uniform fit-and-predict contract every model implements.
///
/// Implementations evaluate on a chronological 80/20 split and then refit on
/// the full history before producing the future forecast; evaluation and
/// production predictions never share a fitted model.
pub trait ModelAdapter: Send + Sync {
    fn kind(&self) -> ModelKind;

    fn fit_predict(
        &self,
        series: &[SeriesPoint],
        horizon: usize,
        regressors: &[MonthlyRegressor],
    ) -> Result<ModelOutput, ServiceError>;
}

/// Registry mapping model kinds to adapters. Adding a model is a registry
/// entry, not a new branch.
pub struct AdapterRegistry {
    adapters: HashMap<ModelKind, Arc<dyn ModelAdapter>>,
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// The shipped configuration: seasonal and boosted adapters registered,
    /// the intermittent slot intentionally left open.
    pub fn with_default_adapters() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(seasonal::SeasonalAdapter::default()));
        registry.register(Arc::new(boosted::BoostedAdapter::default()));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ModelAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Resolves a kind to its adapter; an unregistered kind is a distinct
    /// not-implemented signal, not a generic failure.
    pub fn get(&self, kind: ModelKind) -> Result<Arc<dyn ModelAdapter>, ServiceError> {
        self.adapters.get(&kind).cloned().ok_or_else(|| {
            ServiceError::NotImplemented(format!("no adapter registered for model {kind}"))
        })
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_default_adapters()
    }
}

/// Chronological 80/20 split. Returns `None` when either side would be empty.
pub fn train_test_split(series: &[SeriesPoint]) -> Option<(&[SeriesPoint], &[SeriesPoint])> {
    let n = series.len();
    let split = (n as f64 * 0.8).floor() as usize;
    if split == 0 || split >= n {
        return None;
    }
    Some((&series[..split], &series[split..]))
}

/// Least-squares trend over the forecast horizon: slope, direction label and
/// first-to-last percentage change.
pub fn forecast_trend(points: &[ForecastPoint]) -> TrendSummary {
    let values: Vec<f64> = points.iter().map(|p| p.point_estimate).collect();
    if values.len() < 2 {
        let value = values.first().copied().unwrap_or(0.0);
        return TrendSummary {
            slope: 0.0,
            direction: "stable".into(),
            percentage_change: 0.0,
            first_value: value,
            last_value: value,
        };
    }
    let (slope, _) = slope_intercept(&values);
    let first_value = values[0];
    let last_value = values[values.len() - 1];
    let percentage_change = if first_value != 0.0 {
        (last_value - first_value) / first_value * 100.0
    } else {
        0.0
    };
    let direction = if slope > 0.01 {
        "increasing"
    } else if slope < -0.01 {
        "decreasing"
    } else {
        "stable"
    };
    TrendSummary {
        slope,
        direction: direction.into(),
        percentage_change,
        first_value,
        last_value,
    }
}
