use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::services::aggregation::{AggregationInfo, AggregationType};
use crate::services::characteristics::DataCharacteristics;
use crate::services::forecasting::TrendSummary;
use crate::services::metrics::AccuracyMetrics;
use crate::services::transformer::OutlierReport;
use crate::services::validation::{CvParams, CvPrediction, FoldMetrics};

fn default_periods() -> u32 {
    12
}

/// A forecast invocation as received from the calling layer.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ForecastRequest {
    /// Months to forecast ahead.
    #[serde(default = "default_periods")]
    #[validate(range(min = 1, max = 60))]
    pub periods: u32,

    /// Target SKU; required when `aggregation_type` is `sku`.
    pub sku: Option<String>,

    /// Explicit model name (Prophet, TSB, XGBoost). When absent, single-SKU
    /// requests are routed by ABC class.
    pub model: Option<String>,

    #[serde(default)]
    pub aggregation_type: AggregationType,

    pub familia: Option<Vec<String>>,
    pub processo: Option<Vec<String>>,
    pub abc_class: Option<Vec<String>>,

    /// Outlier treatment override; defaults come from configuration.
    pub outlier_method: Option<String>,
    pub outlier_threshold: Option<f64>,
}

impl Default for ForecastRequest {
    fn default() -> Self {
        Self {
            periods: default_periods(),
            sku: None,
            model: None,
            aggregation_type: AggregationType::Sku,
            familia: None,
            processo: None,
            abc_class: None,
            outlier_method: None,
            outlier_threshold: None,
        }
    }
}

impl ForecastRequest {
    /// Cross-field checks: every aggregation mode must come with the fields
    /// it filters on.
    pub fn ensure_mode_fields(&self) -> Result<(), ServiceError> {
        let missing = |field: &str, mode: &str| {
            Err(ServiceError::invalid(format!(
                "field '{field}' is required when aggregation_type is '{mode}'"
            )))
        };
        match self.aggregation_type {
            AggregationType::Sku => {
                if self.sku.as_deref().map_or(true, |s| s.trim().is_empty()) {
                    return missing("sku", "sku");
                }
            }
            AggregationType::Familia => {
                if self.familia.as_deref().map_or(true, |f| f.is_empty()) {
                    return missing("familia", "familia");
                }
            }
            AggregationType::Processo => {
                if self.processo.as_deref().map_or(true, |p| p.is_empty()) {
                    return missing("processo", "processo");
                }
            }
            AggregationType::Abc => {
                if self.abc_class.as_deref().map_or(true, |c| c.is_empty()) {
                    return missing("abc_class", "abc");
                }
            }
            AggregationType::Combined => {
                let has_any = self.familia.as_deref().map_or(false, |f| !f.is_empty())
                    || self.processo.as_deref().map_or(false, |p| !p.is_empty())
                    || self.abc_class.as_deref().map_or(false, |c| !c.is_empty());
                if !has_any {
                    return Err(ServiceError::invalid(
                        "combined aggregation needs at least one of familia, processo or abc_class",
                    ));
                }
            }
            AggregationType::All => {}
        }
        Ok(())
    }
}

/// One forecast month in API form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPointDto {
    pub period: NaiveDate,
    pub point_estimate: f64,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
}

/// Result of one forecast invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub run_id: Uuid,
    pub model_used: String,
    pub auto_selected: bool,
    pub forecast_points: Vec<ForecastPointDto>,
    pub elapsed_seconds: f64,
    pub aggregation_info: Option<AggregationInfo>,
    pub metrics: Option<AccuracyMetrics>,
    pub trend: Option<TrendSummary>,
    pub outliers: OutlierReport,
}

/// Failure of one SKU inside a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkuFailure {
    pub sku: String,
    pub reason: String,
}

/// Outcome of a batch forecast across a SKU set: successes and failures are
/// reported side by side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchForecastSummary {
    pub run_id: Uuid,
    pub model_used: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<SkuFailure>,
    pub elapsed_seconds: f64,
}

/// A cross-validation invocation for one SKU.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ValidationRequest {
    #[validate(length(min = 1))]
    pub sku: String,
    /// Window override; configuration defaults apply when absent.
    pub params: Option<CvParams>,
}

/// Result of a rolling-origin validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub sku: String,
    pub predictions: Vec<CvPrediction>,
    pub folds: Vec<FoldMetrics>,
    pub wmape: Option<f64>,
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
    pub params_used: CvParams,
    pub window_shrunk: bool,
    pub data_characteristics: DataCharacteristics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_mode_requires_a_sku() {
        let request = ForecastRequest::default();
        assert!(matches!(
            request.ensure_mode_fields(),
            Err(ServiceError::InvalidRequest(_))
        ));
        let request = ForecastRequest {
            sku: Some("P123".into()),
            ..Default::default()
        };
        assert!(request.ensure_mode_fields().is_ok());
    }

    #[test]
    fn abc_mode_requires_classes() {
        let request = ForecastRequest {
            aggregation_type: AggregationType::Abc,
            ..Default::default()
        };
        assert!(request.ensure_mode_fields().is_err());
        let request = ForecastRequest {
            aggregation_type: AggregationType::Abc,
            abc_class: Some(vec!["A".into()]),
            ..Default::default()
        };
        assert!(request.ensure_mode_fields().is_ok());
    }

    #[test]
    fn combined_mode_needs_at_least_one_filter() {
        let request = ForecastRequest {
            aggregation_type: AggregationType::Combined,
            ..Default::default()
        };
        assert!(request.ensure_mode_fields().is_err());
        let request = ForecastRequest {
            aggregation_type: AggregationType::Combined,
            processo: Some(vec!["EXT".into()]),
            ..Default::default()
        };
        assert!(request.ensure_mode_fields().is_ok());
    }

    #[test]
    fn all_mode_has_no_required_fields() {
        let request = ForecastRequest {
            aggregation_type: AggregationType::All,
            ..Default::default()
        };
        assert!(request.ensure_mode_fields().is_ok());
    }

    #[test]
    fn periods_are_range_validated() {
        let request = ForecastRequest {
            periods: 0,
            sku: Some("P1".into()),
            ..Default::default()
        };
        assert!(request.validate().is_err());
        let request = ForecastRequest {
            periods: 12,
            sku: Some("P1".into()),
            ..Default::default()
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn aggregation_type_deserializes_from_lowercase() {
        let request: ForecastRequest =
            serde_json::from_str(r#"{"aggregation_type": "familia", "familia": ["L1"]}"#).unwrap();
        assert_eq!(request.aggregation_type, AggregationType::Familia);
        assert_eq!(request.periods, 12);
    }
}
