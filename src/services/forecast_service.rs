use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::dto::forecasting::{
    BatchForecastSummary, ForecastPointDto, ForecastRequest, ForecastResponse, SkuFailure,
    ValidationRequest, ValidationResponse,
};
use crate::errors::ServiceError;
use crate::repositories::{ForecastStore, MetricRecord};
use crate::services::aggregation::{self, AggregationInfo, AggregationType};
use crate::services::characteristics;
use crate::services::classification::{aggregate_by_sku, classify, AbcRecord};
use crate::services::forecasting::regressors::{monthly_regressors, MonthlyRegressor};
use crate::services::forecasting::{AdapterRegistry, ModelKind, ModelOutput};
use crate::services::redirect;
use crate::services::transformer::{DataTransformer, OutlierMethod, RawObservation};
use crate::services::validation::{rolling_origin, CvParams};
use crate::timeseries::{Observation, SeriesPoint};

/// Default outlier treatment settings, overridable per request.
#[derive(Debug, Clone)]
pub struct ForecastDefaults {
    pub outlier_method: OutlierMethod,
    pub outlier_threshold: f64,
    pub cv: CvParams,
}

impl Default for ForecastDefaults {
    fn default() -> Self {
        Self {
            outlier_method: OutlierMethod::Iqr,
            outlier_threshold: OutlierMethod::Iqr.default_threshold(),
            cv: CvParams::default(),
        }
    }
}

/// Orchestrates the full pipeline: preprocessing, classification,
/// aggregation, routing, model execution and persistence. Receives its store
/// handle as a dependency; no global state is touched.
pub struct ForecastService {
    store: Arc<dyn ForecastStore>,
    registry: AdapterRegistry,
    defaults: ForecastDefaults,
}

impl ForecastService {
    pub fn new(store: Arc<dyn ForecastStore>, defaults: ForecastDefaults) -> Self {
        Self {
            store,
            registry: AdapterRegistry::with_default_adapters(),
            defaults,
        }
    }

    pub fn with_registry(
        store: Arc<dyn ForecastStore>,
        registry: AdapterRegistry,
        defaults: ForecastDefaults,
    ) -> Self {
        Self {
            store,
            registry,
            defaults,
        }
    }

    fn transformer_for(&self, request: &ForecastRequest) -> Result<DataTransformer, ServiceError> {
        let method = match request.outlier_method.as_deref() {
            Some(raw) => OutlierMethod::parse(raw)?,
            None => self.defaults.outlier_method,
        };
        let threshold = request
            .outlier_threshold
            .unwrap_or_else(|| method.default_threshold());
        Ok(DataTransformer::new(method, threshold))
    }

    /// Regressor tables are optional enrichment; a store failure downgrades
    /// to an unenriched forecast instead of failing the run.
    async fn regressors(&self) -> Vec<MonthlyRegressor> {
        match self.store.feature_tables().await {
            Ok(tables) => monthly_regressors(&tables),
            Err(err) => {
                warn!(error = %err, "feature tables unavailable; forecasting without regressors");
                Vec::new()
            }
        }
    }

    /// Runs one forecast request end to end and persists the results.
    #[instrument(skip(self, rows, request), fields(rows = rows.len(), mode = %request.aggregation_type))]
    pub async fn forecast(
        &self,
        rows: &[RawObservation],
        request: &ForecastRequest,
    ) -> Result<ForecastResponse, ServiceError> {
        let started = Instant::now();
        request.validate()?;
        request.ensure_mode_fields()?;

        let transformer = self.transformer_for(request)?;
        let (observations, outliers) = transformer.preprocess(rows)?;
        if observations.is_empty() {
            return Err(ServiceError::not_found(
                "no sales history available to forecast from",
            ));
        }
        let classified = classify(&aggregate_by_sku(&observations));

        let decision = redirect::route(
            request.aggregation_type,
            request.sku.as_deref(),
            request.model.as_deref(),
            &classified,
        )?;
        let adapter = self.registry.get(decision.kind)?;

        let (series, aggregation_info) =
            self.resolve_target(request, &observations, &classified)?;
        let identifier = target_identifier(request, aggregation_info.as_ref());
        let regressors = self.regressors().await;

        let output = adapter
            .fit_predict(&series, request.periods as usize, &regressors)
            .map_err(|err| self.translate_model_error(err, &identifier))?;

        let series_count = aggregation_info.as_ref().map_or(1, |info| info.sku_count);
        let summary_wmape = output.holdout.as_ref().and_then(|m| m.wmape);
        let run_id = self
            .store
            .save_run(
                decision.kind.label(),
                series_count as i32,
                Some(&identifier),
                summary_wmape,
            )
            .await?;
        self.store
            .save_points(run_id, &identifier, decision.kind.label(), &output.points)
            .await?;

        if request.aggregation_type == AggregationType::Sku {
            self.save_sku_metrics(&observations, &identifier, decision.kind, &output)
                .await?;
        }

        let elapsed_seconds = started.elapsed().as_secs_f64();
        info!(
            run_id = %run_id,
            model = decision.kind.label(),
            points = output.points.len(),
            elapsed_seconds,
            "forecast complete"
        );
        Ok(ForecastResponse {
            run_id,
            model_used: decision.kind.label().to_string(),
            auto_selected: decision.auto_selected,
            forecast_points: output
                .points
                .iter()
                .map(|p| ForecastPointDto {
                    period: p.period,
                    point_estimate: p.point_estimate,
                    lower_bound: p.lower_bound,
                    upper_bound: p.upper_bound,
                })
                .collect(),
            elapsed_seconds,
            aggregation_info,
            metrics: output.holdout.clone(),
            trend: output.trend.clone(),
            outliers,
        })
    }

    fn resolve_target(
        &self,
        request: &ForecastRequest,
        observations: &[Observation],
        classified: &[AbcRecord],
    ) -> Result<(Vec<SeriesPoint>, Option<AggregationInfo>), ServiceError> {
        match request.aggregation_type {
            AggregationType::Sku => {
                let sku = request.sku.as_deref().expect("mode fields checked");
                Ok((aggregation::sku_series(observations, sku)?, None))
            }
            AggregationType::All => {
                let (series, info) = aggregation::aggregate_all(observations)?;
                Ok((series, Some(info)))
            }
            AggregationType::Familia => {
                let familias = request.familia.as_deref().expect("mode fields checked");
                let (series, info) = aggregation::aggregate_familia(observations, familias)?;
                Ok((series, Some(info)))
            }
            AggregationType::Processo => {
                let processos = request.processo.as_deref().expect("mode fields checked");
                let (series, info) = aggregation::aggregate_processo(observations, processos)?;
                Ok((series, Some(info)))
            }
            AggregationType::Abc => {
                let classes = request.abc_class.as_deref().expect("mode fields checked");
                let (series, info) = aggregation::aggregate_abc(observations, classified, classes)?;
                Ok((series, Some(info)))
            }
            AggregationType::Combined => {
                let (series, info) = aggregation::aggregate_combined(
                    observations,
                    Some(classified),
                    request.familia.as_deref(),
                    request.processo.as_deref(),
                    request.abc_class.as_deref(),
                )?;
                Ok((series, Some(info)))
            }
        }
    }

    async fn save_sku_metrics(
        &self,
        observations: &[Observation],
        sku: &str,
        kind: ModelKind,
        output: &ModelOutput,
    ) -> Result<(), ServiceError> {
        let Some(accuracy) = output.holdout.clone() else {
            info!(sku, "history too short for a held-out split; metrics not saved");
            return Ok(());
        };
        let record = MetricRecord {
            sku: sku.to_string(),
            model_name: kind.label().to_string(),
            accuracy,
            characteristics: characteristics::for_sku(observations, sku).ok(),
            hyperparameters: output.hyperparameters.clone(),
        };
        self.store.save_metrics(&record).await
    }

    /// Business-rule errors pass through untouched; anything unexpected is
    /// logged here, once, and flattened to an internal failure.
    fn translate_model_error(&self, err: ServiceError, target: &str) -> ServiceError {
        match err {
            ServiceError::InvalidRequest(_)
            | ServiceError::NotFound(_)
            | ServiceError::InsufficientData(_)
            | ServiceError::NotImplemented(_)
            | ServiceError::ValidationError(_) => err,
            other => {
                error!(target, error = %other, "model execution failed");
                ServiceError::InternalError(format!("model execution failed for '{target}'"))
            }
        }
    }

    /// Forecasts every SKU in the dataset with one shared run id. A failing
    /// SKU is logged and collected; the loop always finishes the rest.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn forecast_all_skus(
        &self,
        rows: &[RawObservation],
        periods: u32,
        model: Option<&str>,
    ) -> Result<BatchForecastSummary, ServiceError> {
        let started = Instant::now();
        if periods == 0 {
            return Err(ServiceError::invalid("forecast horizon must be at least 1"));
        }
        let kind = match model {
            Some(name) => ModelKind::parse(name)?,
            None => ModelKind::Seasonal,
        };
        let adapter = self.registry.get(kind)?;

        let transformer =
            DataTransformer::new(self.defaults.outlier_method, self.defaults.outlier_threshold);
        let (observations, _) = transformer.preprocess(rows)?;
        let skus: BTreeSet<String> = observations.iter().map(|o| o.sku.clone()).collect();
        if skus.is_empty() {
            return Err(ServiceError::not_found(
                "no sales history available to forecast from",
            ));
        }
        let regressors = self.regressors().await;

        let run_id = self
            .store
            .save_run(kind.label(), skus.len() as i32, None, None)
            .await?;

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for sku in skus {
            let result = aggregation::sku_series(&observations, &sku)
                .and_then(|series| adapter.fit_predict(&series, periods as usize, &regressors));
            match result {
                Ok(output) => {
                    self.store
                        .save_points(run_id, &sku, kind.label(), &output.points)
                        .await?;
                    succeeded.push(sku);
                }
                Err(err) => {
                    warn!(sku = %sku, error = %err, "SKU forecast failed; continuing batch");
                    failed.push(SkuFailure {
                        sku,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            run_id = %run_id,
            ok = succeeded.len(),
            failed = failed.len(),
            "batch forecast finished"
        );
        Ok(BatchForecastSummary {
            run_id,
            model_used: kind.label().to_string(),
            succeeded,
            failed,
            elapsed_seconds: started.elapsed().as_secs_f64(),
        })
    }

    /// Rolling-origin validation of one SKU with the primary adapter,
    /// reporting fold metrics next to the series' data characteristics.
    #[instrument(skip(self, rows, request), fields(rows = rows.len(), sku = %request.sku))]
    pub async fn validate_sku(
        &self,
        rows: &[RawObservation],
        request: &ValidationRequest,
    ) -> Result<ValidationResponse, ServiceError> {
        request.validate()?;
        let sku = request.sku.as_str();

        // Validation flows use the aggressive preset so a single spike does
        // not dominate every fold.
        let transformer = DataTransformer::aggressive();
        let (observations, _) = transformer.preprocess(rows)?;
        let series = aggregation::sku_series(&observations, sku)?;
        let data_characteristics = characteristics::for_sku(&observations, sku)?;

        let adapter = self.registry.get(ModelKind::Seasonal)?;
        let outcome = rolling_origin(
            &series,
            request.params.unwrap_or(self.defaults.cv),
            adapter.as_ref(),
        )?;

        Ok(ValidationResponse {
            sku: sku.to_string(),
            predictions: outcome.predictions,
            folds: outcome.folds,
            wmape: outcome.mean_wmape,
            mae: outcome.mean_mae,
            rmse: outcome.mean_rmse,
            mape: outcome.mean_mape,
            params_used: outcome.params,
            window_shrunk: outcome.shrunk,
            data_characteristics,
        })
    }
}

fn target_identifier(request: &ForecastRequest, info: Option<&AggregationInfo>) -> String {
    match info {
        None => request
            .sku
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string(),
        Some(info) => {
            if info.filters.is_empty() {
                info.kind.to_string()
            } else {
                format!("{}:{}", info.kind, info.filters.join(";"))
            }
        }
    }
}
