use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Set, Statement,
    TransactionTrait,
};
use serde_json::Value as JsonValue;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{feature_metadata, forecast_metric, forecast_point, forecast_run};
use crate::services::characteristics::DataCharacteristics;
use crate::services::forecasting::regressors::{FeatureRow, FeatureTable};
use crate::services::forecasting::ForecastPoint;
use crate::services::metrics::AccuracyMetrics;

/// Everything the pipeline persists for one (SKU, model) evaluation.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub sku: String,
    pub model_name: String,
    pub accuracy: AccuracyMetrics,
    pub characteristics: Option<DataCharacteristics>,
    pub hyperparameters: JsonValue,
}

/// Narrow persistence contract the pipeline depends on. The core never
/// reaches for a connection directly; it receives this handle as a
/// dependency.
#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Creates the run row and returns its id.
    async fn save_run(
        &self,
        model_name: &str,
        total_series: i32,
        identifier: Option<&str>,
        summary_wmape: Option<f64>,
    ) -> Result<Uuid, ServiceError>;

    /// Persists the points of one run as a single transaction; either every
    /// point lands or none do.
    async fn save_points(
        &self,
        run_id: Uuid,
        target: &str,
        model_name: &str,
        points: &[ForecastPoint],
    ) -> Result<usize, ServiceError>;

    async fn save_metrics(&self, record: &MetricRecord) -> Result<(), ServiceError>;

    /// External regressor tables registered in `feature_metadata`.
    async fn feature_tables(&self) -> Result<Vec<FeatureTable>, ServiceError>;
}

/// SeaORM-backed store used in production.
pub struct SeaOrmForecastStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmForecastStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ForecastStore for SeaOrmForecastStore {
    #[instrument(skip(self))]
    async fn save_run(
        &self,
        model_name: &str,
        total_series: i32,
        identifier: Option<&str>,
        summary_wmape: Option<f64>,
    ) -> Result<Uuid, ServiceError> {
        let run_id = Uuid::new_v4();
        let run = forecast_run::ActiveModel {
            id: Set(run_id),
            model_name: Set(model_name.to_string()),
            identifier: Set(identifier.map(|s| s.to_string())),
            total_series: Set(total_series),
            summary_wmape: Set(summary_wmape),
            created_at: Set(Utc::now()),
        };
        run.insert(&*self.db).await?;
        info!(run_id = %run_id, model = model_name, "forecast run saved");
        Ok(run_id)
    }

    #[instrument(skip(self, points), fields(points = points.len()))]
    async fn save_points(
        &self,
        run_id: Uuid,
        target: &str,
        model_name: &str,
        points: &[ForecastPoint],
    ) -> Result<usize, ServiceError> {
        let txn = self.db.begin().await?;
        for point in points {
            let row = forecast_point::ActiveModel {
                run_id: Set(run_id),
                target_code: Set(target.to_string()),
                forecast_date: Set(point.period),
                horizon_index: Set(point.horizon_index as i32),
                point_estimate: Set(point.point_estimate),
                lower_bound: Set(point.lower_bound),
                upper_bound: Set(point.upper_bound),
                model_name: Set(model_name.to_string()),
                generated_at: Set(Utc::now()),
                ..Default::default()
            };
            if let Err(err) = row.insert(&txn).await {
                error!(run_id = %run_id, error = %err, "point insert failed; rolling back run batch");
                txn.rollback().await.ok();
                return Err(err.into());
            }
        }
        txn.commit().await?;
        Ok(points.len())
    }

    #[instrument(skip(self, record), fields(sku = %record.sku, model = %record.model_name))]
    async fn save_metrics(&self, record: &MetricRecord) -> Result<(), ServiceError> {
        let characteristics = record.characteristics.as_ref();
        let row = forecast_metric::ActiveModel {
            sku: Set(record.sku.clone()),
            model_name: Set(record.model_name.clone()),
            wmape: Set(record.accuracy.wmape),
            bias: Set(Some(record.accuracy.bias)),
            bias_pct: Set(record.accuracy.bias_pct),
            fva: Set(Some(record.accuracy.fva)),
            mae: Set(Some(record.accuracy.mae)),
            rmse: Set(Some(record.accuracy.rmse)),
            mape: Set(Some(record.accuracy.mape)),
            series_mean: Set(characteristics.map(|c| c.mean)),
            coefficient_of_variation: Set(characteristics.map(|c| c.coefficient_of_variation)),
            trend: Set(characteristics.map(|c| c.trend)),
            seasonal_strength: Set(characteristics.map(|c| c.seasonal_strength)),
            zero_ratio: Set(characteristics.map(|c| c.zero_ratio)),
            hyperparameters: Set(record.hyperparameters.clone()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        row.insert(&*self.db).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn feature_tables(&self) -> Result<Vec<FeatureTable>, ServiceError> {
        let registered = feature_metadata::Entity::find().all(&*self.db).await?;
        let mut tables = Vec::with_capacity(registered.len());
        for meta in registered {
            match load_table(&self.db, &meta).await {
                Ok(table) => tables.push(table),
                Err(err) => {
                    // A broken user-imported table must not take the whole
                    // forecast down.
                    warn!(
                        feature = %meta.feature_name,
                        table = %meta.table_name,
                        error = %err,
                        "feature table skipped"
                    );
                }
            }
        }
        Ok(tables)
    }
}

async fn load_table(
    db: &DatabaseConnection,
    meta: &feature_metadata::Model,
) -> Result<FeatureTable, ServiceError> {
    let columns: Vec<String> = meta
        .columns
        .as_array()
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let statement = Statement::from_string(
        db.get_database_backend(),
        format!("SELECT * FROM {}", meta.table_name),
    );
    let raw_rows = db.query_all(statement).await?;
    let mut rows = Vec::with_capacity(raw_rows.len());
    for raw in raw_rows {
        let date: NaiveDate = raw.try_get("", "date")?;
        let mut values = HashMap::new();
        for column in &columns {
            if column == "date" {
                continue;
            }
            if let Ok(value) = raw.try_get::<f64>("", column) {
                values.insert(column.clone(), value);
            }
        }
        rows.push(FeatureRow { date, values });
    }
    Ok(FeatureTable {
        name: meta.feature_name.clone(),
        rows,
    })
}
