#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use demandcast::errors::ServiceError;
use demandcast::repositories::{ForecastStore, MetricRecord};
use demandcast::services::forecasting::regressors::FeatureTable;
use demandcast::services::forecasting::ForecastPoint;
use demandcast::services::transformer::RawObservation;

/// A saved run row, as the in-memory store keeps it.
#[derive(Debug, Clone)]
pub struct SavedRun {
    pub id: Uuid,
    pub model_name: String,
    pub total_series: i32,
    pub identifier: Option<String>,
    pub summary_wmape: Option<f64>,
}

/// A saved forecast point with its owning run and target.
#[derive(Debug, Clone)]
pub struct SavedPoint {
    pub run_id: Uuid,
    pub target: String,
    pub model_name: String,
    pub point: ForecastPoint,
}

/// Store double collecting everything the pipeline persists.
#[derive(Default)]
pub struct InMemoryStore {
    pub runs: Mutex<Vec<SavedRun>>,
    pub points: Mutex<Vec<SavedPoint>>,
    pub metrics: Mutex<Vec<MetricRecord>>,
    pub tables: Vec<FeatureTable>,
}

impl InMemoryStore {
    pub fn with_tables(tables: Vec<FeatureTable>) -> Self {
        Self {
            tables,
            ..Default::default()
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn point_count(&self) -> usize {
        self.points.lock().unwrap().len()
    }

    pub fn metric_count(&self) -> usize {
        self.metrics.lock().unwrap().len()
    }
}

#[async_trait]
impl ForecastStore for InMemoryStore {
    async fn save_run(
        &self,
        model_name: &str,
        total_series: i32,
        identifier: Option<&str>,
        summary_wmape: Option<f64>,
    ) -> Result<Uuid, ServiceError> {
        let id = Uuid::new_v4();
        self.runs.lock().unwrap().push(SavedRun {
            id,
            model_name: model_name.to_string(),
            total_series,
            identifier: identifier.map(|s| s.to_string()),
            summary_wmape,
        });
        Ok(id)
    }

    async fn save_points(
        &self,
        run_id: Uuid,
        target: &str,
        model_name: &str,
        points: &[ForecastPoint],
    ) -> Result<usize, ServiceError> {
        let mut saved = self.points.lock().unwrap();
        for point in points {
            saved.push(SavedPoint {
                run_id,
                target: target.to_string(),
                model_name: model_name.to_string(),
                point: point.clone(),
            });
        }
        Ok(points.len())
    }

    async fn save_metrics(&self, record: &MetricRecord) -> Result<(), ServiceError> {
        self.metrics.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn feature_tables(&self) -> Result<Vec<FeatureTable>, ServiceError> {
        Ok(self.tables.clone())
    }
}

pub fn raw_row(
    sku: &str,
    family: &str,
    process: &str,
    period: &str,
    quantity: f64,
) -> RawObservation {
    RawObservation {
        family_code: family.to_string(),
        product_code: sku.to_string(),
        process_code: process.to_string(),
        period: period.to_string(),
        quantity: quantity.to_string(),
    }
}

/// 36 months of history for one SKU at a given base volume, with a mild
/// seasonal swing so the series is not perfectly flat.
pub fn sku_history(sku: &str, family: &str, process: &str, base: f64) -> Vec<RawObservation> {
    let mut rows = Vec::new();
    for offset in 0..36u32 {
        let year = 2022 + (offset / 12) as i32;
        let month = offset % 12 + 1;
        let swing = 1.0 + 0.1 * ((month as f64) * std::f64::consts::PI / 6.0).sin();
        rows.push(raw_row(
            sku,
            family,
            process,
            &format!("{year}-{month:02}-01"),
            (base * swing).round(),
        ));
    }
    rows
}

/// The standard fixture: one segment whose volumes classify BIG as A, MID as
/// B and LOW as C, a second healthy segment, and one SKU with a single
/// observation (too short for any model).
pub fn catalog() -> Vec<RawObservation> {
    let mut rows = Vec::new();
    rows.extend(sku_history("BIG", "FAM1", "EXT", 800.0));
    rows.extend(sku_history("MID", "FAM1", "EXT", 150.0));
    rows.extend(sku_history("LOW", "FAM1", "EXT", 50.0));
    rows.extend(sku_history("EXTRA", "FAM2", "INJ", 200.0));
    rows.push(raw_row("ONEPOINT", "FAM2", "INJ", "2024-06-01", 30.0));
    rows
}
