use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Accuracy metrics plus data characteristics for one (SKU, model)
/// evaluation. Each validation run appends a new row; nothing is updated in
/// place.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "forecast_metrics")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub sku: String,
    pub model_name: String,
    pub wmape: Option<f64>,
    pub bias: Option<f64>,
    pub bias_pct: Option<f64>,
    pub fva: Option<f64>,
    pub mae: Option<f64>,
    pub rmse: Option<f64>,
    pub mape: Option<f64>,
    pub series_mean: Option<f64>,
    pub coefficient_of_variation: Option<f64>,
    pub trend: Option<f64>,
    pub seasonal_strength: Option<f64>,
    pub zero_ratio: Option<f64>,
    #[sea_orm(column_type = "Json")]
    pub hyperparameters: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
